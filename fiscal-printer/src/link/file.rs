use super::{FiscalLink, Reply};
use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Appends each command to a text file instead of printing
#[derive(Debug)]
pub struct FileLink {
    path: PathBuf,
    file: Option<File>,
}

impl FileLink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn file(&mut self) -> PrintResult<&mut File> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| PrintError::Connection(format!("{} not open", self.path.display())))
    }
}

#[async_trait]
impl FiscalLink for FileLink {
    async fn send_command(
        &mut self,
        command: u8,
        fields: &[String],
        _skip_status: bool,
    ) -> PrintResult<Reply> {
        let line = format!("Command: {}, Parameters: {:?}\n", command, fields);
        let file = self.file().await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        let number = rand::thread_rng().gen_range(2..=12_432u32).to_string();
        let mut reply = vec!["0000".to_string(), "0000".to_string()];
        reply.extend(std::iter::repeat_n(number, 10));
        Ok(Reply::new(reply))
    }

    async fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_appends_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fiscal.log");

        let mut link = FileLink::new(&path);
        link.send_command(0x40, &["C".into()], false).await.unwrap();
        let reply = link
            .send_command(0x42, &["Coffee".into(), "1000".into()], false)
            .await
            .unwrap();
        link.close().await;

        assert_eq!(reply.len(), 12);
        let n: u32 = reply.number(2).unwrap() as u32;
        assert!((2..=12_432).contains(&n));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Command: 64, Parameters: [\"C\"]\nCommand: 66, Parameters: [\"Coffee\", \"1000\"]\n"
        );
    }
}
