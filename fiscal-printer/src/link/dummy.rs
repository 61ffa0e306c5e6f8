use super::{FiscalLink, Reply};
use crate::error::PrintResult;
use crate::protocol::status::FISCAL_DOCUMENT_OPEN;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// One command as received by a [`DummyLink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub command: u8,
    pub fields: Vec<String>,
    pub skip_status: bool,
}

/// Shared record of every command a dummy link accepted
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<JournalEntry>>>);

impl Journal {
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.0.lock().clone()
    }

    pub fn commands(&self) -> Vec<u8> {
        self.0.lock().iter().map(|e| e.command).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    fn push(&self, entry: JournalEntry) {
        self.0.lock().push(entry);
    }
}

/// Opcodes that leave a document open on either brand
const OPENS: &[u8] = &[0x40, 0x48, 0x60, 0x80];
/// Opcodes that close or abandon the open document
const CLOSES: &[u8] = &[0x45, 0x4a, 0x65, 0x81, 0x98];

/// Accepts every command and answers with clean status words
///
/// The fiscal word carries the document-open bit between an open and a
/// close opcode, the way real firmware reports it.
#[derive(Debug, Clone, Default)]
pub struct DummyLink {
    journal: Journal,
    replies: HashMap<u8, Vec<String>>,
    open: bool,
}

impl DummyLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link recording into an existing journal
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// Fixed reply for `command` instead of the generated one
    pub fn with_reply(mut self, command: u8, fields: &[&str]) -> Self {
        self.replies
            .insert(command, fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

#[async_trait]
impl FiscalLink for DummyLink {
    async fn send_command(
        &mut self,
        command: u8,
        fields: &[String],
        skip_status: bool,
    ) -> PrintResult<Reply> {
        info!(
            command = format_args!("0x{:02x}", command),
            ?fields,
            skip_status,
            "Dummy command"
        );
        self.journal.push(JournalEntry {
            command,
            fields: fields.to_vec(),
            skip_status,
        });

        let cancels = fields.get(2).is_some_and(|f| f == "C");
        if OPENS.contains(&command) {
            self.open = true;
        } else if CLOSES.contains(&command) || cancels {
            self.open = false;
        }

        if let Some(fields) = self.replies.get(&command) {
            return Ok(Reply::new(fields.clone()));
        }

        let fiscal = if self.open { FISCAL_DOCUMENT_OPEN } else { 0 };
        let number = rand::thread_rng().gen_range(0..=99_999_999u32).to_string();
        let mut reply = vec!["0000".to_string(), format!("{:04X}", fiscal)];
        reply.extend(std::iter::repeat_n(number, 11));
        Ok(Reply::new(reply))
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dummy_reply_shape_and_journal() {
        let mut link = DummyLink::new();
        let journal = link.journal();

        let reply = link
            .send_command(0x40, &["C".to_string()], false)
            .await
            .unwrap();
        assert_eq!(reply.len(), 13);
        assert_eq!(reply.printer_status().unwrap(), 0);
        assert!(reply.payload().windows(2).all(|w| w[0] == w[1]));

        assert_eq!(
            journal.entries(),
            vec![JournalEntry {
                command: 0x40,
                fields: vec!["C".into()],
                skip_status: false,
            }]
        );
        assert_eq!(reply.fiscal_status().unwrap(), FISCAL_DOCUMENT_OPEN);

        let reply = link.send_command(0x45, &[], false).await.unwrap();
        assert_eq!(reply.fiscal_status().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scripted_reply() {
        let mut link = DummyLink::new().with_reply(0x2a, &["0000", "0000", "17"]);
        let reply = link.send_command(0x2a, &[], true).await.unwrap();
        assert_eq!(reply.number(2).unwrap(), 17);
    }
}
