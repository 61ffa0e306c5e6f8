//! TCP transport (serial-over-IP bridges)

use super::Transport;
use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            connect_timeout: Duration::from_secs(5),
            stream: None,
        }
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn stream(&mut self) -> PrintResult<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| PrintError::Connection("socket not connected".into()))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    #[instrument(skip(self), fields(addr = %self.describe()))]
    async fn open(&mut self) -> PrintResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addr = format!("{}:{}", self.host, self.port);
        info!("Connecting to printer");

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| PrintError::Connection(format!("Connection timeout: {}", addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true)?;

        self.stream = Some(stream);
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> PrintResult<()> {
        let stream = self.stream()?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_byte(&mut self, wait: Duration) -> PrintResult<Option<u8>> {
        let stream = self.stream()?;
        let mut byte = [0u8; 1];
        match tokio::time::timeout(wait, stream.read(&mut byte)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                warn!(addr = %self.describe(), "Printer closed the connection");
                self.stream = None;
                Err(PrintError::Connection("connection closed by peer".into()))
            }
            Ok(Ok(_)) => Ok(Some(byte[0])),
            Ok(Err(e)) => {
                self.stream = None;
                Err(PrintError::Io(e))
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn describe(&self) -> String {
        format!("tcp:{}:{}", self.host, self.port)
    }
}
