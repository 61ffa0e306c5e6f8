//! Raw output for ESC/POS receipts
//!
//! Unlike a fiscal link there is no reply to wait for: each receipt is
//! written in one go and the connection released.

use crate::error::{PrintError, PrintResult};
use crate::transport::{self, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::models::DriverConfig;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

#[async_trait]
pub trait RawSink: Send + Debug {
    /// Send one complete receipt
    async fn print(&mut self, data: &[u8]) -> PrintResult<()>;

    fn describe(&self) -> String;
}

/// Sink for a configured driver
pub fn for_driver(driver: &DriverConfig) -> PrintResult<Box<dyn RawSink>> {
    match driver {
        DriverConfig::Dummy => Ok(Box::new(MemorySink::new())),
        DriverConfig::File { path } => Ok(Box::new(FileSink::new(path))),
        other => Ok(Box::new(TransportSink::new(transport::for_driver(other)?))),
    }
}

/// Serial, USB, Bluetooth or TCP 9100 printer
#[derive(Debug)]
pub struct TransportSink {
    transport: Box<dyn Transport>,
}

impl TransportSink {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl RawSink for TransportSink {
    #[instrument(skip(self, data), fields(target = %self.transport.describe(), data_len = data.len()))]
    async fn print(&mut self, data: &[u8]) -> PrintResult<()> {
        self.transport.open().await?;
        let written = self.transport.write_all(data).await;
        self.transport.close().await;
        written?;
        info!("Receipt sent");
        Ok(())
    }

    fn describe(&self) -> String {
        self.transport.describe()
    }
}

/// Appends receipts to a file, for spooling or inspection
#[derive(Debug, Clone)]
pub struct FileSink {
    path: String,
}

impl FileSink {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RawSink for FileSink {
    async fn print(&mut self, data: &[u8]) -> PrintResult<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.path, e)))?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path)
    }
}

/// Keeps every receipt in memory; the dummy driver
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    printed: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn printed(&self) -> Vec<Vec<u8>> {
        self.printed.lock().clone()
    }
}

#[async_trait]
impl RawSink for MemorySink {
    async fn print(&mut self, data: &[u8]) -> PrintResult<()> {
        info!(data_len = data.len(), "Dummy receipt");
        self.printed.lock().push(data.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "dummy".into()
    }
}
