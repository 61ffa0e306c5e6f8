//! Command links to fiscal printers
//!
//! A [`FiscalLink`] sends one command and returns the printer's reply
//! fields. Implementations:
//! - [`LinkSession`]: framed stop-and-wait protocol over a [`Transport`]
//! - [`DummyLink`]: answers everything, records a journal
//! - [`FileLink`]: appends commands to a file
//!
//! [`Transport`]: crate::transport::Transport

mod dummy;
mod file;
mod session;

pub use dummy::{DummyLink, Journal, JournalEntry};
pub use file::FileLink;
pub use session::{LinkConfig, LinkSession, LinkVariant};

use crate::error::{PrintError, PrintResult};
use crate::protocol::status::{self, StatusTable};
use crate::transport;
use async_trait::async_trait;
use serde::Serialize;
use shared::models::{Brand, DriverConfig, PrinterConfig};
use std::fmt::Debug;

/// Decoded reply: `fields[0]` printer status, `fields[1]` fiscal status
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Reply {
    pub fields: Vec<String>,
    /// Informational status condition, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl Reply {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            notice: None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Field that must be present
    pub fn required(&self, index: usize) -> PrintResult<&str> {
        self.field(index).ok_or_else(|| {
            PrintError::MalformedReply(format!(
                "expected field {} in a reply of {} fields",
                index,
                self.fields.len()
            ))
        })
    }

    /// Field parsed as a number
    pub fn number(&self, index: usize) -> PrintResult<u64> {
        let raw = self.required(index)?;
        raw.trim()
            .parse()
            .map_err(|_| PrintError::MalformedReply(format!("field {} is not a number: '{}'", index, raw)))
    }

    pub fn printer_status(&self) -> PrintResult<u16> {
        status::parse_word(self.required(0)?)
    }

    pub fn fiscal_status(&self) -> PrintResult<u16> {
        status::parse_word(self.required(1)?)
    }

    /// Raise the first fault in the status words
    pub fn check(&mut self, table: &StatusTable) -> PrintResult<()> {
        let clean = table.decode(self.printer_status()?, self.fiscal_status()?)?;
        self.notice = clean.notice.map(str::to_string);
        Ok(())
    }

    /// Fields after the two status words
    pub fn payload(&self) -> &[String] {
        self.fields.get(2..).unwrap_or(&[])
    }
}

/// One command in, one reply out
#[async_trait]
pub trait FiscalLink: Send + Debug {
    /// Send `command` with `fields`; unless `skip_status`, a fault in the
    /// reply's status words is returned as an error
    async fn send_command(
        &mut self,
        command: u8,
        fields: &[String],
        skip_status: bool,
    ) -> PrintResult<Reply>;

    async fn close(&mut self);
}

/// Build a (not yet connected) link for a fiscal printer
pub fn for_printer(config: &PrinterConfig) -> PrintResult<Box<dyn FiscalLink>> {
    let variant = match config.brand {
        Brand::Epson => LinkVariant::Epson,
        Brand::Hasar => LinkVariant::Hasar,
        Brand::EscPos => {
            return Err(PrintError::InvalidConfig(format!(
                "printer '{}' is not a fiscal printer",
                config.name
            )));
        }
    };

    match &config.driver {
        DriverConfig::Dummy => Ok(Box::new(DummyLink::new())),
        DriverConfig::File { path } => Ok(Box::new(FileLink::new(path))),
        driver => {
            let transport = transport::for_driver(driver)?;
            Ok(Box::new(LinkSession::new(transport, variant)))
        }
    }
}
