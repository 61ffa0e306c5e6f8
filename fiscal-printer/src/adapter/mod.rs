//! Document lifecycle over brand specific command sets
//!
//! [`CommandAdapter`] is the model agnostic contract. [`Adapter`] is the
//! closed set of variants, picked once per configured printer by
//! [`Adapter::for_printer`].

mod epson;
mod hasar;
mod receipt;
pub mod tables;

pub use epson::{EpsonAdapter, EpsonModel};
pub use hasar::{HasarAdapter, HasarModel};
pub use receipt::ReceiptAdapter;

use crate::document::{Additional, Document, DocumentHeader, DocumentType, Item, Payment};
use crate::error::{PrintError, PrintResult};
use crate::link::{self, FiscalLink, Reply};
use crate::protocol::status::{self, StatusTable, Warning};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::error::ErrorCode;
use shared::models::{Brand, PrinterConfig};
use std::fmt::Debug;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Fiscal,
    Receipt,
}

/// Daily close flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosureKind {
    /// Preview, totals kept
    X,
    /// Final, totals reset
    Z,
}

impl ClosureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClosureKind::X => "X",
            ClosureKind::Z => "Z",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "X" | "x" => Some(ClosureKind::X),
            "Z" | "z" => Some(ClosureKind::Z),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosureReport {
    pub kind: ClosureKind,
    /// Named totals when the model reports them, raw fields otherwise
    pub fields: serde_json::Value,
}

/// Which recovery step left the printer without an open document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Recovery {
    pub step: &'static str,
}

/// Status words plus their decoded meaning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub printer_status: u16,
    pub fiscal_status: u16,
    /// First fault in the words, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<StatusFault>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub warnings: Vec<Warning>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusFault {
    pub code: ErrorCode,
    pub message: String,
}

impl DeviceStatus {
    pub fn from_reply(reply: &Reply, table: &StatusTable) -> PrintResult<Self> {
        let printer_status = reply.printer_status()?;
        let fiscal_status = reply.fiscal_status()?;
        let (fault, notice) = match table.decode(printer_status, fiscal_status) {
            Ok(clean) => (None, clean.notice.map(str::to_string)),
            Err(e) => (
                Some(StatusFault {
                    code: e.code(),
                    message: e.to_string(),
                }),
                None,
            ),
        };
        Ok(Self {
            printer_status,
            fiscal_status,
            fault,
            notice,
            warnings: status::warnings(printer_status),
            fields: reply.fields.clone(),
        })
    }
}

/// Shared document lifecycle
#[async_trait]
pub trait CommandAdapter: Send + Debug {
    fn capability(&self) -> Capability;

    /// Document currently tracked in memory
    fn document(&self) -> Option<&Document>;

    /// Fails with a validation error before any I/O when the customer
    /// lacks a tax id the document type requires
    async fn open_document(&mut self, header: DocumentHeader) -> PrintResult<()>;

    async fn add_item(&mut self, item: Item) -> PrintResult<()>;

    async fn add_payment(&mut self, payment: Payment) -> PrintResult<()>;

    async fn add_additional_charge(&mut self, additional: Additional) -> PrintResult<()>;

    /// Close the open document and return its number. Also safe when no
    /// document is open in memory: the device is re-synced instead.
    async fn close_document(&mut self) -> PrintResult<String>;

    async fn cancel_document(&mut self) -> PrintResult<()>;

    /// Leave the device with no open document, whatever it had open
    async fn cancel_any_document(&mut self) -> PrintResult<Recovery>;

    async fn daily_close(&mut self, kind: ClosureKind) -> PrintResult<ClosureReport>;

    /// Free text line on an open non-fiscal document
    async fn print_text(&mut self, text: &str) -> PrintResult<()>;

    async fn set_header(&mut self, lines: &[String]) -> PrintResult<()>;

    async fn set_trailer(&mut self, lines: &[String]) -> PrintResult<()>;

    async fn open_drawer(&mut self) -> PrintResult<()>;

    async fn status(&mut self) -> PrintResult<DeviceStatus>;

    /// Number of the last document of `doc_type` and `letter`
    async fn last_number(&mut self, doc_type: DocumentType, letter: Option<char>)
    -> PrintResult<u64>;

    async fn add_remit_item(&mut self, _description: &str, _quantity: f64) -> PrintResult<()> {
        Err(PrintError::Unsupported("remit items".into()))
    }

    /// Release the underlying link
    async fn close(&mut self);
}

/// One recovery command tried by `cancel_any_document`
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecoveryStep {
    pub name: &'static str,
    pub command: u8,
    pub fields: &'static [&'static str],
}

/// Try each step in order; the first that succeeds wins
pub(crate) async fn run_recovery(
    link: &mut dyn FiscalLink,
    steps: &[RecoveryStep],
) -> PrintResult<Recovery> {
    let mut last_error = None;
    for step in steps {
        let fields: Vec<String> = step.fields.iter().map(|f| f.to_string()).collect();
        match link.send_command(step.command, &fields, false).await {
            Ok(_) => {
                debug!(step = step.name, "Recovered printer state");
                return Ok(Recovery { step: step.name });
            }
            Err(e) => {
                debug!(step = step.name, error = %e, "Recovery step failed");
                last_error = Some(e);
            }
        }
    }
    let last = last_error.unwrap_or_else(|| PrintError::Unsupported("no recovery steps".into()));
    warn!(error = %last, "No recovery possible");
    Err(PrintError::RecoveryFailed(Box::new(last)))
}

pub(crate) fn document_mut(doc: &mut Option<Document>) -> PrintResult<&mut Document> {
    match doc {
        Some(doc) if doc.is_open() => Ok(doc),
        _ => Err(PrintError::DocumentState("no document is open".into())),
    }
}

pub(crate) fn ensure_closed(doc: &Option<Document>) -> PrintResult<()> {
    match doc {
        Some(doc) if doc.is_open() => Err(PrintError::DocumentState(format!(
            "a {:?} document is already open",
            doc.doc_type()
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn strings(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

/// Closed set of supported adapters
#[derive(Debug)]
pub enum Adapter {
    Epson(EpsonAdapter),
    Hasar(HasarAdapter),
    Receipt(ReceiptAdapter),
}

impl Adapter {
    /// Build the adapter for a configured printer; no I/O happens here
    pub fn for_printer(config: &PrinterConfig) -> PrintResult<Self> {
        let model = config.model_key();
        match config.brand {
            Brand::Epson => {
                let model = EpsonModel::from_key(&model)?;
                Ok(Adapter::Epson(EpsonAdapter::new(link::for_printer(config)?, model)))
            }
            Brand::Hasar => {
                let model = HasarModel::from_key(&model)?;
                Ok(Adapter::Hasar(HasarAdapter::new(link::for_printer(config)?, model)))
            }
            Brand::EscPos => Ok(Adapter::Receipt(ReceiptAdapter::for_driver(&config.driver)?)),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $a:ident => $body:expr) => {
        match $self {
            Adapter::Epson($a) => $body,
            Adapter::Hasar($a) => $body,
            Adapter::Receipt($a) => $body,
        }
    };
}

#[async_trait]
impl CommandAdapter for Adapter {
    fn capability(&self) -> Capability {
        dispatch!(self, a => a.capability())
    }

    fn document(&self) -> Option<&Document> {
        dispatch!(self, a => a.document())
    }

    async fn open_document(&mut self, header: DocumentHeader) -> PrintResult<()> {
        dispatch!(self, a => a.open_document(header).await)
    }

    async fn add_item(&mut self, item: Item) -> PrintResult<()> {
        dispatch!(self, a => a.add_item(item).await)
    }

    async fn add_payment(&mut self, payment: Payment) -> PrintResult<()> {
        dispatch!(self, a => a.add_payment(payment).await)
    }

    async fn add_additional_charge(&mut self, additional: Additional) -> PrintResult<()> {
        dispatch!(self, a => a.add_additional_charge(additional).await)
    }

    async fn close_document(&mut self) -> PrintResult<String> {
        dispatch!(self, a => a.close_document().await)
    }

    async fn cancel_document(&mut self) -> PrintResult<()> {
        dispatch!(self, a => a.cancel_document().await)
    }

    async fn cancel_any_document(&mut self) -> PrintResult<Recovery> {
        dispatch!(self, a => a.cancel_any_document().await)
    }

    async fn daily_close(&mut self, kind: ClosureKind) -> PrintResult<ClosureReport> {
        dispatch!(self, a => a.daily_close(kind).await)
    }

    async fn print_text(&mut self, text: &str) -> PrintResult<()> {
        dispatch!(self, a => a.print_text(text).await)
    }

    async fn set_header(&mut self, lines: &[String]) -> PrintResult<()> {
        dispatch!(self, a => a.set_header(lines).await)
    }

    async fn set_trailer(&mut self, lines: &[String]) -> PrintResult<()> {
        dispatch!(self, a => a.set_trailer(lines).await)
    }

    async fn open_drawer(&mut self) -> PrintResult<()> {
        dispatch!(self, a => a.open_drawer().await)
    }

    async fn status(&mut self) -> PrintResult<DeviceStatus> {
        dispatch!(self, a => a.status().await)
    }

    async fn last_number(
        &mut self,
        doc_type: DocumentType,
        letter: Option<char>,
    ) -> PrintResult<u64> {
        dispatch!(self, a => a.last_number(doc_type, letter).await)
    }

    async fn add_remit_item(&mut self, description: &str, quantity: f64) -> PrintResult<()> {
        dispatch!(self, a => a.add_remit_item(description, quantity).await)
    }

    async fn close(&mut self) {
        dispatch!(self, a => a.close().await)
    }
}
