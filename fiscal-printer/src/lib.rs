//! # fiscal-printer
//!
//! Device library for Argentine fiscal printers and plain ESC/POS receipt
//! printers.
//!
//! ## Layers
//!
//! - [`transport`]: byte pipes (serial, USB-serial, Bluetooth RFCOMM, TCP)
//! - [`protocol`]: frame codec, sequence numbers, status word tables
//! - [`link`]: one command in, one reply out, with retries and NAK handling
//! - [`adapter`]: document lifecycle per brand and model
//!
//! The crate knows HOW to talk to a printer. Which printer runs which job,
//! and when, is decided by the server.
//!
//! ## Example
//!
//! ```ignore
//! use fiscal_printer::{Adapter, CommandAdapter, DocumentHeader, Item, Payment};
//!
//! let mut printer = Adapter::for_printer(&config)?;
//! printer.open_document(DocumentHeader::ticket()).await?;
//! printer.add_item(Item::new("Cafe", 1.0, 2.5, 21.0)).await?;
//! printer.add_payment(Payment::new("Efectivo", 2.5)).await?;
//! let number = printer.close_document().await?;
//! ```

pub mod adapter;
pub mod document;
pub mod encoding;
mod error;
pub mod escpos;
pub mod link;
pub mod money;
pub mod protocol;
pub mod sink;
pub mod transport;

// Re-exports
pub use adapter::{
    Adapter, Capability, ClosureKind, ClosureReport, CommandAdapter, DeviceStatus, EpsonAdapter,
    EpsonModel, HasarAdapter, HasarModel, ReceiptAdapter, Recovery, StatusFault,
};
pub use document::{
    Additional, Customer, DocType, Document, DocumentHeader, DocumentState, DocumentType, IvaType,
    Item, Payment,
};
pub use error::{PrintError, PrintResult};
pub use escpos::EscPosBuilder;
pub use link::{DummyLink, FiscalLink, Journal, LinkSession, LinkVariant, Reply};
pub use sink::RawSink;
pub use transport::{MockTransport, Transport};
