//! Byte transports under a link session
//!
//! Supports:
//! - Serial ports (RS-232 and USB-serial adapters)
//! - Bluetooth RFCOMM device nodes
//! - TCP (serial-over-IP bridges)
//! - A scripted in-memory transport for tests
//!
//! Transports are created closed and opened on first use, so building one
//! never performs I/O.

mod mock;
mod network;
mod serial;

pub use mock::{AutoReply, MockTransport, Responder};
pub use network::TcpTransport;
pub use serial::SerialTransport;

use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use shared::models::DriverConfig;
use std::fmt::Debug;
use std::time::Duration;

/// Half-duplex byte pipe to one physical printer
#[async_trait]
pub trait Transport: Send + Debug {
    /// Open the underlying device; no-op when already open
    async fn open(&mut self) -> PrintResult<()>;

    async fn write_all(&mut self, data: &[u8]) -> PrintResult<()>;

    /// Read one byte, waiting at most `wait`; `None` when nothing arrived
    async fn read_byte(&mut self, wait: Duration) -> PrintResult<Option<u8>>;

    async fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Human readable target, for logs
    fn describe(&self) -> String;
}

/// Build a (closed) transport for a framed driver kind
pub fn for_driver(driver: &DriverConfig) -> PrintResult<Box<dyn Transport>> {
    match driver {
        DriverConfig::Serial { path, baud_rate } | DriverConfig::Bluetooth { path, baud_rate } => {
            Ok(Box::new(SerialTransport::new(path, *baud_rate)))
        }
        DriverConfig::Usb {
            path,
            vendor_id,
            product_id,
            baud_rate,
        } => match (path, vendor_id, product_id) {
            (Some(path), _, _) => Ok(Box::new(SerialTransport::new(path, *baud_rate))),
            (None, Some(vid), Some(pid)) => {
                Ok(Box::new(SerialTransport::usb(*vid, *pid, *baud_rate)))
            }
            _ => Err(PrintError::InvalidConfig(
                "usb driver needs a path or vendor_id and product_id".into(),
            )),
        },
        DriverConfig::Network { host, port } => Ok(Box::new(TcpTransport::new(host, *port))),
        DriverConfig::File { .. } | DriverConfig::Dummy => Err(PrintError::InvalidConfig(
            format!("{:?} driver has no byte transport", driver.kind()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_driver_does_not_open() {
        let t = for_driver(&DriverConfig::Serial {
            path: "/dev/does-not-exist".into(),
            baud_rate: 9600,
        })
        .unwrap();
        assert!(!t.is_open());
        assert!(t.describe().contains("/dev/does-not-exist"));
    }

    #[test]
    fn test_usb_requires_target() {
        let err = for_driver(&DriverConfig::Usb {
            path: None,
            vendor_id: Some(0x04b8),
            product_id: None,
            baud_rate: 9600,
        })
        .unwrap_err();
        assert!(matches!(err, PrintError::InvalidConfig(_)));
    }

    #[test]
    fn test_dummy_has_no_transport() {
        assert!(for_driver(&DriverConfig::Dummy).is_err());
    }
}
