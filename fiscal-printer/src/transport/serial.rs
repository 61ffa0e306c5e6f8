//! Serial transport (RS-232, USB-serial, RFCOMM)

use super::Transport;
use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Path(String),
    /// Resolved against the enumerated ports when opened
    Usb { vendor_id: u16, product_id: u16 },
}

/// 8N1 serial port, no flow control
#[derive(Debug)]
pub struct SerialTransport {
    target: Target,
    baud_rate: u32,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(path: &str, baud_rate: u32) -> Self {
        Self {
            target: Target::Path(path.to_string()),
            baud_rate,
            stream: None,
        }
    }

    pub fn usb(vendor_id: u16, product_id: u16, baud_rate: u32) -> Self {
        Self {
            target: Target::Usb {
                vendor_id,
                product_id,
            },
            baud_rate,
            stream: None,
        }
    }

    fn resolve_path(&self) -> PrintResult<String> {
        match &self.target {
            Target::Path(path) => Ok(path.clone()),
            Target::Usb {
                vendor_id,
                product_id,
            } => {
                let ports = tokio_serial::available_ports()
                    .map_err(|e| PrintError::Connection(format!("port enumeration failed: {}", e)))?;
                ports
                    .into_iter()
                    .find(|p| match &p.port_type {
                        SerialPortType::UsbPort(usb) => {
                            usb.vid == *vendor_id && usb.pid == *product_id
                        }
                        _ => false,
                    })
                    .map(|p| p.port_name)
                    .ok_or_else(|| {
                        PrintError::Connection(format!(
                            "no USB serial device {:04x}:{:04x}",
                            vendor_id, product_id
                        ))
                    })
            }
        }
    }

    fn stream(&mut self) -> PrintResult<&mut SerialStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| PrintError::Connection("serial port not open".into()))
    }
}

#[async_trait]
impl Transport for SerialTransport {
    #[instrument(skip(self), fields(target = %self.describe()))]
    async fn open(&mut self) -> PrintResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let path = self.resolve_path()?;
        debug!(baud = self.baud_rate, "Opening serial port {}", path);

        let stream = tokio_serial::new(&path, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| PrintError::Connection(format!("{}: {}", path, e)))?;

        info!("Serial port opened: {}", path);
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
                warn!("Serial port closed by device");
                self.stream = None;
                Err(PrintError::Connection("serial port closed".into()))
            }
            Ok(Ok(_)) => Ok(Some(byte[0])),
            Ok(Err(e)) => {
                self.stream = None;
                Err(PrintError::Io(e))
            }
        }
    }

    async fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(target = %self.describe(), "Serial port closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn describe(&self) -> String {
        match &self.target {
            Target::Path(path) => format!("serial:{}@{}", path, self.baud_rate),
            Target::Usb {
                vendor_id,
                product_id,
            } => format!("usb:{:04x}:{:04x}@{}", vendor_id, product_id, self.baud_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(
            SerialTransport::new("/dev/ttyUSB0", 9600).describe(),
            "serial:/dev/ttyUSB0@9600"
        );
        assert_eq!(
            SerialTransport::usb(0x04b8, 0x0202, 38400).describe(),
            "usb:04b8:0202@38400"
        );
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let mut t = SerialTransport::new("/dev/fiscal-printer-missing", 9600);
        let err = t.open().await.unwrap_err();
        assert!(matches!(err, PrintError::Connection(_)));
        assert!(!t.is_open());
    }

    #[tokio::test]
    async fn test_io_before_open_fails() {
        let mut t = SerialTransport::new("/dev/ttyS0", 9600);
        assert!(t.write_all(b"x").await.is_err());
    }
}
