//! Printer Configuration Model

use serde::{Deserialize, Deserializer, Serialize};

/// Printer brand, selects the command adapter variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Epson,
    Hasar,
    /// Plain ESC/POS receipt printer (no fiscal memory)
    EscPos,
}

impl Brand {
    pub fn is_fiscal(&self) -> bool {
        !matches!(self, Brand::EscPos)
    }
}

/// Physical connection method and its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum DriverConfig {
    Serial {
        path: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// USB-serial adapter; resolved by path, or by vendor/product id
    Usb {
        #[serde(default)]
        path: Option<String>,
        #[serde(default, deserialize_with = "de_usb_id")]
        vendor_id: Option<u16>,
        #[serde(default, deserialize_with = "de_usb_id")]
        product_id: Option<u16>,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    Network {
        host: String,
        #[serde(default = "default_network_port")]
        port: u16,
    },
    /// Bound RFCOMM device (e.g. /dev/rfcomm0)
    Bluetooth {
        path: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    File {
        path: String,
    },
    Dummy,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_network_port() -> u16 {
    9100
}

/// Accepts `"0x04b8"`, `"04b8"` or `1208`
fn de_usb_id<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u16),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => {
            let hex = s
                .trim()
                .trim_start_matches("0x")
                .trim_start_matches("0X");
            u16::from_str_radix(hex, 16)
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid USB id: {}", s)))
        }
    }
}

/// Driver kind without parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Serial,
    Usb,
    Network,
    Bluetooth,
    File,
    Dummy,
}

impl DriverConfig {
    pub fn kind(&self) -> DriverKind {
        match self {
            DriverConfig::Serial { .. } => DriverKind::Serial,
            DriverConfig::Usb { .. } => DriverKind::Usb,
            DriverConfig::Network { .. } => DriverKind::Network,
            DriverConfig::Bluetooth { .. } => DriverKind::Bluetooth,
            DriverConfig::File { .. } => DriverKind::File,
            DriverConfig::Dummy => DriverKind::Dummy,
        }
    }
}

/// Printer configuration record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub name: String,
    pub brand: Brand,
    /// Model identifier, e.g. "tm-220-af" or "715v2"
    #[serde(default)]
    pub model: Option<String>,
    #[serde(flatten)]
    pub driver: DriverConfig,
}

impl PrinterConfig {
    pub fn new(name: impl Into<String>, brand: Brand, driver: DriverConfig) -> Self {
        Self {
            name: name.into(),
            brand,
            model: None,
            driver,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Lowercased model, empty when unset
    pub fn model_key(&self) -> String {
        self.model
            .as_deref()
            .map(|m| m.trim().to_lowercase())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serial() {
        let json = r#"{"name":"P1","brand":"epson","model":"tm-220-af","driver":"serial","path":"/dev/ttyS0"}"#;
        let cfg: PrinterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.brand, Brand::Epson);
        assert_eq!(
            cfg.driver,
            DriverConfig::Serial {
                path: "/dev/ttyS0".into(),
                baud_rate: 9600
            }
        );
        assert_eq!(cfg.model_key(), "tm-220-af");
    }

    #[test]
    fn test_parse_usb_ids() {
        let json = r#"{"name":"U","brand":"hasar","driver":"usb","vendor_id":"0x04b8","product_id":514}"#;
        let cfg: PrinterConfig = serde_json::from_str(json).unwrap();
        match cfg.driver {
            DriverConfig::Usb {
                vendor_id,
                product_id,
                path,
                ..
            } => {
                assert_eq!(vendor_id, Some(0x04b8));
                assert_eq!(product_id, Some(514));
                assert!(path.is_none());
            }
            other => panic!("unexpected driver {:?}", other),
        }
    }

    #[test]
    fn test_parse_bad_usb_id() {
        let json = r#"{"name":"U","brand":"hasar","driver":"usb","vendor_id":"zz"}"#;
        assert!(serde_json::from_str::<PrinterConfig>(json).is_err());
    }

    #[test]
    fn test_parse_dummy_and_network() {
        let cfg: PrinterConfig =
            serde_json::from_str(r#"{"name":"D","brand":"hasar","driver":"dummy"}"#).unwrap();
        assert_eq!(cfg.driver.kind(), DriverKind::Dummy);
        assert!(cfg.model.is_none());

        let cfg: PrinterConfig = serde_json::from_str(
            r#"{"name":"N","brand":"escpos","driver":"network","host":"10.0.0.9"}"#,
        )
        .unwrap();
        assert!(!cfg.brand.is_fiscal());
        assert_eq!(
            cfg.driver,
            DriverConfig::Network {
                host: "10.0.0.9".into(),
                port: 9100
            }
        );
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let json = r#"{"name":"X","brand":"epson","driver":"parallel"}"#;
        assert!(serde_json::from_str::<PrinterConfig>(json).is_err());
    }
}
