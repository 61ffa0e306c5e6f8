//! Printer registry
//!
//! Owns the configured printers and one adapter session per printer. The
//! session map lock is only held to create or replace an entry; device
//! I/O happens under the printer's own async mutex, which is also what
//! keeps two workers off the same link.

use crate::core::{Result, ServerError};
use dashmap::DashMap;
use fiscal_printer::{Adapter, CommandAdapter};
use parking_lot::RwLock;
use serde::Serialize;
use shared::error::{AppError, AppResult};
use shared::models::{Brand, DriverKind, PrinterConfig};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type PrinterSession = Arc<Mutex<Adapter>>;

#[derive(Debug, Clone, Serialize)]
pub struct PrinterInfo {
    pub name: String,
    pub brand: Brand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub driver: DriverKind,
    /// An adapter has been created for this printer
    pub session_live: bool,
}

#[derive(Debug, Default)]
pub struct PrinterRegistry {
    configs: RwLock<HashMap<String, PrinterConfig>>,
    sessions: DashMap<String, PrinterSession>,
}

impl PrinterRegistry {
    pub fn new(configs: Vec<PrinterConfig>) -> Self {
        let registry = Self::default();
        {
            let mut map = registry.configs.write();
            for config in configs {
                if map.insert(config.name.clone(), config).is_some() {
                    tracing::warn!("Duplicate printer name in configuration, last one wins");
                }
            }
        }
        registry
    }

    /// Load a JSON array of printer records; a missing file is an empty
    /// registry
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Printers file not found, no printers configured");
            return Ok(Self::default());
        }
        let raw = std::fs::read(path)?;
        let configs: Vec<PrinterConfig> = serde_json::from_slice(&raw).map_err(|e| {
            ServerError::Config(format!("{}: invalid printer configuration: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), count = configs.len(), "Printers loaded");
        Ok(Self::new(configs))
    }

    pub fn config(&self, name: &str) -> AppResult<PrinterConfig> {
        self.configs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::printer_not_found(name))
    }

    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }

    /// Session for `name`, building the adapter on first use
    ///
    /// Unknown names and unusable configurations fail here, before any
    /// device I/O.
    pub fn session(&self, name: &str) -> AppResult<PrinterSession> {
        if let Some(session) = self.sessions.get(name) {
            return Ok(session.clone());
        }
        let config = self.config(name)?;
        let entry = self.sessions.entry(name.to_string());
        let session = match entry {
            dashmap::mapref::entry::Entry::Occupied(o) => o.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let adapter = Adapter::for_printer(&config)
                    .map_err(|e| AppError::from(e).with_detail("printer", name))?;
                tracing::info!(printer = %name, brand = ?config.brand, driver = ?config.driver.kind(), "Printer session created");
                v.insert(Arc::new(Mutex::new(adapter))).clone()
            }
        };
        Ok(session)
    }

    /// Install a ready-made adapter for `name` (which must be configured),
    /// closing the one it replaces
    pub async fn install(&self, name: &str, adapter: Adapter) -> AppResult<()> {
        self.config(name)?;
        let previous = self
            .sessions
            .insert(name.to_string(), Arc::new(Mutex::new(adapter)));
        if let Some(previous) = previous {
            previous.lock().await.close().await;
        }
        Ok(())
    }

    /// Add or replace a printer; a live session is closed and rebuilt on
    /// next use
    pub async fn upsert(&self, config: PrinterConfig) {
        let name = config.name.clone();
        self.configs.write().insert(name.clone(), config);
        let previous = self.sessions.remove(&name).map(|(_, s)| s);
        if let Some(previous) = previous {
            previous.lock().await.close().await;
            tracing::info!(printer = %name, "Printer session replaced");
        }
    }

    pub fn list(&self) -> Vec<PrinterInfo> {
        let mut printers: Vec<_> = self
            .configs
            .read()
            .values()
            .map(|c| PrinterInfo {
                name: c.name.clone(),
                brand: c.brand,
                model: c.model.clone(),
                driver: c.driver.kind(),
                session_live: self.sessions.contains_key(&c.name),
            })
            .collect();
        printers.sort_by(|a, b| a.name.cmp(&b.name));
        printers
    }

    /// Close every session; waits for jobs still holding one
    pub async fn close_all(&self) {
        let sessions: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        self.sessions.clear();
        for session in sessions {
            session.lock().await.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::error::{ErrorCode, ErrorKind};
    use shared::models::DriverConfig;

    fn registry() -> PrinterRegistry {
        PrinterRegistry::new(vec![
            PrinterConfig::new("P1", Brand::Epson, DriverConfig::Dummy),
            PrinterConfig::new("P2", Brand::Hasar, DriverConfig::Dummy).with_model("lx9000"),
        ])
    }

    #[test]
    fn test_session_reused() {
        let registry = registry();
        let a = registry.session("P1").unwrap();
        let b = registry.session("P1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.list()[0].session_live);
        assert!(!registry.list()[1].session_live);
    }

    #[test]
    fn test_configuration_errors_before_io() {
        let registry = registry();
        let err = registry.session("nope").unwrap_err();
        assert_eq!(err.code, ErrorCode::PrinterNotFound);

        let err = registry.session("P2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.detail("printer").unwrap(), "P2");
    }

    #[tokio::test]
    async fn test_upsert_drops_session() {
        let registry = registry();
        let first = registry.session("P1").unwrap();
        registry
            .upsert(PrinterConfig::new("P1", Brand::Hasar, DriverConfig::Dummy))
            .await;
        let second = registry.session("P1").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.config("P1").unwrap().brand, Brand::Hasar);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printers.json");
        std::fs::write(
            &path,
            r#"[{"name":"Caja","brand":"epson","model":"tm-220-af","driver":"serial","path":"/dev/ttyUSB0"},
                {"name":"Cocina","brand":"escpos","driver":"network","host":"10.0.0.9"}]"#,
        )
        .unwrap();
        let registry = PrinterRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list()[1].driver, DriverKind::Network);

        assert!(PrinterRegistry::load(dir.path().join("missing.json")).unwrap().is_empty());

        std::fs::write(&path, "{").unwrap();
        assert!(matches!(PrinterRegistry::load(&path), Err(ServerError::Config(_))));
    }
}
