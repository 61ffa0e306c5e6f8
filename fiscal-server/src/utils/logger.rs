//! Logging Infrastructure
//!
//! Structured logging for both development and production: a console or
//! daily rolling file writer, human readable or JSON.

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Logger settings, read from `LOG_LEVEL`, `LOG_JSON` and `LOG_DIR`
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// Fallback filter when `RUST_LOG` is unset
    pub level: Option<String>,
    pub json: bool,
    /// Daily rolling files go here when the directory exists
    pub log_dir: Option<String>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").ok().filter(|v| !v.trim().is_empty()),
            json: std::env::var("LOG_JSON")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|v| !v.trim().is_empty()),
        }
    }

    /// `RUST_LOG` wins; otherwise the configured level, then `info`
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = self.level.as_deref().unwrap_or("info");
            EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
        })
    }
}

/// Initialize the logger from the environment
pub fn init_logger() {
    init_logger_with(&LogSettings::from_env());
}

/// Initialize the logger with explicit settings
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init_logger_with(settings: &LogSettings) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter())
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let file_dir = settings
        .log_dir
        .as_deref()
        .filter(|dir| Path::new(dir).is_dir());

    let result = match (file_dir, settings.json) {
        (Some(dir), true) => {
            let appender = tracing_appender::rolling::daily(dir, "fiscal-server");
            builder.json().with_writer(appender).try_init()
        }
        (Some(dir), false) => {
            let appender = tracing_appender::rolling::daily(dir, "fiscal-server");
            builder.with_ansi(false).with_writer(appender).try_init()
        }
        (None, true) => builder.json().try_init(),
        (None, false) => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logger already initialized");
    }
}
