//! Utilities
//!
//! - [`logger`] - tracing subscriber setup

pub mod logger;

pub use logger::{LogSettings, init_logger, init_logger_with};
