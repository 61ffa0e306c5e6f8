//! Data models
//!
//! Shared between the device library, the print server and remote
//! producers (via broker / HTTP API).

pub mod job;
pub mod printer;

// Re-exports
pub use job::*;
pub use printer::*;
