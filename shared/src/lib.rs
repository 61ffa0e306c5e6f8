//! Shared types for the fiscal printer stack
//!
//! Common types used across the device library and the print server:
//! the error taxonomy, printer configuration records and job payloads.

pub mod error;
pub mod models;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode, ErrorKind};
pub use models::{
    Brand, DriverConfig, DriverKind, JobArgs, JobError, JobRequest, JobResult, JobState,
    OperationKind, PrinterConfig,
};
