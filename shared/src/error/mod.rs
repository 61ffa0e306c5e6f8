//! Unified error system
//!
//! - [`ErrorCode`]: numeric code for every failure the stack can produce
//! - [`ErrorKind`]: the taxonomy kind, derived from the code range
//! - [`AppError`]: code + message + optional structured details
//! - [`ApiResponse`]: unified HTTP response envelope
//!
//! # Error Code Ranges
//!
//! | Range | Kind |
//! |-------|------|
//! | 0xxx | general |
//! | 1xxx | `ProtocolError` |
//! | 2xxx | `CommunicationError` |
//! | 3xxx | `PrinterStatusError` |
//! | 4xxx | `FiscalStatusError` |
//! | 5xxx | `ValidationError` |
//! | 60xx | `QueueFull` |
//! | 61xx | `PrintJobTimeout` |
//! | 62xx | `StuckPrintJob` |
//! | 7xxx | `ConfigurationError` |
//! | 8xxx | `BrokerError` |
//! | 9xxx | `InternalError` |
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode, ErrorKind};
//!
//! let err = AppError::with_message(ErrorCode::MissingTaxId, "CUIT required")
//!     .with_detail("printer", "P1");
//! assert_eq!(err.kind(), ErrorKind::Validation);
//! ```

mod codes;
mod http;
mod kind;
mod types;

pub use codes::{ErrorCode, InvalidErrorCode};
pub use kind::ErrorKind;
pub use types::{ApiResponse, AppError, AppResult};
