//! Error types for the printer library

use shared::error::{AppError, ErrorCode, ErrorKind};
use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Reply checksum mismatch
    #[error("bad checksum")]
    BadChecksum,

    /// End marker or checksum digits missing
    #[error("truncated frame")]
    TruncatedFrame,

    /// Reply framed correctly but not usable
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// No byte at all within the wait window
    #[error("timeout")]
    Timeout,

    /// Reply stopped arriving mid-frame
    #[error("reply interrupted")]
    ReplyInterrupted,

    /// Retry budget exhausted
    #[error("too many retries")]
    TooManyRetries,

    /// Printer kept answering NAK
    #[error("too many NAKs from printer")]
    TooManyNaks,

    /// Link could not be opened
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error on an open link
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Printer status word reported a fault
    #[error("{message}")]
    PrinterStatus { code: ErrorCode, message: String },

    /// Fiscal status word reported a fault
    #[error("{message}")]
    FiscalStatus { code: ErrorCode, message: String },

    /// Caller data violates a fiscal rule
    #[error("{message}")]
    Validation { code: ErrorCode, message: String },

    /// Operation not valid for the open document
    #[error("{0}")]
    DocumentState(String),

    /// Operation not available on this printer
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Model not known for the configured brand
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Every recovery step failed; carries the last failure
    #[error("no recovery possible: {0}")]
    RecoveryFailed(Box<PrintError>),
}

impl PrintError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::ValidationFailed,
            message: message.into(),
        }
    }

    pub fn missing_tax_id(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::MissingTaxId,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            PrintError::BadChecksum => ErrorCode::BadChecksum,
            PrintError::TruncatedFrame => ErrorCode::TruncatedFrame,
            PrintError::MalformedReply(_) => ErrorCode::MalformedReply,
            PrintError::Timeout => ErrorCode::Timeout,
            PrintError::ReplyInterrupted => ErrorCode::ReplyInterrupted,
            PrintError::TooManyRetries => ErrorCode::TooManyRetries,
            PrintError::TooManyNaks => ErrorCode::TooManyNaks,
            PrintError::Connection(_) | PrintError::Io(_) => ErrorCode::LinkDown,
            PrintError::PrinterStatus { code, .. }
            | PrintError::FiscalStatus { code, .. }
            | PrintError::Validation { code, .. } => *code,
            PrintError::DocumentState(_) => ErrorCode::InvalidDocumentState,
            PrintError::Unsupported(_) => ErrorCode::UnsupportedOperation,
            PrintError::UnsupportedModel(_) => ErrorCode::UnsupportedModel,
            PrintError::InvalidConfig(_) => ErrorCode::ConfigError,
            PrintError::RecoveryFailed(inner) => inner.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }

    /// Link-level failure (the device may be in an unknown state)
    pub fn is_link_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::Protocol | ErrorKind::Communication)
    }
}

impl From<PrintError> for AppError {
    fn from(err: PrintError) -> Self {
        AppError::with_message(err.code(), err.to_string())
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
