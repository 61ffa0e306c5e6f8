//! Unified error codes for the fiscal printer stack
//!
//! Error codes are organized by taxonomy kind:
//! - 0xxx: General errors
//! - 1xxx: Protocol errors (framing, checksum, sequence)
//! - 2xxx: Communication errors (timeouts, link down)
//! - 3xxx: Printer status errors (reported by the device)
//! - 4xxx: Fiscal status errors (reported by the device)
//! - 5xxx: Validation errors (caller data)
//! - 6xxx: Pipeline errors (queue full, timeouts, stuck jobs)
//! - 7xxx: Configuration errors
//! - 8xxx: Broker errors
//! - 9xxx: Internal errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// Codes are plain u16 values so they survive JSON, AMQP headers and
/// log lines unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format (payload could not be decoded)
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,

    // ==================== 1xxx: Protocol ====================
    /// Reply checksum does not match its body
    BadChecksum = 1001,
    /// End marker never observed
    TruncatedFrame = 1002,
    /// Reply echoes a different sequence number
    StaleSequence = 1003,
    /// Reply is framed correctly but its status fields are unusable
    MalformedReply = 1004,

    // ==================== 2xxx: Communication ====================
    /// No byte received within the wait window
    Timeout = 2001,
    /// Reply stopped arriving in the middle of a frame
    ReplyInterrupted = 2002,
    /// Retry budget exhausted
    TooManyRetries = 2003,
    /// Printer kept rejecting the frame
    TooManyNaks = 2004,
    /// Link could not be opened or broke
    LinkDown = 2005,

    // ==================== 3xxx: Printer status ====================
    /// Printer error or mechanical fault
    PrinterFault = 3001,
    /// Printer offline
    PrinterOffline = 3002,
    /// Printer buffer full
    PrinterBufferFull = 3003,
    /// Printer cover open
    CoverOpen = 3004,
    /// Printer out of paper
    OutOfPaper = 3005,

    // ==================== 4xxx: Fiscal status ====================
    /// Fiscal memory error
    FiscalMemoryError = 4001,
    /// Working memory check error
    WorkingMemoryError = 4002,
    /// Low battery
    LowBattery = 4003,
    /// Command not recognized by the printer
    UnknownCommand = 4004,
    /// Invalid data field
    InvalidDataField = 4005,
    /// Command not valid for the current fiscal state
    InvalidFiscalState = 4006,
    /// Totals overflow
    TotalsOverflow = 4007,
    /// Fiscal memory full
    FiscalMemoryFull = 4008,
    /// Fiscal memory almost full
    FiscalMemoryAlmostFull = 4009,
    /// Daily close required
    DailyCloseRequired = 4010,

    // ==================== 5xxx: Validation ====================
    /// Validation failed
    ValidationFailed = 5001,
    /// Customer tax ID missing or invalid for the tax category
    MissingTaxId = 5002,
    /// Document lifecycle violation (e.g. item after close)
    InvalidDocumentState = 5003,
    /// Operation not supported by this printer
    UnsupportedOperation = 5004,
    /// Job payload could not be translated into document operations
    TranslationFailed = 5005,

    // ==================== 60xx: Queue full ====================
    /// Job queue at capacity
    QueueFull = 6001,
    /// Job queue no longer accepting jobs
    QueueClosed = 6002,

    // ==================== 61xx: Print job timeout ====================
    /// Caller stopped waiting for the job result
    PrintJobTimeout = 6101,

    // ==================== 62xx: Stuck print job ====================
    /// Job exceeded the stuck threshold
    StuckPrintJob = 6201,

    // ==================== 7xxx: Configuration ====================
    /// Malformed configuration
    ConfigError = 7001,
    /// Unknown printer name
    PrinterNotFound = 7002,
    /// Driver kind not usable for this brand
    UnsupportedDriver = 7003,
    /// Model not known for this brand
    UnsupportedModel = 7004,

    // ==================== 8xxx: Broker ====================
    /// Broker connection failed
    BrokerConnectionFailed = 8001,
    /// Broker channel or topology error
    BrokerChannelError = 8002,
    /// Delivery could not be acknowledged
    BrokerDeliveryFailed = 8003,

    // ==================== 9xxx: Internal ====================
    /// Internal error
    InternalError = 9001,
    /// Worker pool unavailable
    WorkerUnavailable = 9002,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",

            // Protocol
            ErrorCode::BadChecksum => "bad checksum",
            ErrorCode::TruncatedFrame => "truncated frame",
            ErrorCode::StaleSequence => "stale sequence number",
            ErrorCode::MalformedReply => "malformed reply",

            // Communication
            ErrorCode::Timeout => "timeout",
            ErrorCode::ReplyInterrupted => "reply interrupted",
            ErrorCode::TooManyRetries => "too many retries",
            ErrorCode::TooManyNaks => "too many NAKs from printer",
            ErrorCode::LinkDown => "link down",

            // Printer status
            ErrorCode::PrinterFault => "Printer error or fault",
            ErrorCode::PrinterOffline => "Printer offline",
            ErrorCode::PrinterBufferFull => "Printer buffer full",
            ErrorCode::CoverOpen => "Printer cover open",
            ErrorCode::OutOfPaper => "Printer out of paper",

            // Fiscal status
            ErrorCode::FiscalMemoryError => "Fiscal memory error",
            ErrorCode::WorkingMemoryError => "Working memory check error",
            ErrorCode::LowBattery => "Low battery",
            ErrorCode::UnknownCommand => "Command not recognized",
            ErrorCode::InvalidDataField => "Invalid data field",
            ErrorCode::InvalidFiscalState => "Command not valid for the fiscal state",
            ErrorCode::TotalsOverflow => "Totals overflow",
            ErrorCode::FiscalMemoryFull => "Fiscal memory full",
            ErrorCode::FiscalMemoryAlmostFull => "Fiscal memory almost full",
            ErrorCode::DailyCloseRequired => {
                "Daily close required or maximum tickets per bill exceeded"
            }

            // Validation
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::MissingTaxId => "Customer tax ID required for this tax category",
            ErrorCode::InvalidDocumentState => "Operation not valid for the document state",
            ErrorCode::UnsupportedOperation => "Operation not supported by this printer",
            ErrorCode::TranslationFailed => "Job payload could not be translated",

            // Pipeline
            ErrorCode::QueueFull => "Print queue full",
            ErrorCode::QueueClosed => "Print queue closed",
            ErrorCode::PrintJobTimeout => "Print job timed out",
            ErrorCode::StuckPrintJob => "Print job stuck",

            // Configuration
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::PrinterNotFound => "Printer not found",
            ErrorCode::UnsupportedDriver => "Driver not supported for this printer",
            ErrorCode::UnsupportedModel => "Model not supported",

            // Broker
            ErrorCode::BrokerConnectionFailed => "Broker connection failed",
            ErrorCode::BrokerChannelError => "Broker channel error",
            ErrorCode::BrokerDeliveryFailed => "Broker delivery could not be settled",

            // Internal
            ErrorCode::InternalError => "Internal error",
            ErrorCode::WorkerUnavailable => "Worker pool unavailable",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            3 => Ok(ErrorCode::NotFound),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),

            // Protocol
            1001 => Ok(ErrorCode::BadChecksum),
            1002 => Ok(ErrorCode::TruncatedFrame),
            1003 => Ok(ErrorCode::StaleSequence),
            1004 => Ok(ErrorCode::MalformedReply),

            // Communication
            2001 => Ok(ErrorCode::Timeout),
            2002 => Ok(ErrorCode::ReplyInterrupted),
            2003 => Ok(ErrorCode::TooManyRetries),
            2004 => Ok(ErrorCode::TooManyNaks),
            2005 => Ok(ErrorCode::LinkDown),

            // Printer status
            3001 => Ok(ErrorCode::PrinterFault),
            3002 => Ok(ErrorCode::PrinterOffline),
            3003 => Ok(ErrorCode::PrinterBufferFull),
            3004 => Ok(ErrorCode::CoverOpen),
            3005 => Ok(ErrorCode::OutOfPaper),

            // Fiscal status
            4001 => Ok(ErrorCode::FiscalMemoryError),
            4002 => Ok(ErrorCode::WorkingMemoryError),
            4003 => Ok(ErrorCode::LowBattery),
            4004 => Ok(ErrorCode::UnknownCommand),
            4005 => Ok(ErrorCode::InvalidDataField),
            4006 => Ok(ErrorCode::InvalidFiscalState),
            4007 => Ok(ErrorCode::TotalsOverflow),
            4008 => Ok(ErrorCode::FiscalMemoryFull),
            4009 => Ok(ErrorCode::FiscalMemoryAlmostFull),
            4010 => Ok(ErrorCode::DailyCloseRequired),

            // Validation
            5001 => Ok(ErrorCode::ValidationFailed),
            5002 => Ok(ErrorCode::MissingTaxId),
            5003 => Ok(ErrorCode::InvalidDocumentState),
            5004 => Ok(ErrorCode::UnsupportedOperation),
            5005 => Ok(ErrorCode::TranslationFailed),

            // Pipeline
            6001 => Ok(ErrorCode::QueueFull),
            6002 => Ok(ErrorCode::QueueClosed),
            6101 => Ok(ErrorCode::PrintJobTimeout),
            6201 => Ok(ErrorCode::StuckPrintJob),

            // Configuration
            7001 => Ok(ErrorCode::ConfigError),
            7002 => Ok(ErrorCode::PrinterNotFound),
            7003 => Ok(ErrorCode::UnsupportedDriver),
            7004 => Ok(ErrorCode::UnsupportedModel),

            // Broker
            8001 => Ok(ErrorCode::BrokerConnectionFailed),
            8002 => Ok(ErrorCode::BrokerChannelError),
            8003 => Ok(ErrorCode::BrokerDeliveryFailed),

            // Internal
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::WorkerUnavailable),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::BadChecksum.code(), 1001);
        assert_eq!(ErrorCode::TooManyRetries.code(), 2003);
        assert_eq!(ErrorCode::OutOfPaper.code(), 3005);
        assert_eq!(ErrorCode::FiscalMemoryFull.code(), 4008);
        assert_eq!(ErrorCode::MissingTaxId.code(), 5002);
        assert_eq!(ErrorCode::QueueFull.code(), 6001);
        assert_eq!(ErrorCode::PrintJobTimeout.code(), 6101);
        assert_eq!(ErrorCode::StuckPrintJob.code(), 6201);
        assert_eq!(ErrorCode::PrinterNotFound.code(), 7002);
        assert_eq!(ErrorCode::BrokerConnectionFailed.code(), 8001);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_try_from_covers_every_code() {
        let codes = [
            ErrorCode::Success,
            ErrorCode::Unknown,
            ErrorCode::NotFound,
            ErrorCode::InvalidRequest,
            ErrorCode::InvalidFormat,
            ErrorCode::RequiredField,
            ErrorCode::BadChecksum,
            ErrorCode::TruncatedFrame,
            ErrorCode::StaleSequence,
            ErrorCode::MalformedReply,
            ErrorCode::Timeout,
            ErrorCode::ReplyInterrupted,
            ErrorCode::TooManyRetries,
            ErrorCode::TooManyNaks,
            ErrorCode::LinkDown,
            ErrorCode::PrinterFault,
            ErrorCode::PrinterOffline,
            ErrorCode::PrinterBufferFull,
            ErrorCode::CoverOpen,
            ErrorCode::OutOfPaper,
            ErrorCode::FiscalMemoryError,
            ErrorCode::WorkingMemoryError,
            ErrorCode::LowBattery,
            ErrorCode::UnknownCommand,
            ErrorCode::InvalidDataField,
            ErrorCode::InvalidFiscalState,
            ErrorCode::TotalsOverflow,
            ErrorCode::FiscalMemoryFull,
            ErrorCode::FiscalMemoryAlmostFull,
            ErrorCode::DailyCloseRequired,
            ErrorCode::ValidationFailed,
            ErrorCode::MissingTaxId,
            ErrorCode::InvalidDocumentState,
            ErrorCode::UnsupportedOperation,
            ErrorCode::TranslationFailed,
            ErrorCode::QueueFull,
            ErrorCode::QueueClosed,
            ErrorCode::PrintJobTimeout,
            ErrorCode::StuckPrintJob,
            ErrorCode::ConfigError,
            ErrorCode::PrinterNotFound,
            ErrorCode::UnsupportedDriver,
            ErrorCode::UnsupportedModel,
            ErrorCode::BrokerConnectionFailed,
            ErrorCode::BrokerChannelError,
            ErrorCode::BrokerDeliveryFailed,
            ErrorCode::InternalError,
            ErrorCode::WorkerUnavailable,
        ];
        for code in codes {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(999), Err(InvalidErrorCode(999)));
        assert_eq!(ErrorCode::try_from(1999), Err(InvalidErrorCode(1999)));
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&ErrorCode::BadChecksum).unwrap();
        assert_eq!(json, "1001");

        let code: ErrorCode = serde_json::from_str("6001").unwrap();
        assert_eq!(code, ErrorCode::QueueFull);

        let result: Result<ErrorCode, _> = serde_json::from_str("12");
        assert!(result.is_err());
    }

    #[test]
    fn test_protocol_messages() {
        assert_eq!(ErrorCode::BadChecksum.message(), "bad checksum");
        assert_eq!(ErrorCode::TruncatedFrame.message(), "truncated frame");
        assert_eq!(ErrorCode::TooManyRetries.message(), "too many retries");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorCode::Timeout), "2001");
        assert_eq!(format!("{}", InvalidErrorCode(42)), "invalid error code: 42");
    }
}
