//! Error taxonomy kinds

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Taxonomy kind, determined by the error code range
///
/// This is what job results and error reports carry as `errorKind`, so the
/// serialized names are stable strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 0xxx
    #[serde(rename = "GeneralError")]
    General,
    /// 1xxx: framing, checksum, sequence corruption
    #[serde(rename = "ProtocolError")]
    Protocol,
    /// 2xxx: timeouts, link down, no reply
    #[serde(rename = "CommunicationError")]
    Communication,
    /// 3xxx: printer reported a mechanical condition
    #[serde(rename = "PrinterStatusError")]
    PrinterStatus,
    /// 4xxx: printer reported a fiscal condition
    #[serde(rename = "FiscalStatusError")]
    FiscalStatus,
    /// 5xxx
    #[serde(rename = "ValidationError")]
    Validation,
    /// 60xx
    #[serde(rename = "QueueFull")]
    QueueFull,
    /// 61xx
    #[serde(rename = "PrintJobTimeout")]
    PrintJobTimeout,
    /// 62xx
    #[serde(rename = "StuckPrintJob")]
    StuckPrintJob,
    /// 7xxx
    #[serde(rename = "ConfigurationError")]
    Configuration,
    /// 8xxx
    #[serde(rename = "BrokerError")]
    Broker,
    /// 9xxx
    #[serde(rename = "InternalError")]
    Internal,
}

impl ErrorKind {
    /// Determine kind from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Protocol,
            2000..3000 => Self::Communication,
            3000..4000 => Self::PrinterStatus,
            4000..5000 => Self::FiscalStatus,
            5000..6000 => Self::Validation,
            6000..6100 => Self::QueueFull,
            6100..6200 => Self::PrintJobTimeout,
            6200..7000 => Self::StuckPrintJob,
            7000..8000 => Self::Configuration,
            8000..9000 => Self::Broker,
            _ => Self::Internal,
        }
    }

    /// Name as carried in job results
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "GeneralError",
            Self::Protocol => "ProtocolError",
            Self::Communication => "CommunicationError",
            Self::PrinterStatus => "PrinterStatusError",
            Self::FiscalStatus => "FiscalStatusError",
            Self::Validation => "ValidationError",
            Self::QueueFull => "QueueFull",
            Self::PrintJobTimeout => "PrintJobTimeout",
            Self::StuckPrintJob => "StuckPrintJob",
            Self::Configuration => "ConfigurationError",
            Self::Broker => "BrokerError",
            Self::Internal => "InternalError",
        }
    }

    /// `errorType` used when the failure is forwarded to the error reporter
    pub fn report_type(&self) -> &'static str {
        match self {
            Self::General => "GENERAL_ERROR",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::Communication => "COMMUNICATION_ERROR",
            Self::PrinterStatus => "PRINTER_STATUS_ERROR",
            Self::FiscalStatus => "FISCAL_STATUS_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::QueueFull => "QUEUE_FULL",
            Self::PrintJobTimeout => "PRINT_JOB_TIMEOUT",
            Self::StuckPrintJob => "STUCK_PRINT_JOB",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Broker => "BROKER_CONNECTION_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Device-reported conditions; resending reproduces them
    pub fn is_device_condition(&self) -> bool {
        matches!(self, Self::PrinterStatus | Self::FiscalStatus)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ErrorCode {
    /// Get the taxonomy kind for this error code
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(self.code())
    }
}
