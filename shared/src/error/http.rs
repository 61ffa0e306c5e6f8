//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use super::kind::ErrorKind;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            Self::NotFound | Self::PrinterNotFound => StatusCode::NOT_FOUND,

            _ => match self.kind() {
                ErrorKind::General | ErrorKind::Validation => StatusCode::BAD_REQUEST,

                // Device link misbehaved; the gateway is the printer
                ErrorKind::Protocol | ErrorKind::Communication => StatusCode::BAD_GATEWAY,

                ErrorKind::PrinterStatus | ErrorKind::FiscalStatus => StatusCode::CONFLICT,

                // 503 Service Unavailable (transient, client can retry)
                ErrorKind::QueueFull | ErrorKind::Broker => StatusCode::SERVICE_UNAVAILABLE,

                ErrorKind::PrintJobTimeout | ErrorKind::StuckPrintJob => {
                    StatusCode::GATEWAY_TIMEOUT
                }

                ErrorKind::Configuration | ErrorKind::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}
