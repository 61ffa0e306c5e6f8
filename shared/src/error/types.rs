//! Error types and API response structures

use super::codes::ErrorCode;
use super::kind::ErrorKind;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Application error with structured error code and details
///
/// The error value that crosses crate boundaries: job results, HTTP
/// responses and error reports are all built from it.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (printer, job, command, cause)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Taxonomy kind for this error
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Look up a detail entry
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.as_ref().and_then(|d| d.get(key))
    }

    // ==================== Convenience constructors ====================

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{} not found", r))
            .with_detail("resource", r)
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidRequest, msg)
    }

    /// Create an invalid format error (undecodable payload)
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidFormat, msg)
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ConfigError, msg)
    }

    /// Create a printer not found error
    pub fn printer_not_found(name: impl Into<String>) -> Self {
        let n = name.into();
        Self::with_message(ErrorCode::PrinterNotFound, format!("printer '{}' not configured", n))
            .with_detail("printer", n)
    }

    /// Create a translation error
    pub fn translation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::TranslationFailed, msg)
    }

    /// Create a queue full error
    pub fn queue_full(capacity: usize) -> Self {
        Self::new(ErrorCode::QueueFull).with_detail("capacity", capacity)
    }

    /// Create a print job timeout error
    pub fn job_timeout(job_id: impl Into<String>, waited_secs: u64) -> Self {
        Self::with_message(
            ErrorCode::PrintJobTimeout,
            format!("no result after {}s", waited_secs),
        )
        .with_detail("job_id", job_id.into())
    }

    /// Create a broker error
    pub fn broker(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::BrokerConnectionFailed, msg)
    }
}

/// Unified API response structure
///
/// Provides a consistent response format for all API endpoints:
/// - `code`: Error code (0 for success)
/// - `message`: Human-readable message
/// - `data`: Response payload (on success)
/// - `details`: Additional error details (on failure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Error code (0 for success, non-zero for errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Human-readable message
    pub message: String,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Additional error details (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data
    pub fn success(data: T) -> Self {
        Self {
            code: Some(0),
            message: "OK".to_string(),
            data: Some(data),
            details: None,
        }
    }
}

impl ApiResponse<()> {
    /// Create a success response without data
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            message: "OK".to_string(),
            data: None,
            details: None,
        }
    }

    /// Create an error response from an AppError
    pub fn error(err: &AppError) -> Self {
        Self {
            code: Some(err.code.code()),
            message: err.message.clone(),
            data: None,
            details: err.details.clone(),
        }
    }
}

impl<T> From<AppError> for ApiResponse<T> {
    fn from(err: AppError) -> Self {
        Self {
            code: Some(err.code.code()),
            message: err.message,
            data: None,
            details: err.details,
        }
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

// ===== Axum Integration =====

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;

        let status = self.http_status();
        let body = ApiResponse::<()>::error(&self);

        if matches!(self.kind(), ErrorKind::Internal | ErrorKind::Configuration) {
            tracing::error!(
                code = %self.code,
                message = %self.message,
                "System error occurred"
            );
        }

        (status, Json(body)).into_response()
    }
}

impl<T: Serialize> axum::response::IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;

        let status = match self.code {
            None | Some(0) => StatusCode::OK,
            Some(code) => ErrorCode::try_from(code)
                .map(|c| c.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        };

        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_new() {
        let err = AppError::new(ErrorCode::BadChecksum);
        assert_eq!(err.code, ErrorCode::BadChecksum);
        assert_eq!(err.message, "bad checksum");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_app_error_with_detail() {
        let err = AppError::validation("CUIT required")
            .with_detail("printer", "P1")
            .with_detail("field", "nro_doc");

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.detail("printer").unwrap(), "P1");
        assert_eq!(err.detail("field").unwrap(), "nro_doc");
        assert!(err.detail("missing").is_none());
    }

    #[test]
    fn test_app_error_convenience_constructors() {
        let err = AppError::printer_not_found("P9");
        assert_eq!(err.code, ErrorCode::PrinterNotFound);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);

        let err = AppError::queue_full(500);
        assert_eq!(err.kind(), ErrorKind::QueueFull);
        assert_eq!(err.detail("capacity").unwrap(), 500);

        let err = AppError::job_timeout("j-1", 15);
        assert_eq!(err.kind(), ErrorKind::PrintJobTimeout);
        assert_eq!(err.message, "no result after 15s");
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::with_message(ErrorCode::Timeout, "timeout");
        assert_eq!(format!("{}", err), "timeout");
    }

    #[test]
    fn test_app_error_serde() {
        let err = AppError::with_message(ErrorCode::OutOfPaper, "Printer out of paper");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 3005);
        assert!(json.get("details").is_none());

        let back: AppError = serde_json::from_value(json).unwrap();
        assert_eq!(back.code, ErrorCode::OutOfPaper);
    }

    #[test]
    fn test_api_response_error() {
        let err = AppError::printer_not_found("P1");
        let response = ApiResponse::<()>::error(&err);

        assert_eq!(response.code, Some(7002));
        assert!(response.data.is_none());
        assert!(response.details.is_some());
    }

    #[test]
    fn test_api_response_serialize() {
        let response = ApiResponse::success("hello");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"code\":0"));
        assert!(json.contains("\"message\":\"OK\""));
        assert!(json.contains("\"data\":\"hello\""));
    }
}
