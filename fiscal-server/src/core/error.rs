use axum::response::{IntoResponse, Response};
use fiscal_printer::PrintError;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use crate::broker::BrokerError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error(transparent)]
    Printer(#[from] PrintError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ServerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ServerError::App(e) => e.code,
            ServerError::Printer(e) => e.code(),
            ServerError::Broker(e) => e.code(),
            ServerError::Config(_) => ErrorCode::ConfigError,
            ServerError::Io(_) | ServerError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<ServerError> for AppError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::App(e) => e,
            ServerError::Printer(e) => e.into(),
            ServerError::Broker(e) => e.into(),
            ServerError::Config(msg) => AppError::config(msg),
            ServerError::Internal(e) => {
                tracing::error!(error = ?e, "Internal server error");
                AppError::internal("An internal error occurred")
            }
            other => AppError::with_message(other.code(), other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
