//! Configured printers

use crate::core::ServerState;
use crate::printing::PrinterInfo;
use axum::{Json, Router, extract::State, routing::get};

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/printers", get(list))
}

/// Every configured printer, sorted by name
pub async fn list(State(state): State<ServerState>) -> Json<Vec<PrinterInfo>> {
    Json(state.registry.list())
}
