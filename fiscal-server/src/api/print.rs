//! Job submission
//!
//! `POST /api/print` takes the same payload the broker delivers and waits
//! up to `JOB_WAIT_SECS` for the result. A caller that gives up does not
//! cancel the job.

use crate::core::ServerState;
use axum::{Json, Router, extract::State, routing::post};
use http::StatusCode;
use serde_json::Value;
use shared::error::AppResult;
use shared::models::{JobRequest, JobResult};

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/print", post(submit))
}

pub async fn submit(
    State(state): State<ServerState>,
    Json(payload): Json<Value>,
) -> AppResult<(StatusCode, Json<JobResult>)> {
    let request = JobRequest::from_value(payload)?;
    tracing::debug!(printer = %request.printer_name, operation = request.operation.key(), "Local job received");

    let pending = state.queue.submit(request)?;
    let result = pending.wait(state.config.job_wait).await;

    let status = match &result.error {
        None => StatusCode::OK,
        Some(err) => err.code.http_status(),
    };
    Ok((status, Json(result)))
}
