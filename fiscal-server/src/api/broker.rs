//! Broker credentials at runtime
//!
//! A `PUT` replaces the parameters; the supervisor stops the running
//! consumer before it connects with the new ones. Passwords never leave
//! the process.

use crate::broker::BrokerState;
use crate::core::{BrokerConfig, ServerState};
use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use shared::error::{AppError, AppResult};

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/broker", get(current).put(replace).delete(disable))
}

#[derive(Debug, Serialize)]
pub struct BrokerStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<BrokerConfig>,
    state: BrokerState,
}

impl BrokerStatus {
    fn of(state: &ServerState) -> Self {
        Self {
            config: state.broker.current().map(|c| c.redacted()),
            state: state.broker.state(),
        }
    }
}

pub async fn current(State(state): State<ServerState>) -> Json<BrokerStatus> {
    Json(BrokerStatus::of(&state))
}

pub async fn replace(
    State(state): State<ServerState>,
    Json(config): Json<BrokerConfig>,
) -> AppResult<Json<BrokerStatus>> {
    if config.host.trim().is_empty() {
        return Err(AppError::validation("broker host must not be empty"));
    }
    if config.prefetch == 0 {
        return Err(AppError::validation("prefetch must be at least 1"));
    }
    let config = state.config.resolve_broker(config);
    state.broker.reconfigure(config);
    Ok(Json(BrokerStatus::of(&state)))
}

pub async fn disable(State(state): State<ServerState>) -> Json<BrokerStatus> {
    tracing::info!("Broker consumer disabled over the API");
    state.broker.disable();
    Json(BrokerStatus::of(&state))
}
