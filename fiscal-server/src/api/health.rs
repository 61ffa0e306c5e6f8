//! Health check
//!
//! ```json
//! {
//!   "status": "ok",
//!   "version": "0.1.0",
//!   "uptime_seconds": 42,
//!   "broker": "consuming",
//!   "queue": { "depth": 0, "capacity": 500, "utilization": 0.0, "running": 0 },
//!   "printers": 2
//! }
//! ```

use crate::broker::BrokerState;
use crate::core::ServerState;
use crate::printing::QueueStats;
use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// ok | degraded
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    broker: BrokerState,
    queue: QueueStats,
    printers: usize,
}

pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let broker = state.broker.state();
    // a configured broker that is not consuming means jobs only arrive locally
    let status = match broker {
        BrokerState::Disabled | BrokerState::Consuming => "ok",
        _ => "degraded",
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_secs(),
        broker,
        queue: state.queue.stats(),
        printers: state.registry.len(),
    })
}
