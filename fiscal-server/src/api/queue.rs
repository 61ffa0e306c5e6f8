use crate::core::ServerState;
use crate::printing::QueueStats;
use axum::{Json, Router, extract::State, routing::get};

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/queue", get(stats))
}

pub async fn stats(State(state): State<ServerState>) -> Json<QueueStats> {
    Json(state.queue.stats())
}
