//! Local HTTP API
//!
//! # Routes
//!
//! | Path | Method | Handler |
//! |------|--------|---------|
//! | /api/health | GET | [`health`] |
//! | /api/print | POST | [`print`] |
//! | /api/queue | GET | [`queue`] |
//! | /api/printers | GET | [`printers`] |
//! | /api/broker | GET, PUT, DELETE | [`broker`] |

pub mod broker;
pub mod health;
pub mod print;
pub mod printers;
pub mod queue;

use crate::core::ServerState;
use axum::{Router, middleware};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// HTTP request log
async fn log_request(
    request: http::Request<axum::body::Body>,
    next: middleware::Next,
) -> http::Response<axum::body::Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!(target: "http_access", "{} {} {}", method, uri, response.status());
    response
}

/// Routes without state
pub fn build_app() -> Router<ServerState> {
    Router::<ServerState>::new()
        .merge(health::router())
        .merge(print::router())
        .merge(queue::router())
        .merge(printers::router())
        .merge(broker::router())
}

/// The complete API bound to `state`
pub fn router(state: ServerState) -> Router {
    build_app()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_request))
}
