//! Server Implementation
//!
//! Starts the background tasks and the local HTTP API, then waits for
//! ctrl-c.

use crate::broker::AmqpConnector;
use crate::core::{BackgroundTasks, Config, Result, ServerError, ServerState};
use std::sync::Arc;
use std::time::Duration;

/// How long shutdown waits for in-flight jobs
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Server over an existing state (tests, embedding)
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config, Arc::new(AmqpConnector::new()))?,
        };

        let mut tasks = BackgroundTasks::new();
        state.start_background_tasks(&mut tasks);
        let shutdown = tasks.shutdown_token();

        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        };

        if self.config.http_port == 0 {
            tracing::info!("HTTP API disabled");
            ctrl_c.await;
        } else {
            let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!("Fiscal print server listening on {}", addr);

            let app = crate::api::router(state.clone());
            axum::serve(listener, app)
                .with_graceful_shutdown(ctrl_c)
                .await
                .map_err(|e| ServerError::Internal(e.into()))?;
        }

        shutdown.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, tasks.shutdown()).await.is_err() {
            tracing::warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Background tasks still running at shutdown");
        }
        state.registry.close_all().await;
        tracing::info!("Server stopped");
        Ok(())
    }
}
