//! Broker consumer
//!
//! ```text
//! Disconnected -> Connecting -> Bound -> Consuming -> Disconnected (on error)
//! ```
//!
//! A [`BrokerConnector`] opens a [`ConsumerSession`] (topology declared and
//! bound), the [`BrokerConsumer`] feeds its deliveries into the job queue,
//! and the [`BrokerSupervisor`] reconnects with backoff and swaps
//! credentials at runtime.

pub mod amqp;
pub mod backoff;
pub mod consumer;
pub mod supervisor;

use crate::core::BrokerConfig;
use async_trait::async_trait;
use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;
use tokio::sync::watch;

pub use amqp::AmqpConnector;
pub use backoff::BackoffPolicy;
pub use consumer::BrokerConsumer;
pub use supervisor::BrokerSupervisor;

#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("broker channel error: {0}")]
    Channel(String),

    #[error("delivery could not be settled: {0}")]
    Delivery(String),

    #[error("broker connection closed")]
    Closed,
}

impl BrokerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BrokerError::Connection(_) | BrokerError::Closed => ErrorCode::BrokerConnectionFailed,
            BrokerError::Channel(_) => ErrorCode::BrokerChannelError,
            BrokerError::Delivery(_) => ErrorCode::BrokerDeliveryFailed,
        }
    }
}

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        match &err {
            lapin::Error::ProtocolError(_) | lapin::Error::InvalidChannelState(_) => {
                BrokerError::Channel(err.to_string())
            }
            _ => BrokerError::Connection(err.to_string()),
        }
    }
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Connection(_) | BrokerError::Closed => AppError::broker(err.to_string()),
            other => AppError::with_message(other.code(), other.to_string()),
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerState {
    /// No broker configured
    Disabled,
    Disconnected,
    Connecting,
    /// Topology declared, consumer not yet registered
    Bound,
    Consuming,
    /// Waiting before the next reconnect
    Backoff,
    Stopped,
}

/// Settles one delivery with the broker
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> BrokerResult<()>;

    /// Reject without requeue
    async fn reject(&self) -> BrokerResult<()>;
}

pub struct Delivery {
    pub body: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Self { body, acker }
    }

    pub async fn ack(&self) -> BrokerResult<()> {
        self.acker.ack().await
    }

    pub async fn reject(&self) -> BrokerResult<()> {
        self.acker.reject().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery").field("len", &self.body.len()).finish()
    }
}

/// An open, bound consumer
#[async_trait]
pub trait ConsumerSession: Send {
    /// Next delivery; `None` once the broker closed the consumer
    async fn next_delivery(&mut self) -> Option<BrokerResult<Delivery>>;

    async fn close(&mut self);
}

/// Opens consumer sessions; the seam tests replace
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    /// Connect, declare exchange and queue, bind, and start consuming
    async fn connect(&self, config: &BrokerConfig) -> BrokerResult<Box<dyn ConsumerSession>>;
}

/// Runtime control over the supervisor, held by the API
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    config: watch::Sender<Option<BrokerConfig>>,
    state: watch::Receiver<BrokerState>,
}

impl BrokerHandle {
    pub fn new(
        config: watch::Sender<Option<BrokerConfig>>,
        state: watch::Receiver<BrokerState>,
    ) -> Self {
        Self { config, state }
    }

    /// Replace the broker parameters; the supervisor stops the running
    /// consumer before connecting with the new ones
    pub fn reconfigure(&self, config: BrokerConfig) {
        tracing::info!(host = %config.host, queue = %config.queue, "Broker configuration replaced");
        self.config.send_replace(Some(config));
    }

    pub fn disable(&self) {
        self.config.send_replace(None);
    }

    pub fn current(&self) -> Option<BrokerConfig> {
        self.config.borrow().clone()
    }

    pub fn state(&self) -> BrokerState {
        *self.state.borrow()
    }

    /// Receiver for components sharing the consumer's credentials
    pub fn subscribe(&self) -> watch::Receiver<Option<BrokerConfig>> {
        self.config.subscribe()
    }
}
