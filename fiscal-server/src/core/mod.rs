//! Core: configuration, state, errors, task registry
//!
//! - [`Config`] - environment driven configuration
//! - [`ServerState`] - shared handles
//! - [`Server`] - process lifecycle
//! - [`ServerError`] - server errors
//! - [`BackgroundTasks`] - spawned task registry

pub mod config;
pub mod error;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::{BrokerConfig, Config, QueueConfig};
pub use error::{Result, ServerError};
pub use server::Server;
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
