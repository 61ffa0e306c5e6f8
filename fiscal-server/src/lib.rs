//! Fiscal print server
//!
//! Takes print jobs from a message broker or the local HTTP API and runs
//! them against configured fiscal printers.
//!
//! # Module structure
//!
//! ```text
//! fiscal-server/src/
//! ├── core/        # config, state, server lifecycle, errors, tasks
//! ├── printing/    # registry, translator, job queue, workers, monitor
//! ├── broker/      # AMQP consumer, supervisor, backoff
//! ├── reporter/    # error classification and publishing
//! ├── api/         # HTTP routes
//! └── utils/       # logging
//! ```

pub mod api;
pub mod broker;
pub mod core;
pub mod printing;
pub mod reporter;
pub mod utils;

pub use core::{Config, Server, ServerState};
pub use printing::{JobQueue, PrinterRegistry};
pub use reporter::{ErrorReporter, ErrorType};
pub use shared::error::{AppError, AppResult, ErrorCode};

pub use utils::logger::{init_logger, init_logger_with};

/// Load `.env` and set up logging
pub fn setup_environment() {
    if let Err(e) = dotenv::dotenv() {
        // a missing .env is normal
        if !e.not_found() {
            eprintln!("Could not load .env: {}", e);
        }
    }
    init_logger();
}
