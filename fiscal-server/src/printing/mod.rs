//! Job pipeline
//!
//! ```text
//! broker / API -> JobQueue -> PrintWorker x N -> translator -> Adapter
//! ```

pub mod monitor;
pub mod queue;
pub mod registry;
pub mod translator;
pub mod worker;

pub use queue::{JobQueue, PendingJob, QueueStats, QueuedJob};
pub use registry::{PrinterInfo, PrinterRegistry, PrinterSession};
pub use worker::{PrintWorker, spawn_pool};
