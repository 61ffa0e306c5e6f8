//! Server state
//!
//! Shared by the HTTP handlers and the background tasks. Cloning is cheap:
//! every field is a handle.

use crate::broker::{BrokerConnector, BrokerConsumer, BrokerHandle, BrokerSupervisor};
use crate::core::{BackgroundTasks, Config, Result, TaskKind};
use crate::printing::{JobQueue, PrinterRegistry, monitor, spawn_pool};
use crate::reporter::{self, AmqpReportSink, ErrorReport, ErrorReporter, LogSink, ReportSink};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub registry: Arc<PrinterRegistry>,
    pub queue: JobQueue,
    pub reporter: ErrorReporter,
    pub broker: BrokerHandle,
    pub started_at: Instant,
    pending: Arc<Mutex<Option<Pending>>>,
}

/// Parts created with the state and consumed when the tasks start
struct Pending {
    supervisor: BrokerSupervisor,
    reports: mpsc::Receiver<ErrorReport>,
}

impl ServerState {
    /// Build the state; `connector` opens broker sessions
    pub fn initialize(config: &Config, connector: Arc<dyn BrokerConnector>) -> Result<Self> {
        let registry = Arc::new(PrinterRegistry::load(&config.printers_file)?);
        Ok(Self::with_registry(config, registry, connector))
    }

    pub fn with_registry(
        config: &Config,
        registry: Arc<PrinterRegistry>,
        connector: Arc<dyn BrokerConnector>,
    ) -> Self {
        let queue = JobQueue::new(config.queue.capacity);
        let (reporter, reports) = ErrorReporter::channel(
            reporter::REPORT_BUFFER,
            config.device_id.clone(),
            config.tenant.clone(),
        );
        let broker = config.broker.clone().map(|b| config.resolve_broker(b));
        let (supervisor, handle) = BrokerSupervisor::new(
            connector,
            BrokerConsumer::new(queue.clone(), reporter.clone()),
            config.backoff,
            reporter.clone(),
            broker,
        );

        tracing::info!(
            printers = registry.len(),
            capacity = config.queue.capacity,
            workers = config.queue.workers,
            broker = handle.current().is_some(),
            "Server state initialized"
        );

        Self {
            config: Arc::new(config.clone()),
            registry,
            queue,
            reporter,
            broker: handle,
            started_at: Instant::now(),
            pending: Arc::new(Mutex::new(Some(Pending { supervisor, reports }))),
        }
    }

    /// Start workers, queue monitor, broker supervisor and error publisher
    ///
    /// Only the first call spawns anything.
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        let Some(pending) = self.pending.lock().take() else {
            tracing::warn!("Background tasks already started");
            return;
        };

        spawn_pool(tasks, &self.queue, &self.registry, &self.reporter, &self.config.queue);

        tasks.spawn(
            "queue_monitor",
            TaskKind::Periodic,
            monitor::run(
                self.queue.clone(),
                self.reporter.clone(),
                self.config.queue.clone(),
                tasks.shutdown_token(),
            ),
        );

        tasks.spawn(
            "broker_supervisor",
            TaskKind::Listener,
            pending.supervisor.run(tasks.shutdown_token()),
        );

        let sink: Box<dyn ReportSink> = if self.config.tenant.is_empty() {
            tracing::info!("No tenant configured, error reports go to the log only");
            Box::new(LogSink)
        } else {
            Box::new(AmqpReportSink::new(
                self.broker.subscribe(),
                self.config.error_exchange.clone(),
                self.config.tenant.clone(),
            ))
        };
        tasks.spawn(
            "error_publisher",
            TaskKind::Listener,
            reporter::run_publisher(pending.reports, sink, tasks.shutdown_token()),
        );

        tasks.log_summary();
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
