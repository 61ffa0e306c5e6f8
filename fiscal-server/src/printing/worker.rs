//! Print workers
//!
//! A fixed pool pulls jobs off the shared queue. Jobs for different
//! printers run in parallel; jobs for the same printer wait on that
//! printer's session lock, so commands never interleave on a link.

use super::queue::{JobQueue, QueuedJob};
use super::registry::PrinterRegistry;
use super::translator;
use crate::context;
use crate::core::{BackgroundTasks, QueueConfig, TaskKind};
use crate::reporter::{ErrorReporter, ErrorType};
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{JobRequest, JobResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct PrintWorker {
    id: usize,
    registry: Arc<PrinterRegistry>,
    reporter: ErrorReporter,
    slow_after: Duration,
    stuck_after: Duration,
}

impl PrintWorker {
    pub fn new(
        id: usize,
        registry: Arc<PrinterRegistry>,
        reporter: ErrorReporter,
        config: &QueueConfig,
    ) -> Self {
        Self {
            id,
            registry,
            reporter,
            slow_after: config.slow_job,
            stuck_after: config.stuck_job,
        }
    }

    /// Process jobs until shutdown; a job already running is finished first
    pub async fn run(self, queue: JobQueue, shutdown: CancellationToken) {
        tracing::info!(worker = self.id, "Print worker started");
        let rx = queue.receiver();

        loop {
            let job = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(worker = self.id, "Print worker received shutdown signal");
                    break;
                }
                job = async { rx.lock().await.recv().await } => job,
            };
            let Some(job) = job else {
                tracing::info!(worker = self.id, "Job queue closed, print worker stopping");
                break;
            };

            let _running = queue.running_guard();
            let result = self.process(&job).await;
            job.complete(result);
        }
    }

    async fn process(&self, job: &QueuedJob) -> JobResult {
        let request = &job.request;
        tracing::debug!(
            worker = self.id,
            job_id = %job.job_id,
            printer = %request.printer_name,
            operation = request.operation.key(),
            queued_ms = job.enqueued_at.elapsed().as_millis() as u64,
            "Job started"
        );

        let started = Instant::now();
        let outcome = self.execute(&job.job_id, request).await;
        let elapsed = started.elapsed();

        if elapsed > self.slow_after {
            tracing::warn!(
                job_id = %job.job_id,
                printer = %request.printer_name,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow print job"
            );
        }

        match outcome {
            Ok(value) => {
                tracing::info!(job_id = %job.job_id, printer = %request.printer_name, elapsed_ms = elapsed.as_millis() as u64, "Job completed");
                JobResult::completed(job.job_id.clone(), value, elapsed.as_secs_f64())
            }
            Err(err) => {
                tracing::error!(
                    job_id = %job.job_id,
                    printer = %request.printer_name,
                    code = %err.code,
                    error = %err.message,
                    "Job failed"
                );
                let error_type = if err.code == ErrorCode::TranslationFailed {
                    ErrorType::Translator
                } else {
                    ErrorType::CommandExecution
                };
                self.reporter.report_error(
                    error_type,
                    &err,
                    context!(
                        "jobId" => job.job_id.as_str(),
                        "printerName" => request.printer_name.as_str(),
                        "operation" => request.operation.key(),
                    ),
                );
                JobResult::failed(job.job_id.clone(), &err, elapsed.as_secs_f64())
            }
        }
    }

    /// Run the job under the printer's lock; past the stuck threshold it is
    /// reported once and left running
    async fn execute(&self, job_id: &str, request: &JobRequest) -> AppResult<serde_json::Value> {
        let config = self.registry.config(&request.printer_name)?;
        let session = self.registry.session(&request.printer_name)?;

        let work = async {
            let mut adapter = session.lock().await;
            translator::execute(&mut *adapter, &config, request)
                .await
                .map_err(|e: AppError| e.with_detail("printer", request.printer_name.as_str()))
        };
        tokio::pin!(work);

        let stuck = tokio::time::sleep(self.stuck_after);
        tokio::pin!(stuck);
        let mut reported = false;

        loop {
            tokio::select! {
                result = &mut work => return result,
                _ = &mut stuck, if !reported => {
                    reported = true;
                    tracing::warn!(job_id, printer = %request.printer_name, "Print job stuck");
                    self.reporter.report(
                        ErrorType::StuckPrintJob,
                        format!("job {} has been running for more than {}s", job_id, self.stuck_after.as_secs()),
                        context!(
                            "jobId" => job_id,
                            "printerName" => request.printer_name.as_str(),
                            "operation" => request.operation.key(),
                            "thresholdSecs" => self.stuck_after.as_secs(),
                        ),
                    );
                }
            }
        }
    }
}

/// Spawn `config.workers` workers on `tasks`
pub fn spawn_pool(
    tasks: &mut BackgroundTasks,
    queue: &JobQueue,
    registry: &Arc<PrinterRegistry>,
    reporter: &ErrorReporter,
    config: &QueueConfig,
) {
    let count = config.workers.max(1);
    for id in 0..count {
        let worker = PrintWorker::new(id, registry.clone(), reporter.clone(), config);
        let shutdown = tasks.shutdown_token();
        tasks.spawn(
            format!("print_worker_{}", id),
            TaskKind::Worker,
            worker.run(queue.clone(), shutdown),
        );
    }
    tracing::info!(workers = count, capacity = queue.capacity(), "Worker pool started");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::models::{Brand, DriverConfig, OperationKind, PrinterConfig};

    type Reports = tokio::sync::mpsc::Receiver<crate::reporter::ErrorReport>;

    fn setup(stuck_secs: u64) -> (JobQueue, Arc<PrinterRegistry>, Reports, BackgroundTasks) {
        let registry = Arc::new(PrinterRegistry::new(vec![PrinterConfig::new(
            "P1",
            Brand::Epson,
            DriverConfig::Dummy,
        )]));
        let queue = JobQueue::new(8);
        let (reporter, rx) = ErrorReporter::channel(8, "dev", "acme");
        let config = QueueConfig {
            workers: 2,
            stuck_job: Duration::from_secs(stuck_secs),
            ..Default::default()
        };
        let mut tasks = BackgroundTasks::new();
        spawn_pool(&mut tasks, &queue, &registry, &reporter, &config);
        (queue, registry, rx, tasks)
    }

    #[tokio::test]
    async fn test_unknown_printer_fails_and_reports() {
        let (queue, _, mut reports, tasks) = setup(30);
        let pending = queue
            .submit(JobRequest::new("ghost", OperationKind::GetStatus, json!({})))
            .unwrap();
        let result = pending.result().await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, ErrorCode::PrinterNotFound);

        let report = reports.recv().await.unwrap();
        assert_eq!(report.error_type, "COMMAND_EXECUTION_ERROR");
        assert_eq!(report.context["printerName"], "ghost");
        tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_translation_failure_reported_as_translator() {
        let (queue, _, mut reports, tasks) = setup(30);
        let pending = queue
            .submit(JobRequest::new("P1", OperationKind::DailyClose, json!("W")))
            .unwrap();
        assert!(!pending.result().await.success);
        assert_eq!(reports.recv().await.unwrap().error_type, "TRANSLATOR_ERROR");
        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_job_reported_not_cancelled() {
        let (queue, registry, mut reports, tasks) = setup(30);
        let session = registry.session("P1").unwrap();
        let held = session.lock().await;

        let pending = queue
            .submit(JobRequest::new("P1", OperationKind::OpenDrawer, json!({})))
            .unwrap();
        let report = reports.recv().await.unwrap();
        assert_eq!(report.error_type, "STUCK_PRINT_JOB");
        assert_eq!(queue.running(), 1);

        drop(held);
        let result = pending.result().await;
        assert!(result.success);
        assert!(result.processing_time >= 30.0);
        tasks.shutdown().await;
    }
}
