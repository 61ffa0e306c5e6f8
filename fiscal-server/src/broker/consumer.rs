//! Broker deliveries into the job queue

use super::{BrokerError, BrokerResult, ConsumerSession, Delivery};
use crate::context;
use crate::printing::JobQueue;
use crate::reporter::{ErrorReporter, ErrorType};
use shared::error::ErrorCode;
use shared::models::JobRequest;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// How long unsettled deliveries get once shutdown has started
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Feeds one consumer session's deliveries into the queue
///
/// Each delivery is settled on its own task once its job finishes:
/// success acks, anything else rejects without requeue.
#[derive(Debug, Clone)]
pub struct BrokerConsumer {
    queue: JobQueue,
    reporter: ErrorReporter,
}

impl BrokerConsumer {
    pub fn new(queue: JobQueue, reporter: ErrorReporter) -> Self {
        Self { queue, reporter }
    }

    /// Consume until the session ends or `stop` fires
    ///
    /// Returns once every delivery taken from the session has been
    /// settled, so the session can be closed right after. When `shutdown`
    /// fires, unsettled deliveries get [`SHUTDOWN_DRAIN`] and are then
    /// left to the broker to redeliver.
    ///
    /// Returns `Ok` only when stopped; a closed or failed session is an
    /// error for the supervisor to back off on.
    pub async fn consume(
        &self,
        session: &mut dyn ConsumerSession,
        stop: &CancellationToken,
        shutdown: &CancellationToken,
    ) -> BrokerResult<()> {
        let handlers = TaskTracker::new();
        let ended = loop {
            let next = tokio::select! {
                _ = stop.cancelled() => break Ok(()),
                next = session.next_delivery() => next,
            };
            match next {
                Some(Ok(delivery)) => {
                    let this = self.clone();
                    handlers.spawn(async move { this.handle(delivery).await });
                }
                Some(Err(e)) => break Err(e),
                None => break Err(BrokerError::Closed),
            }
        };

        handlers.close();
        if !handlers.is_empty() {
            info!(in_flight = handlers.len(), "Waiting for in-flight deliveries to settle");
        }
        let drained = handlers.wait();
        tokio::pin!(drained);
        tokio::select! {
            _ = &mut drained => {}
            _ = shutdown.cancelled() => {
                if tokio::time::timeout(SHUTDOWN_DRAIN, &mut drained).await.is_err() {
                    warn!(
                        unsettled = handlers.len(),
                        "Deliveries unsettled at shutdown, the broker will redeliver them"
                    );
                }
            }
        }
        ended
    }

    async fn handle(&self, delivery: Delivery) {
        let request = match JobRequest::from_slice(&delivery.body) {
            Ok(request) => request,
            Err(err) => {
                let error_type = if err.code == ErrorCode::InvalidFormat {
                    ErrorType::JsonDecode
                } else {
                    ErrorType::Translator
                };
                warn!(code = %err.code, error = %err.message, "Undecodable delivery rejected");
                let preview = String::from_utf8_lossy(&delivery.body[..delivery.body.len().min(256)]).into_owned();
                self.reporter
                    .report_error(error_type, &err, context!("body" => preview));
                settle(&delivery, false).await;
                return;
            }
        };

        let printer = request.printer_name.clone();
        let operation = request.operation.key();
        let pending = match self.queue.submit(request) {
            Ok(pending) => pending,
            Err(err) => {
                self.reporter.report_error(
                    ErrorType::CommandExecution,
                    &err,
                    context!("printerName" => printer, "operation" => operation),
                );
                settle(&delivery, false).await;
                return;
            }
        };

        let job_id = pending.job_id.clone();
        debug!(job_id = %job_id, printer = %printer, operation, "Delivery queued");
        let result = pending.result().await;
        if result.success {
            info!(job_id = %job_id, "Delivery processed");
        }
        settle(&delivery, result.success).await;
    }
}

async fn settle(delivery: &Delivery, success: bool) {
    let settled = if success {
        delivery.ack().await
    } else {
        delivery.reject().await
    };
    if let Err(e) = settled {
        warn!(error = %e, ack = success, "Could not settle delivery");
    }
}
