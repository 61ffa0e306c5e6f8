//! Bounded job queue
//!
//! Producers never wait: a full queue is a `QueueFull` error the moment
//! it happens. Workers share one receiver.

use serde::Serialize;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{JobRequest, JobResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc, oneshot};

/// A job waiting for a worker
#[derive(Debug)]
pub struct QueuedJob {
    pub job_id: String,
    pub request: JobRequest,
    pub enqueued_at: Instant,
    reply: oneshot::Sender<JobResult>,
}

impl QueuedJob {
    /// Deliver the result; consumes the job so it happens once
    pub fn complete(self, result: JobResult) {
        if self.reply.send(result).is_err() {
            tracing::debug!(job_id = %self.job_id, "Job caller went away before the result");
        }
    }
}

/// Caller side of a submitted job
#[derive(Debug)]
pub struct PendingJob {
    pub job_id: String,
    rx: oneshot::Receiver<JobResult>,
}

impl PendingJob {
    /// Wait for the worker, however long it takes
    pub async fn result(self) -> JobResult {
        let job_id = self.job_id;
        match self.rx.await {
            Ok(result) => result,
            Err(_) => JobResult::failed(
                job_id,
                &AppError::with_message(ErrorCode::WorkerUnavailable, "job dropped without a result"),
                0.0,
            ),
        }
    }

    /// Wait at most `limit`; the job keeps running when the caller gives up
    pub async fn wait(self, limit: Duration) -> JobResult {
        let job_id = self.job_id.clone();
        match tokio::time::timeout(limit, self.result()).await {
            Ok(result) => result,
            Err(_) => JobResult::failed(
                job_id.clone(),
                &AppError::job_timeout(job_id, limit.as_secs()),
                limit.as_secs_f64(),
            ),
        }
    }
}

pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<QueuedJob>>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
    /// Percent of capacity in use
    pub utilization: f64,
    pub running: usize,
}

#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueuedJob>,
    rx: SharedReceiver,
    running: Arc<AtomicUsize>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueue without waiting
    pub fn submit(&self, mut request: JobRequest) -> AppResult<PendingJob> {
        let job_id = request
            .job_id
            .take()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (reply, rx) = oneshot::channel();
        let job = QueuedJob {
            job_id: job_id.clone(),
            request,
            enqueued_at: Instant::now(),
            reply,
        };

        match self.tx.try_send(job) {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, depth = self.depth(), "Job queued");
                Ok(PendingJob { job_id, rx })
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(job_id = %job.job_id, capacity = self.capacity(), "Job queue full");
                Err(AppError::queue_full(self.capacity()).with_detail("job_id", job.job_id))
            }
            Err(mpsc::error::TrySendError::Closed(job)) => Err(AppError::new(ErrorCode::QueueClosed)
                .with_detail("job_id", job.job_id)),
        }
    }

    /// Receiver shared by the worker pool
    pub fn receiver(&self) -> SharedReceiver {
        self.rx.clone()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Jobs waiting, not counting the ones being processed
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    pub(crate) fn running_guard(&self) -> RunningGuard {
        self.running.fetch_add(1, Ordering::Relaxed);
        RunningGuard(self.running.clone())
    }

    pub fn stats(&self) -> QueueStats {
        let depth = self.depth();
        let capacity = self.capacity();
        QueueStats {
            depth,
            capacity,
            utilization: depth as f64 * 100.0 / capacity as f64,
            running: self.running(),
        }
    }
}

/// Counts a job as running until dropped
pub(crate) struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::error::ErrorKind;
    use shared::models::{JobState, OperationKind};

    fn request() -> JobRequest {
        JobRequest::new("P1", OperationKind::GetStatus, json!({}))
    }

    #[tokio::test]
    async fn test_full_queue_fails_fast() {
        let queue = JobQueue::new(2);
        queue.submit(request()).unwrap();
        queue.submit(request()).unwrap();
        assert_eq!(queue.depth(), 2);

        let started = Instant::now();
        let err = queue.submit(request()).unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(10));
        assert_eq!(err.kind(), ErrorKind::QueueFull);
        assert_eq!(queue.depth(), 2);
        assert_eq!(queue.stats().utilization, 100.0);
    }

    #[tokio::test]
    async fn test_job_id_kept_or_generated() {
        let queue = JobQueue::new(4);
        let mut req = request();
        req.job_id = Some("abc".into());
        assert_eq!(queue.submit(req).unwrap().job_id, "abc");
        assert_eq!(queue.submit(request()).unwrap().job_id.len(), 36);
    }

    #[tokio::test]
    async fn test_result_delivered_once() {
        let queue = JobQueue::new(4);
        let pending = queue.submit(request()).unwrap();
        let job = queue.receiver().lock().await.recv().await.unwrap();
        assert_eq!(queue.depth(), 0);
        job.complete(JobResult::completed(pending.job_id.clone(), json!({}), 0.1));
        assert!(pending.result().await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let queue = JobQueue::new(4);
        let pending = queue.submit(request()).unwrap();
        let result = pending.wait(Duration::from_secs(15)).await;
        assert_eq!(result.state(), JobState::TimedOut);
    }

    #[tokio::test]
    async fn test_dropped_job_reports_failure() {
        let queue = JobQueue::new(4);
        let pending = queue.submit(request()).unwrap();
        drop(queue.receiver().lock().await.recv().await);
        let result = pending.result().await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, ErrorCode::WorkerUnavailable);
    }
}
