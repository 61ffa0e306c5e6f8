//! Queue depth monitor

use super::queue::{JobQueue, QueueStats};
use crate::context;
use crate::core::QueueConfig;
use crate::reporter::{ErrorReporter, ErrorType};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UsageLevel {
    Warning,
    Error,
    Critical,
}

impl UsageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageLevel::Warning => "warning",
            UsageLevel::Error => "error",
            UsageLevel::Critical => "critical",
        }
    }
}

/// Highest threshold `utilization` (percent) reaches
pub fn usage_level(utilization: f64, config: &QueueConfig) -> Option<UsageLevel> {
    if utilization >= config.critical_pct {
        Some(UsageLevel::Critical)
    } else if utilization >= config.error_pct {
        Some(UsageLevel::Error)
    } else if utilization >= config.warn_pct {
        Some(UsageLevel::Warning)
    } else {
        None
    }
}

/// Sample the queue every `report_interval`; error and critical levels are
/// reported, the warning level only logged
pub async fn run(queue: JobQueue, reporter: ErrorReporter, config: QueueConfig, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(config.report_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => check(&queue.stats(), &reporter, &config),
        }
    }
}

fn check(stats: &QueueStats, reporter: &ErrorReporter, config: &QueueConfig) {
    let Some(level) = usage_level(stats.utilization, config) else {
        tracing::trace!(depth = stats.depth, "Queue usage normal");
        return;
    };

    tracing::warn!(
        depth = stats.depth,
        capacity = stats.capacity,
        utilization = stats.utilization,
        level = level.as_str(),
        "Print queue usage high"
    );
    if level >= UsageLevel::Error {
        reporter.report(
            ErrorType::PrintQueueUsage,
            format!("print queue at {:.0}% ({}/{})", stats.utilization, stats.depth, stats.capacity),
            context!(
                "depth" => stats.depth,
                "capacity" => stats.capacity,
                "utilization" => stats.utilization,
                "level" => level.as_str(),
                "running" => stats.running,
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::models::{JobRequest, OperationKind};
    use std::time::Duration;

    #[test]
    fn test_levels() {
        let config = QueueConfig::default();
        assert_eq!(usage_level(5.0, &config), None);
        assert_eq!(usage_level(10.0, &config), Some(UsageLevel::Warning));
        assert_eq!(usage_level(25.0, &config), Some(UsageLevel::Error));
        assert_eq!(usage_level(100.0, &config), Some(UsageLevel::Critical));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_only_above_error_level() {
        let queue = JobQueue::new(10);
        let (reporter, mut rx) = ErrorReporter::channel(8, "dev", "acme");
        let config = QueueConfig {
            report_interval: Duration::from_secs(30),
            ..Default::default()
        };
        let shutdown = CancellationToken::new();
        tokio::spawn(run(queue.clone(), reporter, config, shutdown.clone()));

        // 10%: warning, logged only
        queue
            .submit(JobRequest::new("P1", OperationKind::GetStatus, json!({})))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(rx.try_recv().is_err());

        for _ in 0..4 {
            queue
                .submit(JobRequest::new("P1", OperationKind::GetStatus, json!({})))
                .unwrap();
        }
        let report = rx.recv().await.unwrap();
        assert_eq!(report.error_type, "PRINT_QUEUE_USAGE");
        assert_eq!(report.context["depth"], 5);
        assert_eq!(report.context["level"], "critical");
        shutdown.cancel();
    }
}
