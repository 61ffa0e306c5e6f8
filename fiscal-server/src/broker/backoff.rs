//! Reconnect delays

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fixed delay for the first few reconnects, exponential after that
///
/// Attempt `n` (1-based) waits `base_delay` while `n <= fixed_retries`,
/// then `base_delay * factor^(n - fixed_retries)`, never more than
/// `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub fixed_retries: u32,
    pub factor: u32,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            fixed_retries: 3,
            factor: 2,
            max_delay: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt <= self.fixed_retries {
            return self.base_delay.min(self.max_delay);
        }
        let exponent = attempt - self.fixed_retries;
        let multiplier = self.factor.max(1).checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Sleep for attempt `attempt`; false when `stop` fired first
    pub async fn wait(&self, attempt: u32, stop: &CancellationToken) -> bool {
        let delay = self.delay(attempt);
        tokio::select! {
            _ = stop.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
