use std::time::Duration;

/// Retry and time-limit policy applied to every task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first run.
    pub max_retries: u32,
    /// Countdown before the first retry, doubled on each further retry.
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    /// Hard limit on one run; exceeding it counts as a failure.
    pub time_limit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 60,
            max_delay_secs: 600,
            time_limit: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Seconds to wait before re-running a task whose run number `attempt`
    /// (0-based) just failed: `base * 2^attempt`, capped.
    pub fn countdown(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs)
    }

    /// Whether a task that failed on run `attempt` gets another run.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}
