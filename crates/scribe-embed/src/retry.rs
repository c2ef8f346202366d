//! Linear backoff policy for transient provider failures.

use std::time::Duration;

/// Retry budget and backoff schedule.
///
/// The n-th retry waits `retry_delay * n`, capped at `max_delay`. A
/// `Retry-After` hint from a 429 response replaces the computed delay but is
/// capped the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let computed = hint.unwrap_or_else(|| self.retry_delay.saturating_mul(attempt.max(1)));
        computed.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    #[must_use]
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }
}
