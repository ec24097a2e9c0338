//! Retry configuration for queue consumers.

use crate::utils::backoff::backoff_delay;
use std::time::Duration;

/// How a stage retries a message whose downstream call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per message, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Whether permanently failed messages go to `<queue>.dead`.
    /// When false they are rejected and dropped.
    pub dead_letter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            dead_letter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        backoff_delay(self.base_delay, self.max_delay, attempt.saturating_sub(1))
    }
}
