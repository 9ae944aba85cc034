//! Exponential backoff shared by reconnection and the completion gateway.

use std::time::Duration;

/// Backoff schedule: `initial * multiplier^attempt`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let clamped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(clamped as u64)
    }

    /// HTTP statuses worth another attempt.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }
}
