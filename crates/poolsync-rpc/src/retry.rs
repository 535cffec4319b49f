//! Fixed-interval retry policy.

use std::time::Duration;

/// Stateless policy: a bounded number of attempts with a constant pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never below 1.
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Exactly one attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before the next attempt after `failures` failed attempts
    /// (1-based). `None` once the attempts are used up.
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        if failures >= self.max_attempts {
            None
        } else {
            Some(self.interval)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500))
    }
}
