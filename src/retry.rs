//! Shared retry policy for transient failures.
//!
//! Both the feed client and the tracking store back off through this one
//! policy instead of carrying their own ad hoc loops. Only transient
//! errors (store busy, network timeout) should be routed through it;
//! validation errors and rate-budget exhaustion are never retried.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Exponential backoff with jitter for the given attempt (0-based).
    ///
    /// The raw delay doubles per attempt, capped at `max_delay`, then gets
    /// scaled by a random factor in [0.5, 1.5) so concurrent retriers
    /// don't stampede in lockstep.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let raw = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);

        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(raw.as_secs_f64() * jitter)
    }

    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_attempts
    }
}
