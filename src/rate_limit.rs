//! Outbound call budget enforcement.
//!
//! The external feed allows a fixed number of calls per minute and per
//! day plus a per-call id cap. Counters live in memory only; a process
//! restart resets the budget.

use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(86_400);

/// Why an acquisition was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Requested batch exceeds the per-call id cap. Never waited out.
    BatchTooLarge,
    /// Minute budget spent; the caller may wait for the next window.
    MinuteExhausted { retry_after_ms: u64 },
    /// Daily budget spent. Reported, not retried - waiting within a poll
    /// cycle would not help.
    DayExhausted,
}

struct RateBudget {
    requests_this_minute: u32,
    requests_today: u32,
    minute_start: Instant,
    day_start: Instant,
}

pub struct RateLimiter {
    requests_per_minute: u32,
    requests_per_day: u32,
    max_batch_size: usize,
    budget: Mutex<RateBudget>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, requests_per_day: u32, max_batch_size: usize) -> Result<Self> {
        if requests_per_minute == 0 || requests_per_day == 0 || max_batch_size == 0 {
            bail!(
                "rate limiter misconfigured: rpm={}, rpd={}, max_batch={}",
                requests_per_minute,
                requests_per_day,
                max_batch_size
            );
        }

        let now = Instant::now();
        Ok(Self {
            requests_per_minute,
            requests_per_day,
            max_batch_size,
            budget: Mutex::new(RateBudget {
                requests_this_minute: 0,
                requests_today: 0,
                minute_start: now,
                day_start: now,
            }),
        })
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Non-blocking acquisition of one call slot for a batch of
    /// `batch_len` ids. Increments the counters on success.
    pub fn try_acquire(&self, batch_len: usize) -> bool {
        self.check(batch_len).is_ok()
    }

    /// Acquire a slot, waiting for the minute window to roll over if
    /// needed, bounded by `timeout`. Daily exhaustion and oversized
    /// batches fail immediately.
    pub async fn acquire(&self, batch_len: usize, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.check(batch_len) {
                Ok(()) => return Ok(()),
                Err(Denial::BatchTooLarge) => {
                    bail!(
                        "batch of {} ids exceeds max batch size {}",
                        batch_len,
                        self.max_batch_size
                    );
                }
                Err(Denial::DayExhausted) => {
                    bail!("daily request budget ({}) exhausted", self.requests_per_day);
                }
                Err(Denial::MinuteExhausted { retry_after_ms }) => {
                    let wait = Duration::from_millis(retry_after_ms.max(50));
                    if Instant::now() + wait > deadline {
                        bail!("timed out waiting for rate limit window");
                    }
                    debug!("Rate limiting: waiting {}ms for next window", wait.as_millis());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn check(&self, batch_len: usize) -> std::result::Result<(), Denial> {
        if batch_len > self.max_batch_size {
            return Err(Denial::BatchTooLarge);
        }

        let mut budget = self.budget.lock();
        let now = Instant::now();

        // Reset windows on rollover
        if now.duration_since(budget.minute_start) >= MINUTE {
            budget.requests_this_minute = 0;
            budget.minute_start = now;
        }
        if now.duration_since(budget.day_start) >= DAY {
            budget.requests_today = 0;
            budget.day_start = now;
        }

        if budget.requests_today >= self.requests_per_day {
            warn!(
                "Daily request budget exhausted ({}/{})",
                budget.requests_today, self.requests_per_day
            );
            return Err(Denial::DayExhausted);
        }

        if budget.requests_this_minute >= self.requests_per_minute {
            let reset_at = budget.minute_start + MINUTE;
            let retry_after_ms = reset_at.saturating_duration_since(now).as_millis() as u64;
            return Err(Denial::MinuteExhausted { retry_after_ms });
        }

        budget.requests_this_minute += 1;
        budget.requests_today += 1;
        Ok(())
    }

    /// (requests this minute, requests today) - for status reporting.
    pub fn usage(&self) -> (u32, u32) {
        let budget = self.budget.lock();
        (budget.requests_this_minute, budget.requests_today)
    }
}
