//! Request pacing and backoff
//!
//! Every request waits for the current delay measured from the previous
//! request. Transient failures double the delay up to a cap; a run of
//! successes brings it back to the baseline.

use crate::config::RateLimitConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Backoff never starts from less than this, even with a zero baseline
const MIN_BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Largest exponent applied to the backoff base
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Paces outbound requests for one crawl
#[derive(Debug)]
pub struct RateLimiter {
    baseline: Duration,
    max_delay: Duration,
    reset_after_successes: u32,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            baseline: Duration::from_millis(config.request_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            reset_after_successes: config.reset_after_successes.max(1),
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_request: None,
        }
    }

    /// Delay currently enforced between two requests
    pub fn current_delay(&self) -> Duration {
        if self.consecutive_failures == 0 {
            return self.baseline;
        }

        let exponent = self.consecutive_failures.min(MAX_BACKOFF_EXPONENT);
        let backoff = self.baseline.max(MIN_BACKOFF_BASE) * 2u32.pow(exponent);
        backoff.min(self.max_delay).max(self.baseline)
    }

    /// Time still to wait at `now` before the next request may go out
    pub fn time_until_ready(&self, now: Instant) -> Duration {
        match self.last_request {
            Some(last) => self.current_delay().saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Sleeps until the next request is allowed and marks it as sent
    pub async fn wait_before_next_request(&mut self) {
        let wait = self.time_until_ready(Instant::now());
        if !wait.is_zero() {
            tracing::trace!("Rate limiter sleeping {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.last_request = Some(Instant::now());
    }

    /// Escalates the delay after a retryable failure
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
        tracing::debug!("Backing off, next delay {:?}", self.current_delay());
    }

    /// Counts a success; enough in a row restore the baseline
    pub fn record_success(&mut self) {
        if self.consecutive_failures == 0 {
            return;
        }

        self.consecutive_successes += 1;
        if self.consecutive_successes >= self.reset_after_successes {
            self.consecutive_failures = 0;
            self.consecutive_successes = 0;
            tracing::debug!("Backoff reset to baseline {:?}", self.baseline);
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
