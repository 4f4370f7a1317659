//! Bounded exponential-backoff retry around one provider call.

use std::time::Duration;

use tracing::warn;

use super::classify::{classify, Verdict};
use super::FetchError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Backoff is capped at four times the base delay.
const BACKOFF_CAP_FACTOR: u32 = 4;

/// Retry policy: up to `max_attempts` calls, sleeping
/// `min(base * 2^(attempt-1), base * 4)` between failures the
/// classifier deems retryable.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one call.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-based).
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .saturating_pow(attempt.saturating_sub(1))
            .min(BACKOFF_CAP_FACTOR);
        self.base_delay * factor
    }

    /// Run `f` until it succeeds, the classifier returns a fatal
    /// verdict, or attempts are exhausted. The last fault is propagated
    /// unchanged.
    pub fn call<T>(
        &self,
        mut f: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let verdict = classify(&error);
                    if !verdict.is_retryable() || attempt >= self.max_attempts {
                        return Err(error);
                    }
                    let delay = self.delay_after(attempt);
                    warn!(
                        provider = error.provider(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        rate_limited = (verdict == Verdict::RetryableRateLimited),
                        "retrying after {error}"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
