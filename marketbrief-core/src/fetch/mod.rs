//! Fetch-resilience core: failure classification, bounded retry, and
//! per-provider circuit breaking, plus the deterministic mock store used
//! in simulation mode.
//!
//! Live call path (ordering matters — the breaker must count one failure
//! per fully-retried logical call):
//!
//! ```text
//! breaker.call(|| retry.call(|| raw_provider_call()))
//! ```
//!
//! [`FetchPolicy`] packages that composition; every provider adapter owns
//! one, so a trip on one provider never affects another.

pub mod breaker;
pub mod classify;
pub mod mock;
pub mod retry;

pub use breaker::{BreakerState, CircuitBreaker};
pub use classify::{classify, Verdict};
pub use mock::MockStore;
pub use retry::RetryPolicy;

use thiserror::Error;

/// A fault raised on the live fetch path. Every variant names the
/// provider so callers can log and decide without unwinding context.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, timeout, DNS failure — the request never
    /// produced a provider response.
    #[error("{provider}: network error: {message}")]
    Network { provider: String, message: String },

    /// Provider responded with a 5xx status.
    #[error("{provider}: server error (HTTP {status})")]
    Server { provider: String, status: u16 },

    /// Provider signalled rate limiting (HTTP 429 or a provider-specific
    /// quota code).
    #[error("{provider}: rate limited (status {status})")]
    RateLimited {
        provider: String,
        status: u16,
        retry_after_secs: Option<u64>,
    },

    /// Provider rejected the request (4xx other than 429): bad
    /// credentials, unknown symbol, malformed query. Not retryable.
    #[error("{provider}: request rejected (HTTP {status}): {message}")]
    Client {
        provider: String,
        status: u16,
        message: String,
    },

    /// The provider answered but the payload did not have the expected
    /// shape.
    #[error("{provider}: could not decode response: {message}")]
    Decode { provider: String, message: String },

    /// The call was refused without touching the network because the
    /// provider's circuit breaker is open. Temporarily unavailable —
    /// not evidence of bad data.
    #[error("{provider}: circuit breaker open, retry in {remaining_secs}s")]
    BreakerOpen {
        provider: String,
        remaining_secs: u64,
    },
}

impl FetchError {
    /// Provider that raised the fault.
    pub fn provider(&self) -> &str {
        match self {
            FetchError::Network { provider, .. }
            | FetchError::Server { provider, .. }
            | FetchError::RateLimited { provider, .. }
            | FetchError::Client { provider, .. }
            | FetchError::Decode { provider, .. }
            | FetchError::BreakerOpen { provider, .. } => provider,
        }
    }

    /// Provider-reported status code, where one exists.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Server { status, .. }
            | FetchError::RateLimited { status, .. }
            | FetchError::Client { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Map a provider-reported HTTP-like status onto the fault taxonomy.
///
/// 429 → rate limited, other 4xx → client fault, 5xx → server fault.
/// Anything outside those ranges is an unexpected response shape.
pub fn error_for_status(provider: &str, status: u16, message: String) -> FetchError {
    let provider = provider.to_string();
    match status {
        429 => FetchError::RateLimited {
            provider,
            status,
            retry_after_secs: None,
        },
        400..=499 => FetchError::Client {
            provider,
            status,
            message,
        },
        500..=599 => FetchError::Server { provider, status },
        _ => FetchError::Decode {
            provider,
            message: format!("unexpected status {status}: {message}"),
        },
    }
}

/// Retry + circuit breaker composition for one provider.
#[derive(Debug)]
pub struct FetchPolicy {
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl FetchPolicy {
    pub fn new(breaker: CircuitBreaker, retry: RetryPolicy) -> Self {
        Self { breaker, retry }
    }

    /// Run a raw provider call under the full policy: breaker outermost,
    /// retry innermost. A call that succeeds after retries does not count
    /// as a breaker failure; retry exhaustion or a fatal verdict counts
    /// as exactly one.
    pub fn call<T>(
        &self,
        mut f: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        self.breaker.call(|| self.retry.call(&mut f))
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    fn transient(provider: &str) -> FetchError {
        FetchError::Network {
            provider: provider.into(),
            message: "connection refused".into(),
        }
    }

    fn policy(threshold: u32, reset: Duration) -> FetchPolicy {
        FetchPolicy::new(
            CircuitBreaker::new("test", threshold, reset),
            RetryPolicy::new(3, Duration::from_millis(1)),
        )
    }

    #[test]
    fn error_for_status_maps_ranges() {
        assert!(matches!(
            error_for_status("p", 429, String::new()),
            FetchError::RateLimited { status: 429, .. }
        ));
        assert!(matches!(
            error_for_status("p", 401, String::new()),
            FetchError::Client { status: 401, .. }
        ));
        assert!(matches!(
            error_for_status("p", 503, String::new()),
            FetchError::Server { status: 503, .. }
        ));
        assert!(matches!(
            error_for_status("p", 302, String::new()),
            FetchError::Decode { .. }
        ));
    }

    #[test]
    fn breaker_counts_one_failure_per_exhausted_retry_run() {
        let policy = policy(2, Duration::from_secs(60));
        let attempts = Cell::new(0u32);

        // First logical call: 3 attempts inside, one breaker failure.
        let err = policy
            .call(|| -> Result<(), FetchError> {
                attempts.set(attempts.get() + 1);
                Err(transient("test"))
            })
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
        assert_eq!(attempts.get(), 3);
        assert_eq!(policy.breaker().state(), BreakerState::Closed);

        // Second logical call trips the breaker (threshold 2).
        let _ = policy.call(|| -> Result<(), FetchError> {
            attempts.set(attempts.get() + 1);
            Err(transient("test"))
        });
        assert_eq!(attempts.get(), 6);
        assert_eq!(policy.breaker().state(), BreakerState::Open);

        // Third call is rejected without invoking the closure.
        let err = policy
            .call(|| -> Result<(), FetchError> {
                attempts.set(attempts.get() + 1);
                Err(transient("test"))
            })
            .unwrap_err();
        assert!(matches!(err, FetchError::BreakerOpen { .. }));
        assert_eq!(attempts.get(), 6);
    }

    #[test]
    fn success_after_retries_is_not_a_breaker_failure() {
        let policy = policy(1, Duration::from_secs(60));
        let attempts = Cell::new(0u32);

        let out = policy.call(|| {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(transient("test"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(out.unwrap(), 42);
        assert_eq!(policy.breaker().state(), BreakerState::Closed);
    }
}
