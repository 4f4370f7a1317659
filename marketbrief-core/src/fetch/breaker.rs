//! Per-provider circuit breaker.
//!
//! After a run of consecutive call failures the breaker opens and
//! rejects calls without touching the network until a cool-down
//! elapses; the next call after that runs as a single half-open trial.
//! Each provider owns its own instance — a trip on one provider never
//! affects another.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::FetchError;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; consecutive failures are counted.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// One trial call is in flight after the cool-down.
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Circuit breaker state machine for one provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    inner: Mutex<Inner>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            provider: provider.into(),
            inner: Mutex::new(Inner::Closed { failures: 0 }),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    /// Threshold 3, reset timeout 60s.
    pub fn with_defaults(provider: impl Into<String>) -> Self {
        Self::new(provider, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT)
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn state(&self) -> BreakerState {
        match *self.inner.lock().unwrap() {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen => BreakerState::HalfOpen,
        }
    }

    /// Run one logical call under the breaker. Rejected immediately with
    /// a [`FetchError::BreakerOpen`] while open; otherwise the outcome is
    /// recorded against the state machine.
    pub fn call<T>(
        &self,
        f: impl FnOnce() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        self.admit()?;
        match f() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }

    /// Gate a call: pass while closed or half-open; while open, either
    /// reject or — once the timeout has elapsed — move to half-open and
    /// admit the single trial call.
    fn admit(&self) -> Result<(), FetchError> {
        let mut inner = self.inner.lock().unwrap();
        match *inner {
            Inner::Closed { .. } | Inner::HalfOpen => Ok(()),
            Inner::Open { since } => {
                let elapsed = since.elapsed();
                if elapsed >= self.reset_timeout {
                    info!(provider = %self.provider, "circuit breaker half-open, admitting trial call");
                    *inner = Inner::HalfOpen;
                    Ok(())
                } else {
                    Err(FetchError::BreakerOpen {
                        provider: self.provider.clone(),
                        remaining_secs: (self.reset_timeout - elapsed).as_secs(),
                    })
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match *inner {
            Inner::Closed { failures } if failures > 0 => {
                *inner = Inner::Closed { failures: 0 };
            }
            Inner::HalfOpen => {
                info!(provider = %self.provider, "trial call succeeded, circuit breaker closed");
                *inner = Inner::Closed { failures: 0 };
            }
            _ => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match *inner {
            Inner::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    warn!(
                        provider = %self.provider,
                        failures,
                        cooldown_secs = self.reset_timeout.as_secs(),
                        "circuit breaker tripped"
                    );
                    *inner = Inner::Open {
                        since: Instant::now(),
                    };
                } else {
                    *inner = Inner::Closed { failures };
                }
            }
            Inner::HalfOpen => {
                warn!(provider = %self.provider, "trial call failed, circuit breaker re-opened");
                *inner = Inner::Open {
                    since: Instant::now(),
                };
            }
            Inner::Open { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail() -> Result<(), FetchError> {
        Err(FetchError::Network {
            provider: "test".into(),
            message: "refused".into(),
        })
    }

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn trips_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        for _ in 0..2 {
            let _ = cb.call(fail);
        }
        assert_eq!(cb.state(), BreakerState::Closed);
        let _ = cb.call(fail);
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn open_breaker_rejects_without_invoking_the_call() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_secs(60));
        let _ = cb.call(fail);
        assert_eq!(cb.state(), BreakerState::Open);

        let mut invoked = false;
        let err = cb
            .call(|| -> Result<(), FetchError> {
                invoked = true;
                Ok(())
            })
            .unwrap_err();
        assert!(!invoked);
        assert!(matches!(err, FetchError::BreakerOpen { .. }));
    }

    #[test]
    fn success_resets_the_failure_counter() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        let _ = cb.call(fail);
        let _ = cb.call(fail);
        cb.call(|| Ok(())).unwrap();
        let _ = cb.call(fail);
        let _ = cb.call(fail);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_trial_success_closes() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_millis(20));
        let _ = cb.call(fail);
        assert_eq!(cb.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(30));
        cb.call(|| Ok(())).unwrap();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_trial_failure_reopens_and_restarts_the_timer() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_millis(30));
        let _ = cb.call(fail);

        std::thread::sleep(Duration::from_millis(40));
        let err = cb.call(fail).unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
        assert_eq!(cb.state(), BreakerState::Open);

        // Immediately after re-opening, calls are rejected again.
        let err = cb.call(|| Ok(())).unwrap_err();
        assert!(matches!(err, FetchError::BreakerOpen { .. }));
    }

    #[test]
    fn breakers_are_independent_per_provider() {
        let a = CircuitBreaker::new("provider_a", 1, Duration::from_secs(60));
        let b = CircuitBreaker::new("provider_b", 1, Duration::from_secs(60));

        let _ = a.call(fail);
        assert_eq!(a.state(), BreakerState::Open);
        assert_eq!(b.state(), BreakerState::Closed);

        b.call(|| Ok(())).unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
