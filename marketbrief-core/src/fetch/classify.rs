//! Failure classification for the retry loop.
//!
//! A pure function of the fault's shape — no side effects — so the
//! retry policy's decisions are independently testable.

use super::FetchError;

/// What the retry loop should do with a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Network-level fault or provider 5xx. Worth retrying.
    RetryableTransient,
    /// Provider throttled us (429 or provider quota code). Worth
    /// retrying after backoff.
    RetryableRateLimited,
    /// Provider rejected the request (4xx, bad credentials, bad query).
    /// Retrying cannot help; surface immediately.
    FatalClient,
    /// Unexpected fault shape. Treated conservatively as non-retryable.
    FatalUnknown,
}

impl Verdict {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Verdict::RetryableTransient | Verdict::RetryableRateLimited
        )
    }
}

/// Classify a fault raised by a provider call.
///
/// `BreakerOpen` is raised outside the retry loop and never actually
/// reaches this function on the live path; it maps to `FatalUnknown`
/// so a misuse cannot spin.
pub fn classify(error: &FetchError) -> Verdict {
    match error {
        FetchError::Network { .. } | FetchError::Server { .. } => Verdict::RetryableTransient,
        FetchError::RateLimited { .. } => Verdict::RetryableRateLimited,
        FetchError::Client { .. } => Verdict::FatalClient,
        FetchError::Decode { .. } | FetchError::BreakerOpen { .. } => Verdict::FatalUnknown,
    }
}
