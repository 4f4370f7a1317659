//! Provider adapters.
//!
//! One trait, four concrete sources. Each adapter owns its HTTP client
//! and its [`FetchPolicy`] (so breaker state is per-provider), knows its
//! own end-date convention, and normalizes the native payload into one
//! canonical record type. The shared [`fetch_records`] entry point
//! routes to the mock store in simulation mode and through the
//! breaker/retry composition live.

pub mod fred;
pub mod news;
pub mod prices;
pub mod regional;

pub use fred::FredProvider;
pub use news::NewsProvider;
pub use prices::PriceProvider;
pub use regional::RegionalMarketProvider;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::fetch::{FetchError, FetchPolicy, MockStore};

/// Query shared by all adapters: one series identifier and an inclusive
/// date range. End-exclusivity quirks are handled inside each adapter.
#[derive(Debug, Clone)]
pub struct SeriesQuery {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Provider-specific extras (e.g. FRED `frequency`).
    pub extra: BTreeMap<String, String>,
}

impl SeriesQuery {
    pub fn new(symbol: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            end,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Parameter map used to derive the mock-store key.
    pub fn mock_params(&self) -> BTreeMap<String, String> {
        let mut params = self.extra.clone();
        params.insert("symbol".into(), self.symbol.clone());
        params.insert("start".into(), self.start.to_string());
        params.insert("end".into(), self.end.to_string());
        params
    }
}

/// Result of a fetch: records, or a valid empty outcome. `NoData` is not
/// a fault — report generation must treat it distinctly from an error.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<R> {
    Records(Vec<R>),
    NoData,
}

impl<R> FetchOutcome<R> {
    pub fn is_no_data(&self) -> bool {
        matches!(self, FetchOutcome::NoData)
    }

    /// The records, empty for `NoData`.
    pub fn into_records(self) -> Vec<R> {
        match self {
            FetchOutcome::Records(records) => records,
            FetchOutcome::NoData => Vec::new(),
        }
    }
}

/// One external data source normalizing into a canonical record type.
pub trait ProviderAdapter {
    type Record: DeserializeOwned;

    /// Stable provider name; used as the `source` tag on records, the
    /// breaker label, and the mock-store key prefix.
    fn name(&self) -> &'static str;

    /// Endpoint name within the provider, for the mock-store key.
    fn endpoint(&self) -> &'static str;

    fn policy(&self) -> &FetchPolicy;

    /// One live transport call plus normalization. Runs under the
    /// breaker/retry composition; implementations must not retry
    /// internally.
    fn call_live(&self, query: &SeriesQuery) -> Result<Vec<Self::Record>, FetchError>;
}

/// Execution mode shared by all adapters.
#[derive(Debug, Clone)]
pub struct FetchRuntime {
    pub simulation: bool,
    pub mock: MockStore,
}

impl FetchRuntime {
    pub fn live(mock_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            simulation: false,
            mock: MockStore::new(mock_dir),
        }
    }

    pub fn simulated(mock_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            simulation: true,
            mock: MockStore::new(mock_dir),
        }
    }
}

/// Fetch canonical records from one provider.
///
/// In simulation mode the mock store is consulted first and
/// unconditionally — the live transport, retry loop, and breaker are
/// bypassed entirely. Live, the call runs under the provider's policy;
/// zero rows is an explicit [`FetchOutcome::NoData`], not a fault, and
/// does not count toward the breaker.
pub fn fetch_records<P: ProviderAdapter>(
    provider: &P,
    runtime: &FetchRuntime,
    query: &SeriesQuery,
) -> Result<FetchOutcome<P::Record>, FetchError> {
    if runtime.simulation {
        return match runtime
            .mock
            .lookup(provider.name(), provider.endpoint(), &query.mock_params())?
        {
            Some(records) => Ok(FetchOutcome::Records(records)),
            None => {
                info!(
                    provider = provider.name(),
                    symbol = %query.symbol,
                    "no recorded response, treating as no data"
                );
                Ok(FetchOutcome::NoData)
            }
        };
    }

    let records = provider.policy().call(|| provider.call_live(query))?;
    if records.is_empty() {
        info!(
            provider = provider.name(),
            symbol = %query.symbol,
            "provider returned zero rows"
        );
        Ok(FetchOutcome::NoData)
    } else {
        Ok(FetchOutcome::Records(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{BreakerState, CircuitBreaker, RetryPolicy};
    use serde::{Deserialize, Serialize};
    use std::cell::Cell;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        value: f64,
    }

    struct StubProvider {
        policy: FetchPolicy,
        live_calls: Cell<u32>,
        response: Result<Vec<Row>, &'static str>,
    }

    impl StubProvider {
        fn new(response: Result<Vec<Row>, &'static str>) -> Self {
            Self {
                policy: FetchPolicy::new(
                    CircuitBreaker::new("stub", 3, Duration::from_secs(60)),
                    RetryPolicy::new(3, Duration::from_millis(1)),
                ),
                live_calls: Cell::new(0),
                response,
            }
        }
    }

    impl ProviderAdapter for StubProvider {
        type Record = Row;

        fn name(&self) -> &'static str {
            "stub"
        }

        fn endpoint(&self) -> &'static str {
            "series"
        }

        fn policy(&self) -> &FetchPolicy {
            &self.policy
        }

        fn call_live(&self, _query: &SeriesQuery) -> Result<Vec<Row>, FetchError> {
            self.live_calls.set(self.live_calls.get() + 1);
            match &self.response {
                Ok(rows) => Ok(rows.clone()),
                Err(message) => Err(FetchError::Network {
                    provider: "stub".into(),
                    message: (*message).into(),
                }),
            }
        }
    }

    fn query() -> SeriesQuery {
        SeriesQuery::new(
            "SPY",
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        )
    }

    #[test]
    fn simulation_mode_never_touches_the_live_transport() {
        let dir = TempDir::new().unwrap();
        let runtime = FetchRuntime::simulated(dir.path());
        let provider = StubProvider::new(Err("should not be called"));

        let outcome = fetch_records(&provider, &runtime, &query()).unwrap();
        assert!(outcome.is_no_data());
        assert_eq!(provider.live_calls.get(), 0);
        assert_eq!(provider.policy().breaker().state(), BreakerState::Closed);
    }

    #[test]
    fn simulation_mode_returns_the_recorded_response() {
        let dir = TempDir::new().unwrap();
        let q = query();
        let key = MockStore::key("stub", "series", &q.mock_params());
        std::fs::write(
            dir.path().join(format!("{key}.json")),
            r#"[{"value":1.5},{"value":2.5}]"#,
        )
        .unwrap();

        let runtime = FetchRuntime::simulated(dir.path());
        let provider = StubProvider::new(Err("should not be called"));

        let outcome = fetch_records(&provider, &runtime, &q).unwrap();
        assert_eq!(
            outcome.into_records(),
            vec![Row { value: 1.5 }, Row { value: 2.5 }]
        );
        assert_eq!(provider.live_calls.get(), 0);
    }

    #[test]
    fn live_zero_rows_is_no_data_and_not_a_breaker_failure() {
        let dir = TempDir::new().unwrap();
        let runtime = FetchRuntime::live(dir.path());
        let provider = StubProvider::new(Ok(vec![]));

        let outcome = fetch_records(&provider, &runtime, &query()).unwrap();
        assert!(outcome.is_no_data());
        assert_eq!(provider.live_calls.get(), 1);
        assert_eq!(provider.policy().breaker().state(), BreakerState::Closed);
    }

    #[test]
    fn live_failures_run_the_full_retry_loop() {
        let dir = TempDir::new().unwrap();
        let runtime = FetchRuntime::live(dir.path());
        let provider = StubProvider::new(Err("connection refused"));

        let err = fetch_records(&provider, &runtime, &query()).unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
        assert_eq!(provider.live_calls.get(), 3);
    }
}
