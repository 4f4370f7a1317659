//! Price-series provider: Yahoo-style v8 chart API.
//!
//! Yahoo has no official API and is subject to unannounced format
//! changes; decode failures are surfaced as faults rather than guessed
//! around. No credential is required.

use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::{AssetKind, TimeSeriesPoint};
use crate::fetch::{error_for_status, FetchError, FetchPolicy};

use super::{ProviderAdapter, SeriesQuery};

const BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

pub const PROVIDER_NAME: &str = "yahoo";

/// Chart API response envelope.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

/// Daily OHLCV bars from the chart endpoint.
pub struct PriceProvider {
    client: reqwest::blocking::Client,
    policy: FetchPolicy,
    default_kind: AssetKind,
}

impl PriceProvider {
    pub fn new(policy: FetchPolicy) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            policy,
            default_kind: AssetKind::Equity,
        }
    }

    pub fn with_default_kind(mut self, kind: AssetKind) -> Self {
        self.default_kind = kind;
        self
    }

    /// The provider treats `period2` as exclusive; widen to the end of
    /// the requested day so the inclusive query contract holds.
    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let end_ts = end.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp();
        format!("{BASE_URL}/{symbol}?period1={start_ts}&period2={end_ts}&interval=1d")
    }

    fn asset_kind_for(&self, query: &SeriesQuery) -> AssetKind {
        query
            .extra
            .get("asset_kind")
            .and_then(|raw| AssetKind::parse(raw))
            .unwrap_or(self.default_kind)
    }
}

impl ProviderAdapter for PriceProvider {
    type Record = TimeSeriesPoint;

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn endpoint(&self) -> &'static str {
        "chart"
    }

    fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    fn call_live(&self, query: &SeriesQuery) -> Result<Vec<TimeSeriesPoint>, FetchError> {
        let url = Self::chart_url(&query.symbol, query.start, query.end);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| FetchError::Network {
                provider: PROVIDER_NAME.into(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(FetchError::RateLimited {
                provider: PROVIDER_NAME.into(),
                status: 429,
                retry_after_secs: retry_after,
            });
        }
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(error_for_status(PROVIDER_NAME, status.as_u16(), message));
        }

        let chart: ChartResponse = response.json().map_err(|e| FetchError::Decode {
            provider: PROVIDER_NAME.into(),
            message: format!("chart response for {}: {e}", query.symbol),
        })?;

        normalize_chart(&query.symbol, self.asset_kind_for(query), chart)
    }
}

/// Flatten the column-oriented chart payload into canonical bars.
///
/// Rows where every OHLCV component is null (holidays, half days) are
/// skipped; partially-null rows keep NaN placeholders for the cleaning
/// pass. An empty result set is zero rows, not a fault.
fn normalize_chart(
    symbol: &str,
    kind: AssetKind,
    response: ChartResponse,
) -> Result<Vec<TimeSeriesPoint>, FetchError> {
    let decode = |message: String| FetchError::Decode {
        provider: PROVIDER_NAME.into(),
        message,
    };

    let result = match response.chart.result {
        Some(result) => result,
        None => {
            return match response.chart.error {
                Some(err) => Err(decode(format!("{}: {}", err.code, err.description))),
                None => Err(decode("empty result with no error".into())),
            };
        }
    };

    let data = match result.into_iter().next() {
        Some(data) => data,
        None => return Ok(Vec::new()),
    };

    let timestamps = match data.timestamp {
        Some(ts) if !ts.is_empty() => ts,
        _ => return Ok(Vec::new()),
    };

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| decode("no quote data".into()))?;

    let mut points = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let timestamp = chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| decode(format!("invalid timestamp: {ts}")))?;

        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();

        if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none()
        {
            continue;
        }

        points.push(TimeSeriesPoint {
            symbol: symbol.to_string(),
            timestamp,
            open: open.unwrap_or(f64::NAN),
            high: high.unwrap_or(f64::NAN),
            low: low.unwrap_or(f64::NAN),
            close: close.unwrap_or(f64::NAN),
            volume: volume.map(|v| v as f64).unwrap_or(f64::NAN),
            source: PROVIDER_NAME.to_string(),
            asset_kind: kind,
            timeframe: "1D".to_string(),
        });
    }

    Ok(points)
}
