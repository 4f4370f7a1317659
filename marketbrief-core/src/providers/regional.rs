//! Regional-market provider: FinMind-style Taiwan market data API.
//!
//! Requires `FINMIND_API_KEY`. The API wraps its HTTP transport in a
//! body-level status field; quota exhaustion is reported as status 402
//! and is treated as rate limiting, not a client fault. Date ranges are
//! inclusive on both ends.

use serde::Deserialize;
use std::time::Duration;

use crate::config::{ConfigError, Credentials};
use crate::domain::{AssetKind, TimeSeriesPoint};
use crate::fetch::{error_for_status, FetchError, FetchPolicy};

use super::{ProviderAdapter, SeriesQuery};

const BASE_URL: &str = "https://api.finmindtrade.com/api/v4/data";
const DATASET: &str = "TaiwanStockPrice";

pub const PROVIDER_NAME: &str = "finmind";

/// Body-level quota-exceeded code.
const QUOTA_STATUS: u16 = 402;

#[derive(Debug, Deserialize)]
struct FinMindResponse {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    data: Vec<FinMindRow>,
}

#[derive(Debug, Deserialize)]
struct FinMindRow {
    date: chrono::NaiveDate,
    stock_id: String,
    open: f64,
    max: f64,
    min: f64,
    close: f64,
    #[serde(rename = "Trading_Volume")]
    trading_volume: f64,
}

/// Daily bars for Taiwan-listed instruments and indices.
pub struct RegionalMarketProvider {
    client: reqwest::blocking::Client,
    policy: FetchPolicy,
    api_key: String,
    default_kind: AssetKind,
}

impl RegionalMarketProvider {
    pub fn new(policy: FetchPolicy, credentials: &Credentials) -> Result<Self, ConfigError> {
        let api_key = credentials.finmind_api_key()?.to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Ok(Self {
            client,
            policy,
            api_key,
            default_kind: AssetKind::Index,
        })
    }

    fn asset_kind_for(&self, query: &SeriesQuery) -> AssetKind {
        query
            .extra
            .get("asset_kind")
            .and_then(|raw| AssetKind::parse(raw))
            .unwrap_or(self.default_kind)
    }
}

impl ProviderAdapter for RegionalMarketProvider {
    type Record = TimeSeriesPoint;

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn endpoint(&self) -> &'static str {
        "taiwan_stock_price"
    }

    fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    fn call_live(&self, query: &SeriesQuery) -> Result<Vec<TimeSeriesPoint>, FetchError> {
        let params = [
            ("dataset", DATASET.to_string()),
            ("data_id", query.symbol.clone()),
            ("start_date", query.start.to_string()),
            ("end_date", query.end.to_string()),
            ("token", self.api_key.clone()),
        ];

        let response = self
            .client
            .get(BASE_URL)
            .query(&params)
            .send()
            .map_err(|e| FetchError::Network {
                provider: PROVIDER_NAME.into(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(error_for_status(PROVIDER_NAME, status.as_u16(), message));
        }

        let body: FinMindResponse = response.json().map_err(|e| FetchError::Decode {
            provider: PROVIDER_NAME.into(),
            message: format!("data response for {}: {e}", query.symbol),
        })?;

        normalize_rows(self.asset_kind_for(query), body)
    }
}

fn normalize_rows(
    kind: AssetKind,
    body: FinMindResponse,
) -> Result<Vec<TimeSeriesPoint>, FetchError> {
    // The transport may answer 200 with a failure encoded in the body.
    if let Some(status) = body.status {
        if status != 200 {
            let message = body.msg.unwrap_or_default();
            if status == QUOTA_STATUS {
                return Err(FetchError::RateLimited {
                    provider: PROVIDER_NAME.into(),
                    status,
                    retry_after_secs: None,
                });
            }
            return Err(error_for_status(PROVIDER_NAME, status, message));
        }
    }

    Ok(body
        .data
        .into_iter()
        .map(|row| TimeSeriesPoint {
            symbol: row.stock_id,
            timestamp: row.date.and_hms_opt(0, 0, 0).unwrap(),
            open: row.open,
            high: row.max,
            low: row.min,
            close: row.close,
            volume: row.trading_volume,
            source: PROVIDER_NAME.to_string(),
            asset_kind: kind,
            timeframe: "1D".to_string(),
        })
        .collect())
}
