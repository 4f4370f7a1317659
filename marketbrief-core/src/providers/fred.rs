//! Macro-indicator provider: FRED series observations.
//!
//! Requires `FRED_API_KEY`. The API reports missing observations as the
//! literal value `"."`; those are skipped, not stored as NaN. Date
//! ranges are inclusive on both ends.

use serde::Deserialize;
use std::time::Duration;

use crate::config::{ConfigError, Credentials};
use crate::domain::MacroObservation;
use crate::fetch::{error_for_status, FetchError, FetchPolicy};

use super::{ProviderAdapter, SeriesQuery};

const BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

pub const PROVIDER_NAME: &str = "fred";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<FredObservation>,
}

#[derive(Debug, Deserialize)]
struct FredObservation {
    date: chrono::NaiveDate,
    value: String,
}

/// Macroeconomic series from FRED.
pub struct FredProvider {
    client: reqwest::blocking::Client,
    policy: FetchPolicy,
    api_key: String,
}

impl FredProvider {
    /// Fails with a configuration fault before any network attempt when
    /// the credential is absent.
    pub fn new(policy: FetchPolicy, credentials: &Credentials) -> Result<Self, ConfigError> {
        let api_key = credentials.fred_api_key()?.to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Ok(Self {
            client,
            policy,
            api_key,
        })
    }
}

impl ProviderAdapter for FredProvider {
    type Record = MacroObservation;

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn endpoint(&self) -> &'static str {
        "observations"
    }

    fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    fn call_live(&self, query: &SeriesQuery) -> Result<Vec<MacroObservation>, FetchError> {
        let mut params = vec![
            ("series_id", query.symbol.clone()),
            ("api_key", self.api_key.clone()),
            ("file_type", "json".to_string()),
            ("observation_start", query.start.to_string()),
            ("observation_end", query.end.to_string()),
        ];
        if let Some(frequency) = query.extra.get("frequency") {
            params.push(("frequency", frequency.clone()));
        }

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

        let body: ObservationsResponse = response.json().map_err(|e| FetchError::Decode {
            provider: PROVIDER_NAME.into(),
            message: format!("observations for {}: {e}", query.symbol),
        })?;

        normalize_observations(&query.symbol, frequency_tag(query), body)
    }
}

/// Release-cadence tag stored on each record; callers may override it
/// per query, defaulting to daily.
fn frequency_tag(query: &SeriesQuery) -> String {
    query
        .extra
        .get("frequency_label")
        .or_else(|| query.extra.get("frequency"))
        .cloned()
        .unwrap_or_else(|| "daily".to_string())
}

fn normalize_observations(
    indicator: &str,
    frequency: String,
    body: ObservationsResponse,
) -> Result<Vec<MacroObservation>, FetchError> {
    let mut records = Vec::with_capacity(body.observations.len());
    for obs in body.observations {
        // "." marks a missing observation in FRED payloads.
        if obs.value == "." {
            continue;
        }
        let value: f64 = obs.value.parse().map_err(|_| FetchError::Decode {
            provider: PROVIDER_NAME.into(),
            message: format!(
                "non-numeric value `{}` for {indicator} on {}",
                obs.value, obs.date
            ),
        })?;
        records.push(MacroObservation {
            indicator: indicator.to_string(),
            timestamp: obs.date.and_hms_opt(0, 0, 0).unwrap(),
            value,
            source: PROVIDER_NAME.to_string(),
            frequency: frequency.clone(),
        });
    }
    Ok(records)
}
