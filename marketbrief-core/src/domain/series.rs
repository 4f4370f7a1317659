//! OHLCV time-series records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::InvalidRecord;

/// Broad asset classification carried on every stored bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Equity,
    Crypto,
    Forex,
    Commodity,
    Index,
}

impl AssetKind {
    /// Stable storage form. Must round-trip through [`AssetKind::parse`].
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Equity => "equity",
            AssetKind::Crypto => "crypto",
            AssetKind::Forex => "forex",
            AssetKind::Commodity => "commodity",
            AssetKind::Index => "index",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "equity" => Some(AssetKind::Equity),
            "crypto" => Some(AssetKind::Crypto),
            "forex" => Some(AssetKind::Forex),
            "commodity" => Some(AssetKind::Commodity),
            "index" => Some(AssetKind::Index),
            _ => None,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OHLCV bar in canonical form.
///
/// Identity tuple: (symbol, timestamp, source, timeframe). Re-fetching
/// the same identity overwrites the payload columns, never duplicates.
///
/// Prices may be NaN straight off a provider (holiday gaps); the
/// cleaning pass fills or drops them before storage-quality use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub source: String,
    pub asset_kind: AssetKind,
    pub timeframe: String,
}

impl TimeSeriesPoint {
    /// Reject records whose identity tuple has an empty component.
    pub fn validate(&self) -> Result<(), InvalidRecord> {
        let invalid = |field| InvalidRecord {
            kind: "time-series",
            field,
        };
        if self.symbol.is_empty() {
            return Err(invalid("symbol"));
        }
        if self.source.is_empty() {
            return Err(invalid("source"));
        }
        if self.timeframe.is_empty() {
            return Err(invalid("timeframe"));
        }
        Ok(())
    }
}
