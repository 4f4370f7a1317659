//! Canonical record types shared by every provider adapter and the store.
//!
//! Each external source normalizes into exactly one of these shapes:
//! - [`TimeSeriesPoint`] — OHLCV bars (price and regional-market services)
//! - [`MacroObservation`] — one value of a macroeconomic series
//! - [`EventRecord`] — a dated event with a free-form detail payload
//!
//! Every record carries an identity tuple (the upsert key) and must pass
//! `validate()` before it reaches storage.

pub mod event;
pub mod indicator;
pub mod series;

pub use event::EventRecord;
pub use indicator::MacroObservation;
pub use series::{AssetKind, TimeSeriesPoint};

use chrono::NaiveDateTime;
use thiserror::Error;

/// Canonical textual timestamp form used at every storage boundary.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A record whose identity tuple is incomplete. Rejected before storage.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{kind} record is missing identity field `{field}`")]
pub struct InvalidRecord {
    pub kind: &'static str,
    pub field: &'static str,
}

/// Render a timestamp in the canonical storage form.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp back from the canonical storage form.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
}
