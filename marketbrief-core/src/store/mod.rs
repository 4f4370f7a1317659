//! Local persistence: a relational store with composite-key upserts and
//! a columnar snapshot store for archival and fast bulk reload.

pub mod snapshot;
pub mod sqlite;

pub use snapshot::{read_snapshot, write_snapshot, ColumnarRecord};
pub use sqlite::{EventFilter, LatestFilter, MacroFilter, SeriesFilter, Store, Table};

use std::path::PathBuf;

use chrono::{Days, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::domain::InvalidRecord;

/// A persistence fault. The in-flight batch is rolled back; the fault
/// carries the operation and table so callers can log without context.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not open database at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("could not create directory {path}: {message}")]
    CreateDir { path: PathBuf, message: String },

    #[error("{op} on {table}: {source}")]
    Sqlite {
        op: &'static str,
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Invalid(#[from] InvalidRecord),

    #[error("timestamp `{value}` in {table} is not in canonical form")]
    Timestamp { table: &'static str, value: String },

    #[error("unknown asset kind `{value}` in {table}")]
    AssetKind { table: &'static str, value: String },

    #[error("event `{event_id}` has a malformed details payload")]
    Detail { event_id: String },

    #[error("snapshot {op} at {path}: {message}")]
    Snapshot {
        op: &'static str,
        path: PathBuf,
        message: String,
    },
}

/// Start of the next incremental fetch window: the day after the latest
/// stored timestamp, or the configured default when the store is empty.
pub fn incremental_start(latest: Option<NaiveDateTime>, default_start: NaiveDate) -> NaiveDate {
    match latest {
        Some(ts) => ts.date().checked_add_days(Days::new(1)).unwrap_or(ts.date()),
        None => default_start,
    }
}
