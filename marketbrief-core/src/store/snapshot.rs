//! Columnar snapshots: full-table Parquet dumps for archival and fast
//! bulk reload, independent of the relational store.
//!
//! Writes are atomic (write to `.tmp`, rename into place) and the
//! `.parquet` extension is appended when absent. Reads validate the
//! expected column set before rebuilding records; timestamps round-trip
//! through the canonical textual form.

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::info;

use crate::domain::{
    format_timestamp, parse_timestamp, AssetKind, EventRecord, MacroObservation, TimeSeriesPoint,
};

use super::StoreError;

/// A record type that can round-trip through a Polars DataFrame.
pub trait ColumnarRecord: Sized {
    /// Columns a snapshot of this type must contain.
    const REQUIRED_COLUMNS: &'static [&'static str];

    fn to_frame(rows: &[Self]) -> Result<DataFrame, String>;
    fn from_frame(df: &DataFrame) -> Result<Vec<Self>, String>;
}

/// Write a snapshot of `rows` to `<dir>/<base_name>.parquet`.
pub fn write_snapshot<R: ColumnarRecord>(
    rows: &[R],
    dir: &Path,
    base_name: &str,
) -> Result<PathBuf, StoreError> {
    let path = dir.join(with_parquet_extension(base_name));
    let snapshot_err = |message: String| StoreError::Snapshot {
        op: "write",
        path: path.clone(),
        message,
    };

    fs::create_dir_all(dir).map_err(|e| snapshot_err(format!("create dir: {e}")))?;

    let mut df = R::to_frame(rows).map_err(snapshot_err)?;

    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path).map_err(|e| snapshot_err(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| snapshot_err(format!("write parquet: {e}")))?;
    fs::rename(&tmp_path, &path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        snapshot_err(format!("atomic rename: {e}"))
    })?;

    info!(rows = rows.len(), path = %path.display(), "snapshot written");
    Ok(path)
}

/// Read a snapshot back. A bare base name (no `.parquet`) is probed with
/// the extension appended before failing.
pub fn read_snapshot<R: ColumnarRecord>(path: &Path) -> Result<Vec<R>, StoreError> {
    let resolved = resolve_snapshot_path(path);
    let snapshot_err = |message: String| StoreError::Snapshot {
        op: "read",
        path: resolved.clone(),
        message,
    };

    let file = fs::File::open(&resolved).map_err(|e| snapshot_err(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| snapshot_err(format!("read parquet: {e}")))?;

    for column in R::REQUIRED_COLUMNS {
        if df.column(column).is_err() {
            return Err(snapshot_err(format!("missing column `{column}`")));
        }
    }

    let rows = R::from_frame(&df).map_err(snapshot_err)?;
    info!(rows = rows.len(), path = %resolved.display(), "snapshot read");
    Ok(rows)
}

fn with_parquet_extension(base_name: &str) -> String {
    if base_name.ends_with(".parquet") {
        base_name.to_string()
    } else {
        format!("{base_name}.parquet")
    }
}

fn resolve_snapshot_path(path: &Path) -> PathBuf {
    if path.exists() || path.extension().is_some_and(|ext| ext == "parquet") {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(".parquet");
    let candidate = PathBuf::from(name);
    if candidate.exists() {
        candidate
    } else {
        path.to_path_buf()
    }
}

// ── Column extraction helpers ───────────────────────────────────────

fn str_col<'a>(df: &'a DataFrame, name: &str) -> Result<&'a StringChunked, String> {
    df.column(name)
        .map_err(|e| e.to_string())?
        .str()
        .map_err(|e| format!("column `{name}`: {e}"))
}

fn f64_col<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Float64Chunked, String> {
    df.column(name)
        .map_err(|e| e.to_string())?
        .f64()
        .map_err(|e| format!("column `{name}`: {e}"))
}

fn required_str(col: &StringChunked, name: &str, i: usize) -> Result<String, String> {
    col.get(i)
        .map(str::to_string)
        .ok_or_else(|| format!("null `{name}` at row {i}"))
}

fn parse_row_timestamp(raw: &str, i: usize) -> Result<chrono::NaiveDateTime, String> {
    parse_timestamp(raw).map_err(|_| format!("non-canonical timestamp `{raw}` at row {i}"))
}

// ── TimeSeriesPoint ─────────────────────────────────────────────────

impl ColumnarRecord for TimeSeriesPoint {
    const REQUIRED_COLUMNS: &'static [&'static str] = &[
        "symbol",
        "date",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "source_api",
        "data_type",
        "timeframe",
    ];

    fn to_frame(rows: &[Self]) -> Result<DataFrame, String> {
        let symbols: Vec<String> = rows.iter().map(|r| r.symbol.clone()).collect();
        let dates: Vec<String> = rows.iter().map(|r| format_timestamp(r.timestamp)).collect();
        let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
        let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
        let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
        let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
        let volumes: Vec<f64> = rows.iter().map(|r| r.volume).collect();
        let sources: Vec<String> = rows.iter().map(|r| r.source.clone()).collect();
        let kinds: Vec<String> = rows.iter().map(|r| r.asset_kind.as_str().to_string()).collect();
        let timeframes: Vec<String> = rows.iter().map(|r| r.timeframe.clone()).collect();

        DataFrame::new(vec![
            Column::new("symbol".into(), symbols),
            Column::new("date".into(), dates),
            Column::new("open".into(), opens),
            Column::new("high".into(), highs),
            Column::new("low".into(), lows),
            Column::new("close".into(), closes),
            Column::new("volume".into(), volumes),
            Column::new("source_api".into(), sources),
            Column::new("data_type".into(), kinds),
            Column::new("timeframe".into(), timeframes),
        ])
        .map_err(|e| format!("frame creation: {e}"))
    }

    fn from_frame(df: &DataFrame) -> Result<Vec<Self>, String> {
        let symbols = str_col(df, "symbol")?;
        let dates = str_col(df, "date")?;
        let opens = f64_col(df, "open")?;
        let highs = f64_col(df, "high")?;
        let lows = f64_col(df, "low")?;
        let closes = f64_col(df, "close")?;
        let volumes = f64_col(df, "volume")?;
        let sources = str_col(df, "source_api")?;
        let kinds = str_col(df, "data_type")?;
        let timeframes = str_col(df, "timeframe")?;

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let raw_date = required_str(dates, "date", i)?;
            let raw_kind = required_str(kinds, "data_type", i)?;
            rows.push(TimeSeriesPoint {
                symbol: required_str(symbols, "symbol", i)?,
                timestamp: parse_row_timestamp(&raw_date, i)?,
                open: opens.get(i).unwrap_or(f64::NAN),
                high: highs.get(i).unwrap_or(f64::NAN),
                low: lows.get(i).unwrap_or(f64::NAN),
                close: closes.get(i).unwrap_or(f64::NAN),
                volume: volumes.get(i).unwrap_or(f64::NAN),
                source: required_str(sources, "source_api", i)?,
                asset_kind: AssetKind::parse(&raw_kind)
                    .ok_or_else(|| format!("unknown asset kind `{raw_kind}` at row {i}"))?,
                timeframe: required_str(timeframes, "timeframe", i)?,
            });
        }
        Ok(rows)
    }
}

// ── MacroObservation ────────────────────────────────────────────────

impl ColumnarRecord for MacroObservation {
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &["indicator_name", "date", "value", "source_api", "frequency"];

    fn to_frame(rows: &[Self]) -> Result<DataFrame, String> {
        let indicators: Vec<String> = rows.iter().map(|r| r.indicator.clone()).collect();
        let dates: Vec<String> = rows.iter().map(|r| format_timestamp(r.timestamp)).collect();
        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        let sources: Vec<String> = rows.iter().map(|r| r.source.clone()).collect();
        let frequencies: Vec<String> = rows.iter().map(|r| r.frequency.clone()).collect();

        DataFrame::new(vec![
            Column::new("indicator_name".into(), indicators),
            Column::new("date".into(), dates),
            Column::new("value".into(), values),
            Column::new("source_api".into(), sources),
            Column::new("frequency".into(), frequencies),
        ])
        .map_err(|e| format!("frame creation: {e}"))
    }

    fn from_frame(df: &DataFrame) -> Result<Vec<Self>, String> {
        let indicators = str_col(df, "indicator_name")?;
        let dates = str_col(df, "date")?;
        let values = f64_col(df, "value")?;
        let sources = str_col(df, "source_api")?;
        let frequencies = str_col(df, "frequency")?;

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let raw_date = required_str(dates, "date", i)?;
            rows.push(MacroObservation {
                indicator: required_str(indicators, "indicator_name", i)?,
                timestamp: parse_row_timestamp(&raw_date, i)?,
                value: values.get(i).unwrap_or(f64::NAN),
                source: required_str(sources, "source_api", i)?,
                frequency: frequencies.get(i).unwrap_or_default().to_string(),
            });
        }
        Ok(rows)
    }
}

// ── EventRecord ─────────────────────────────────────────────────────

impl ColumnarRecord for EventRecord {
    const REQUIRED_COLUMNS: &'static [&'static str] = &[
        "event_id",
        "event_type",
        "date",
        "symbol",
        "details_json",
        "source_api",
    ];

    fn to_frame(rows: &[Self]) -> Result<DataFrame, String> {
        let ids: Vec<String> = rows.iter().map(|r| r.event_id.clone()).collect();
        let types: Vec<String> = rows.iter().map(|r| r.event_type.clone()).collect();
        let dates: Vec<String> = rows.iter().map(|r| format_timestamp(r.timestamp)).collect();
        let symbols: Vec<Option<String>> = rows.iter().map(|r| r.symbol.clone()).collect();
        let details: Vec<String> = rows.iter().map(|r| r.details.to_string()).collect();
        let sources: Vec<String> = rows.iter().map(|r| r.source.clone()).collect();

        DataFrame::new(vec![
            Column::new("event_id".into(), ids),
            Column::new("event_type".into(), types),
            Column::new("date".into(), dates),
            Column::new("symbol".into(), symbols),
            Column::new("details_json".into(), details),
            Column::new("source_api".into(), sources),
        ])
        .map_err(|e| format!("frame creation: {e}"))
    }

    fn from_frame(df: &DataFrame) -> Result<Vec<Self>, String> {
        let ids = str_col(df, "event_id")?;
        let types = str_col(df, "event_type")?;
        let dates = str_col(df, "date")?;
        let symbols = str_col(df, "symbol")?;
        let details = str_col(df, "details_json")?;
        let sources = str_col(df, "source_api")?;

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let raw_date = required_str(dates, "date", i)?;
            let raw_details = required_str(details, "details_json", i)?;
            rows.push(EventRecord {
                event_id: required_str(ids, "event_id", i)?,
                event_type: required_str(types, "event_type", i)?,
                timestamp: parse_row_timestamp(&raw_date, i)?,
                symbol: symbols.get(i).map(str::to_string),
                details: serde_json::from_str(&raw_details)
                    .map_err(|e| format!("details payload at row {i}: {e}"))?,
                source: required_str(sources, "source_api", i)?,
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use tempfile::TempDir;

    fn ts(d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample_points() -> Vec<TimeSeriesPoint> {
        vec![
            TimeSeriesPoint {
                symbol: "BTCUSD".into(),
                timestamp: ts(1),
                open: 30000.0,
                high: 30100.0,
                low: 29900.0,
                close: 30050.0,
                volume: 100.0,
                source: "test_api".into(),
                asset_kind: AssetKind::Crypto,
                timeframe: "1D".into(),
            },
            TimeSeriesPoint {
                symbol: "BTCUSD".into(),
                timestamp: ts(2),
                open: 30050.0,
                high: 30200.0,
                low: 30000.0,
                close: 30150.0,
                volume: 150.0,
                source: "test_api".into(),
                asset_kind: AssetKind::Crypto,
                timeframe: "1D".into(),
            },
        ]
    }

    #[test]
    fn series_snapshot_roundtrip_appends_extension() {
        let dir = TempDir::new().unwrap();
        let rows = sample_points();

        let path = write_snapshot(&rows, dir.path(), "ohlcv_backup").unwrap();
        assert_eq!(path.file_name().unwrap(), "ohlcv_backup.parquet");

        let restored: Vec<TimeSeriesPoint> = read_snapshot(&path).unwrap();
        assert_eq!(restored, rows);
    }

    #[test]
    fn read_probes_bare_base_name() {
        let dir = TempDir::new().unwrap();
        let rows = sample_points();
        write_snapshot(&rows, dir.path(), "ohlcv_backup").unwrap();

        let restored: Vec<TimeSeriesPoint> =
            read_snapshot(&dir.path().join("ohlcv_backup")).unwrap();
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn macro_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let rows = vec![MacroObservation {
            indicator: "DGS10".into(),
            timestamp: ts(2),
            value: 3.79,
            source: "fred".into(),
            frequency: "daily".into(),
        }];

        let path = write_snapshot(&rows, dir.path(), "macro.parquet").unwrap();
        let restored: Vec<MacroObservation> = read_snapshot(&path).unwrap();
        assert_eq!(restored, rows);
    }

    #[test]
    fn event_snapshot_roundtrip_preserves_null_symbols() {
        let dir = TempDir::new().unwrap();
        let rows = vec![
            EventRecord {
                event_id: "evt1".into(),
                event_type: "earnings".into(),
                timestamp: ts(15),
                symbol: Some("AAPL".into()),
                details: json!({"eps": "1.50"}),
                source: "test_source".into(),
            },
            EventRecord {
                event_id: "evt2".into(),
                event_type: "fed_meeting".into(),
                timestamp: ts(20),
                symbol: None,
                details: json!({}),
                source: "test_source".into(),
            },
        ];

        let path = write_snapshot(&rows, dir.path(), "events").unwrap();
        let restored: Vec<EventRecord> = read_snapshot(&path).unwrap();
        assert_eq!(restored, rows);
    }

    #[test]
    fn missing_column_is_rejected() {
        let dir = TempDir::new().unwrap();
        let rows = vec![MacroObservation {
            indicator: "DGS10".into(),
            timestamp: ts(2),
            value: 3.79,
            source: "fred".into(),
            frequency: "daily".into(),
        }];
        let path = write_snapshot(&rows, dir.path(), "macro").unwrap();

        // A macro snapshot does not satisfy the series schema.
        let err = read_snapshot::<TimeSeriesPoint>(&path).unwrap_err();
        assert!(matches!(err, StoreError::Snapshot { op: "read", .. }));
    }

    #[test]
    fn reading_a_missing_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = read_snapshot::<MacroObservation>(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StoreError::Snapshot { op: "read", .. }));
    }

    #[test]
    fn empty_snapshot_roundtrips_to_zero_rows() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<MacroObservation> = Vec::new();
        let path = write_snapshot(&rows, dir.path(), "empty").unwrap();
        let restored: Vec<MacroObservation> = read_snapshot(&path).unwrap();
        assert!(restored.is_empty());
    }
}
