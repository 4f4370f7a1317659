//! SQLite store: three typed tables with composite-key upserts.
//!
//! Timestamps are stored in the canonical textual form, which sorts
//! lexicographically in timestamp order, so `MAX(date)` and range
//! predicates work directly on the text column.

use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection};
use tracing::info;

use crate::domain::{
    format_timestamp, parse_timestamp, AssetKind, EventRecord, MacroObservation, TimeSeriesPoint,
};

use super::StoreError;

/// The three persisted tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Series,
    Macro,
    Events,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Series => "ohlcv_data",
            Table::Macro => "macro_indicators",
            Table::Events => "financial_events",
        }
    }

    /// Column matched by a symbol filter.
    fn symbol_column(self) -> &'static str {
        match self {
            Table::Macro => "indicator_name",
            Table::Series | Table::Events => "symbol",
        }
    }
}

/// Optional equality filters for [`Store::latest_timestamp`].
#[derive(Debug, Clone, Default)]
pub struct LatestFilter {
    pub symbol: Option<String>,
    pub source: Option<String>,
    /// Only meaningful for the time-series table; ignored elsewhere.
    pub timeframe: Option<String>,
}

impl LatestFilter {
    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Self::default()
        }
    }
}

/// Filters for time-series reads.
#[derive(Debug, Clone, Default)]
pub struct SeriesFilter {
    pub symbol: Option<String>,
    pub source: Option<String>,
    pub timeframe: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Filters for macro-series reads.
#[derive(Debug, Clone, Default)]
pub struct MacroFilter {
    pub indicator: Option<String>,
    pub source: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Filters for event reads.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub symbol: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Single-connection, single-writer relational store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating parent directories and the file as needed).
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| StoreError::CreateDir {
                    path: dir.to_path_buf(),
                    message: e.to_string(),
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!(path = %path.display(), "opened sqlite store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: ":memory:".into(),
            source: e,
        })?;
        Ok(Self { conn })
    }

    /// Create all tables and indexes. Idempotent: re-running against an
    /// existing store leaves data untouched.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS ohlcv_data (
                    symbol      TEXT NOT NULL,
                    date        TEXT NOT NULL,
                    open        REAL,
                    high        REAL,
                    low         REAL,
                    close       REAL,
                    volume      REAL,
                    source_api  TEXT NOT NULL,
                    data_type   TEXT NOT NULL,
                    timeframe   TEXT NOT NULL,
                    PRIMARY KEY (symbol, date, source_api, timeframe)
                );
                CREATE INDEX IF NOT EXISTS idx_ohlcv_symbol_date ON ohlcv_data (symbol, date);
                CREATE INDEX IF NOT EXISTS idx_ohlcv_source_api ON ohlcv_data (source_api);
                CREATE INDEX IF NOT EXISTS idx_ohlcv_data_type ON ohlcv_data (data_type);

                CREATE TABLE IF NOT EXISTS macro_indicators (
                    indicator_name TEXT NOT NULL,
                    date           TEXT NOT NULL,
                    value          REAL,
                    source_api     TEXT NOT NULL,
                    frequency      TEXT,
                    PRIMARY KEY (indicator_name, date, source_api)
                );
                CREATE INDEX IF NOT EXISTS idx_macro_name_date ON macro_indicators (indicator_name, date);

                CREATE TABLE IF NOT EXISTS financial_events (
                    event_id     TEXT NOT NULL PRIMARY KEY,
                    event_type   TEXT NOT NULL,
                    date         TEXT NOT NULL,
                    symbol       TEXT,
                    details_json TEXT NOT NULL,
                    source_api   TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_events_type_date ON financial_events (event_type, date);
                CREATE INDEX IF NOT EXISTS idx_events_symbol ON financial_events (symbol);
                "#,
            )
            .map_err(|e| StoreError::Sqlite {
                op: "init schema",
                table: "all",
                source: e,
            })?;
        info!("database schema checked/created");
        Ok(())
    }

    /// Upsert a batch of time-series points. Records are validated
    /// before the transaction opens; the batch commits atomically or
    /// not at all. Empty input is a no-op returning 0.
    pub fn upsert_series(&mut self, rows: &[TimeSeriesPoint]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            row.validate()?;
        }

        let sqlite = |op| move |e| StoreError::Sqlite {
            op,
            table: Table::Series.name(),
            source: e,
        };

        let tx = self.conn.transaction().map_err(sqlite("begin upsert"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO ohlcv_data
                     (symbol, date, open, high, low, close, volume, source_api, data_type, timeframe)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .map_err(sqlite("prepare upsert"))?;
            for row in rows {
                stmt.execute(params![
                    row.symbol,
                    format_timestamp(row.timestamp),
                    row.open,
                    row.high,
                    row.low,
                    row.close,
                    row.volume,
                    row.source,
                    row.asset_kind.as_str(),
                    row.timeframe,
                ])
                .map_err(sqlite("execute upsert"))?;
            }
        }
        tx.commit().map_err(sqlite("commit upsert"))?;
        info!(rows = rows.len(), table = Table::Series.name(), "upserted");
        Ok(rows.len())
    }

    pub fn upsert_macro(&mut self, rows: &[MacroObservation]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            row.validate()?;
        }

        let sqlite = |op| move |e| StoreError::Sqlite {
            op,
            table: Table::Macro.name(),
            source: e,
        };

        let tx = self.conn.transaction().map_err(sqlite("begin upsert"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO macro_indicators
                     (indicator_name, date, value, source_api, frequency)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(sqlite("prepare upsert"))?;
            for row in rows {
                stmt.execute(params![
                    row.indicator,
                    format_timestamp(row.timestamp),
                    row.value,
                    row.source,
                    row.frequency,
                ])
                .map_err(sqlite("execute upsert"))?;
            }
        }
        tx.commit().map_err(sqlite("commit upsert"))?;
        info!(rows = rows.len(), table = Table::Macro.name(), "upserted");
        Ok(rows.len())
    }

    pub fn upsert_events(&mut self, rows: &[EventRecord]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            row.validate()?;
        }

        let sqlite = |op| move |e| StoreError::Sqlite {
            op,
            table: Table::Events.name(),
            source: e,
        };

        let tx = self.conn.transaction().map_err(sqlite("begin upsert"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO financial_events
                     (event_id, event_type, date, symbol, details_json, source_api)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(sqlite("prepare upsert"))?;
            for row in rows {
                stmt.execute(params![
                    row.event_id,
                    row.event_type,
                    format_timestamp(row.timestamp),
                    row.symbol,
                    row.details.to_string(),
                    row.source,
                ])
                .map_err(sqlite("execute upsert"))?;
            }
        }
        tx.commit().map_err(sqlite("commit upsert"))?;
        info!(rows = rows.len(), table = Table::Events.name(), "upserted");
        Ok(rows.len())
    }

    /// Maximum stored timestamp among rows matching the filter, or
    /// `None` when nothing matches. Absence is not an error.
    pub fn latest_timestamp(
        &self,
        table: Table,
        filter: &LatestFilter,
    ) -> Result<Option<NaiveDateTime>, StoreError> {
        let mut conditions = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(symbol) = &filter.symbol {
            conditions.push(format!("{} = ?", table.symbol_column()));
            values.push(symbol.clone());
        }
        if let Some(source) = &filter.source {
            conditions.push("source_api = ?".to_string());
            values.push(source.clone());
        }
        if table == Table::Series {
            if let Some(timeframe) = &filter.timeframe {
                conditions.push("timeframe = ?".to_string());
                values.push(timeframe.clone());
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!("SELECT MAX(date) FROM {}{}", table.name(), where_clause);

        let raw: Option<String> = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
            .map_err(|e| StoreError::Sqlite {
                op: "latest timestamp",
                table: table.name(),
                source: e,
            })?;

        match raw {
            None => Ok(None),
            Some(text) => parse_timestamp(&text)
                .map(Some)
                .map_err(|_| StoreError::Timestamp {
                    table: table.name(),
                    value: text,
                }),
        }
    }

    /// Time-series rows matching the filter, ordered by timestamp.
    pub fn query_series(&self, filter: &SeriesFilter) -> Result<Vec<TimeSeriesPoint>, StoreError> {
        let mut conditions = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(symbol) = &filter.symbol {
            conditions.push("symbol = ?");
            values.push(symbol.clone());
        }
        if let Some(source) = &filter.source {
            conditions.push("source_api = ?");
            values.push(source.clone());
        }
        if let Some(timeframe) = &filter.timeframe {
            conditions.push("timeframe = ?");
            values.push(timeframe.clone());
        }
        if let Some(start) = filter.start {
            conditions.push("date >= ?");
            values.push(format_timestamp(start));
        }
        if let Some(end) = filter.end {
            conditions.push("date <= ?");
            values.push(format_timestamp(end));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT symbol, date, open, high, low, close, volume, source_api, data_type, timeframe
             FROM ohlcv_data{where_clause} ORDER BY date ASC"
        );

        let sqlite = |e| StoreError::Sqlite {
            op: "query",
            table: Table::Series.name(),
            source: e,
        };

        let mut stmt = self.conn.prepare(&sql).map_err(sqlite)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })
            .map_err(sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sqlite)?;

        let mut points = Vec::with_capacity(rows.len());
        for (symbol, date, open, high, low, close, volume, source, data_type, timeframe) in rows {
            let timestamp = parse_timestamp(&date).map_err(|_| StoreError::Timestamp {
                table: Table::Series.name(),
                value: date.clone(),
            })?;
            let asset_kind =
                AssetKind::parse(&data_type).ok_or_else(|| StoreError::AssetKind {
                    table: Table::Series.name(),
                    value: data_type.clone(),
                })?;
            points.push(TimeSeriesPoint {
                symbol,
                timestamp,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(f64::NAN),
                source,
                asset_kind,
                timeframe,
            });
        }
        Ok(points)
    }

    /// Macro observations matching the filter, ordered by timestamp.
    pub fn query_macro(&self, filter: &MacroFilter) -> Result<Vec<MacroObservation>, StoreError> {
        let mut conditions = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(indicator) = &filter.indicator {
            conditions.push("indicator_name = ?");
            values.push(indicator.clone());
        }
        if let Some(source) = &filter.source {
            conditions.push("source_api = ?");
            values.push(source.clone());
        }
        if let Some(start) = filter.start {
            conditions.push("date >= ?");
            values.push(format_timestamp(start));
        }
        if let Some(end) = filter.end {
            conditions.push("date <= ?");
            values.push(format_timestamp(end));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT indicator_name, date, value, source_api, frequency
             FROM macro_indicators{where_clause} ORDER BY date ASC"
        );

        let sqlite = |e| StoreError::Sqlite {
            op: "query",
            table: Table::Macro.name(),
            source: e,
        };

        let mut stmt = self.conn.prepare(&sql).map_err(sqlite)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .map_err(sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sqlite)?;

        let mut observations = Vec::with_capacity(rows.len());
        for (indicator, date, value, source, frequency) in rows {
            let timestamp = parse_timestamp(&date).map_err(|_| StoreError::Timestamp {
                table: Table::Macro.name(),
                value: date.clone(),
            })?;
            observations.push(MacroObservation {
                indicator,
                timestamp,
                value: value.unwrap_or(f64::NAN),
                source,
                frequency: frequency.unwrap_or_default(),
            });
        }
        Ok(observations)
    }

    /// Events matching the filter, ordered by timestamp.
    pub fn query_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, StoreError> {
        let mut conditions = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(event_type) = &filter.event_type {
            conditions.push("event_type = ?");
            values.push(event_type.clone());
        }
        if let Some(symbol) = &filter.symbol {
            conditions.push("symbol = ?");
            values.push(symbol.clone());
        }
        if let Some(start) = filter.start {
            conditions.push("date >= ?");
            values.push(format_timestamp(start));
        }
        if let Some(end) = filter.end {
            conditions.push("date <= ?");
            values.push(format_timestamp(end));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT event_id, event_type, date, symbol, details_json, source_api
             FROM financial_events{where_clause} ORDER BY date ASC"
        );

        let sqlite = |e| StoreError::Sqlite {
            op: "query",
            table: Table::Events.name(),
            source: e,
        };

        let mut stmt = self.conn.prepare(&sql).map_err(sqlite)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sqlite)?;

        let mut events = Vec::with_capacity(rows.len());
        for (event_id, event_type, date, symbol, details_json, source) in rows {
            let timestamp = parse_timestamp(&date).map_err(|_| StoreError::Timestamp {
                table: Table::Events.name(),
                value: date.clone(),
            })?;
            let details =
                serde_json::from_str(&details_json).map_err(|_| StoreError::Detail {
                    event_id: event_id.clone(),
                })?;
            events.push(EventRecord {
                event_id,
                event_type,
                timestamp,
                symbol,
                details,
                source,
            });
        }
        Ok(events)
    }
}
