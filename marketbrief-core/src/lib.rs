//! MarketBrief Core — resilient financial data fetching and local
//! persistence.
//!
//! This crate contains the data backbone of the report pipeline:
//! - Canonical record types (time-series bars, macro observations, events)
//! - Failure classification, bounded retry, and per-provider circuit breaking
//! - A deterministic mock store for offline/replay runs
//! - Four provider adapters (prices, macro series, regional market, news)
//! - A SQLite store with composite-key upserts plus Parquet snapshots
//! - Cleaning and text-summary helpers for fetched series

pub mod clean;
pub mod config;
pub mod domain;
pub mod fetch;
pub mod providers;
pub mod store;
pub mod summary;
