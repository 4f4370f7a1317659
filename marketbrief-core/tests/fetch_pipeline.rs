//! End-to-end pipeline in simulation mode: recorded response → provider
//! adapter → store upsert → incremental watermark → snapshot.

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use marketbrief_core::domain::{AssetKind, TimeSeriesPoint};
use marketbrief_core::fetch::{CircuitBreaker, FetchPolicy, MockStore, RetryPolicy};
use marketbrief_core::providers::{
    fetch_records, FetchOutcome, FetchRuntime, PriceProvider, ProviderAdapter, SeriesQuery,
};
use marketbrief_core::store::{
    incremental_start, read_snapshot, write_snapshot, LatestFilter, SeriesFilter, Store, Table,
};

fn ts(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn point(day: u32, open: f64) -> TimeSeriesPoint {
    TimeSeriesPoint {
        symbol: "BTCUSD".into(),
        timestamp: ts(day),
        open,
        high: open + 150.0,
        low: open - 150.0,
        close: open + 50.0,
        volume: 100.0,
        source: "yahoo".into(),
        asset_kind: AssetKind::Crypto,
        timeframe: "1D".into(),
    }
}

fn provider() -> PriceProvider {
    PriceProvider::new(FetchPolicy::new(
        CircuitBreaker::with_defaults("yahoo"),
        RetryPolicy::default(),
    ))
}

fn record_mock_response(mock_dir: &TempDir, query: &SeriesQuery, points: &[TimeSeriesPoint]) {
    let provider = provider();
    let key = MockStore::key(provider.name(), provider.endpoint(), &query.mock_params());
    std::fs::write(
        mock_dir.path().join(format!("{key}.json")),
        serde_json::to_string(points).unwrap(),
    )
    .unwrap();
}

#[test]
fn simulated_fetch_flows_into_the_store_and_back_out() {
    let mock_dir = TempDir::new().unwrap();
    let query = SeriesQuery::new(
        "BTCUSD",
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
    );
    let recorded = vec![point(1, 30000.0), point(2, 30050.0)];
    record_mock_response(&mock_dir, &query, &recorded);

    let runtime = FetchRuntime::simulated(mock_dir.path());
    let provider = provider();

    // The recorded response comes back exactly, and reproducibly.
    let first = fetch_records(&provider, &runtime, &query).unwrap();
    let second = fetch_records(&provider, &runtime, &query).unwrap();
    assert_eq!(first, second);
    let points = first.into_records();
    assert_eq!(points, recorded);

    // Persist, then check the incremental watermark.
    let mut store = Store::open_in_memory().unwrap();
    store.init_schema().unwrap();
    assert_eq!(store.upsert_series(&points).unwrap(), 2);

    let latest = store
        .latest_timestamp(Table::Series, &LatestFilter::symbol("BTCUSD"))
        .unwrap();
    assert_eq!(latest, Some(ts(2)));
    assert_eq!(
        incremental_start(latest, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
        NaiveDate::from_ymd_opt(2023, 1, 3).unwrap()
    );

    // Re-running the same fetch-and-persist cycle changes nothing.
    let replay = fetch_records(&provider, &runtime, &query).unwrap().into_records();
    store.upsert_series(&replay).unwrap();
    let rows = store.query_series(&SeriesFilter::default()).unwrap();
    assert_eq!(rows.len(), 2);

    // Snapshot out and back.
    let snapshot_dir = TempDir::new().unwrap();
    let path = write_snapshot(&rows, snapshot_dir.path(), "ohlcv_data").unwrap();
    let restored: Vec<TimeSeriesPoint> = read_snapshot(&path).unwrap();
    assert_eq!(restored, rows);
}

#[test]
fn unrecorded_query_is_no_data_in_simulation_mode() {
    let mock_dir = TempDir::new().unwrap();
    let runtime = FetchRuntime::simulated(mock_dir.path());
    let provider = provider();

    let query = SeriesQuery::new(
        "UNRECORDED",
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
    );
    let outcome = fetch_records(&provider, &runtime, &query).unwrap();
    assert_eq!(outcome, FetchOutcome::NoData);
}
