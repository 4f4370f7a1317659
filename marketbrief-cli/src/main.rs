//! MarketBrief CLI — fetch market data into the local store and manage
//! snapshots.
//!
//! Commands:
//! - `init` — create the database schema
//! - `fetch prices|macro|market|news` — fetch and upsert records
//! - `snapshot export|import` — Parquet snapshot of one table
//! - `latest` — report the newest stored timestamp for a filter

use anyhow::{bail, Context, Result};
use chrono::{Days, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{error, warn};

use marketbrief_core::clean::{clean_series, flag_price_spikes};
use marketbrief_core::config::{AppConfig, Credentials};
use marketbrief_core::domain::{EventRecord, MacroObservation, TimeSeriesPoint};
use marketbrief_core::fetch::FetchError;
use marketbrief_core::providers::{
    fetch_records, FetchOutcome, FetchRuntime, FredProvider, NewsProvider, PriceProvider,
    ProviderAdapter, RegionalMarketProvider, SeriesQuery,
};
use marketbrief_core::store::{
    read_snapshot, write_snapshot, EventFilter, LatestFilter, MacroFilter, SeriesFilter, Store,
    Table,
};
use marketbrief_core::summary::{summarize_indicator, summarize_series};

/// Fallback fetch window when the store has no prior data.
const DEFAULT_LOOKBACK_DAYS: u64 = 365;

#[derive(Parser)]
#[command(name = "marketbrief", about = "MarketBrief — market data fetch and store")]
struct Cli {
    /// Path to the TOML config file. Missing file uses defaults.
    #[arg(long, global = true, default_value = "marketbrief.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema (idempotent).
    Init,
    /// Fetch records from a provider and upsert them into the store.
    Fetch {
        #[command(subcommand)]
        source: FetchSource,
    },
    /// Export or import a Parquet snapshot of one table.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Newest stored timestamp matching the filter.
    Latest {
        #[arg(long, value_enum)]
        table: TableArg,

        #[arg(long)]
        symbol: Option<String>,

        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        timeframe: Option<String>,
    },
}

#[derive(Subcommand)]
enum FetchSource {
    /// Daily OHLCV bars from the price service.
    Prices {
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to the stored watermark.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), inclusive. Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Print a text summary of each fetched series.
        #[arg(long, default_value_t = false)]
        summarize: bool,
    },
    /// Macroeconomic series from the macro service.
    Macro {
        #[arg(required = true)]
        indicators: Vec<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// Provider frequency code (e.g. d, m, q).
        #[arg(long)]
        frequency: Option<String>,

        #[arg(long, default_value_t = false)]
        summarize: bool,
    },
    /// Daily bars from the regional market service.
    Market {
        #[arg(required = true)]
        symbols: Vec<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },
    /// Dated news events from the news service.
    News {
        #[arg(required = true)]
        symbols: Vec<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Write the full table to `<parquet_dir>/<name>.parquet`.
    Export {
        #[arg(long, value_enum)]
        table: TableArg,

        /// Snapshot base name. Defaults to the table name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Load a snapshot file and upsert its rows into the store.
    Import {
        #[arg(long, value_enum)]
        table: TableArg,

        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TableArg {
    Ohlcv,
    Macro,
    Events,
}

impl From<TableArg> for Table {
    fn from(arg: TableArg) -> Self {
        match arg {
            TableArg::Ohlcv => Table::Series,
            TableArg::Macro => Table::Macro,
            TableArg::Events => Table::Events,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = Store::open(&config.database_path)?;
            store.init_schema()?;
            println!("schema ready at {}", config.database_path.display());
            Ok(())
        }
        Commands::Fetch { source } => run_fetch(&config, source),
        Commands::Snapshot { action } => run_snapshot(&config, action),
        Commands::Latest {
            table,
            symbol,
            source,
            timeframe,
        } => {
            let store = Store::open(&config.database_path)?;
            store.init_schema()?;
            let latest = store.latest_timestamp(
                table.into(),
                &LatestFilter {
                    symbol,
                    source,
                    timeframe,
                },
            )?;
            match latest {
                Some(ts) => println!("{ts}"),
                None => println!("no matching rows"),
            }
            Ok(())
        }
    }
}

fn run_fetch(config: &AppConfig, source: FetchSource) -> Result<()> {
    let mut store = Store::open(&config.database_path)?;
    store.init_schema()?;
    let runtime = config.runtime();
    let credentials = Credentials::from_env();

    match source {
        FetchSource::Prices {
            symbols,
            start,
            end,
            summarize,
        } => {
            let provider = PriceProvider::new(config.fetch_policy("yahoo"));
            fetch_series_batch(
                &provider,
                &runtime,
                &mut store,
                &symbols,
                start.as_deref(),
                end.as_deref(),
                summarize,
                &[],
            )
        }
        FetchSource::Macro {
            indicators,
            start,
            end,
            frequency,
            summarize,
        } => {
            let provider = FredProvider::new(config.fetch_policy("fred"), &credentials)?;
            let end = parse_date_or_today(end.as_deref())?;
            let mut succeeded = 0;
            let mut failed = 0;

            for indicator in &indicators {
                let start = match start.as_deref() {
                    Some(raw) => parse_date(raw)?,
                    None => {
                        let latest = store.latest_timestamp(
                            Table::Macro,
                            &LatestFilter::symbol(indicator.clone()),
                        )?;
                        marketbrief_core::store::incremental_start(latest, default_start(end))
                    }
                };
                let mut query = SeriesQuery::new(indicator.clone(), start, end);
                if let Some(frequency) = &frequency {
                    query = query.with_param("frequency", frequency.clone());
                }

                match fetch_records(&provider, &runtime, &query) {
                    Ok(FetchOutcome::NoData) => {
                        println!("{indicator}: no data");
                        succeeded += 1;
                    }
                    Ok(FetchOutcome::Records(records)) => {
                        let written = store.upsert_macro(&records)?;
                        println!("{indicator}: {written} observations upserted");
                        if summarize {
                            println!(
                                "{}",
                                summarize_indicator(&records, indicator, &period_desc(start, end))
                            );
                        }
                        succeeded += 1;
                    }
                    Err(e) => {
                        failed += 1;
                        if report_fetch_error(indicator, &e) {
                            break;
                        }
                    }
                }
            }
            finish_batch(succeeded, failed, indicators.len())
        }
        FetchSource::Market {
            symbols,
            start,
            end,
        } => {
            let provider =
                RegionalMarketProvider::new(config.fetch_policy("finmind"), &credentials)?;
            fetch_series_batch(
                &provider,
                &runtime,
                &mut store,
                &symbols,
                start.as_deref(),
                end.as_deref(),
                false,
                &[],
            )
        }
        FetchSource::News {
            symbols,
            start,
            end,
        } => {
            let provider = NewsProvider::new(config.fetch_policy("finnhub"), &credentials)?;
            let end = parse_date_or_today(end.as_deref())?;
            let mut succeeded = 0;
            let mut failed = 0;

            for symbol in &symbols {
                let start = match start.as_deref() {
                    Some(raw) => parse_date(raw)?,
                    None => default_start(end),
                };
                let query = SeriesQuery::new(symbol.clone(), start, end);

                match fetch_records(&provider, &runtime, &query) {
                    Ok(FetchOutcome::NoData) => {
                        println!("{symbol}: no news");
                        succeeded += 1;
                    }
                    Ok(FetchOutcome::Records(events)) => {
                        let written = store.upsert_events(&events)?;
                        println!("{symbol}: {written} events upserted");
                        succeeded += 1;
                    }
                    Err(e) => {
                        failed += 1;
                        if report_fetch_error(symbol, &e) {
                            break;
                        }
                    }
                }
            }
            finish_batch(succeeded, failed, symbols.len())
        }
    }
}

/// Shared loop for the two OHLCV-shaped providers: incremental window,
/// fetch, clean, spike check, upsert.
#[allow(clippy::too_many_arguments)]
fn fetch_series_batch<P>(
    provider: &P,
    runtime: &FetchRuntime,
    store: &mut Store,
    symbols: &[String],
    start: Option<&str>,
    end: Option<&str>,
    summarize: bool,
    extra: &[(String, String)],
) -> Result<()>
where
    P: ProviderAdapter<Record = TimeSeriesPoint>,
{
    let end = parse_date_or_today(end)?;
    let mut succeeded = 0;
    let mut failed = 0;

    for symbol in symbols {
        let start = match start {
            Some(raw) => parse_date(raw)?,
            None => {
                let latest = store.latest_timestamp(
                    Table::Series,
                    &LatestFilter {
                        symbol: Some(symbol.clone()),
                        source: Some(provider.name().to_string()),
                        timeframe: Some("1D".to_string()),
                    },
                )?;
                marketbrief_core::store::incremental_start(latest, default_start(end))
            }
        };
        if start > end {
            println!("{symbol}: already up to date");
            succeeded += 1;
            continue;
        }

        let mut query = SeriesQuery::new(symbol.clone(), start, end);
        for (key, value) in extra {
            query = query.with_param(key.clone(), value.clone());
        }

        match fetch_records(provider, runtime, &query) {
            Ok(FetchOutcome::NoData) => {
                println!("{symbol}: no data");
                succeeded += 1;
            }
            Ok(FetchOutcome::Records(mut points)) => {
                clean_series(&mut points);
                flag_price_spikes(&points, 0.5);
                let written = store.upsert_series(&points)?;
                println!("{symbol}: {written} bars upserted");
                if summarize {
                    println!("{}", summarize_series(&points, &period_desc(start, end)));
                }
                succeeded += 1;
            }
            Err(e) => {
                failed += 1;
                if report_fetch_error(symbol, &e) {
                    break;
                }
            }
        }
    }
    finish_batch(succeeded, failed, symbols.len())
}

/// Log a fetch failure. Returns true when the remaining batch should be
/// abandoned (the provider's breaker is open, so further calls would be
/// rejected anyway).
fn report_fetch_error(subject: &str, error: &FetchError) -> bool {
    if matches!(error, FetchError::BreakerOpen { .. }) {
        warn!("{subject}: {error}; abandoning remaining symbols");
        true
    } else {
        error!("{subject}: {error}");
        false
    }
}

fn finish_batch(succeeded: usize, failed: usize, total: usize) -> Result<()> {
    println!("done: {succeeded}/{total} succeeded, {failed} failed");
    if succeeded == 0 && failed > 0 {
        bail!("all fetches failed");
    }
    Ok(())
}

fn run_snapshot(config: &AppConfig, action: SnapshotAction) -> Result<()> {
    let mut store = Store::open(&config.database_path)?;
    store.init_schema()?;

    match action {
        SnapshotAction::Export { table, name } => {
            let table: Table = table.into();
            let base_name = name.unwrap_or_else(|| table.name().to_string());
            let path = match table {
                Table::Series => {
                    let rows = store.query_series(&SeriesFilter::default())?;
                    write_snapshot(&rows, &config.parquet_dir, &base_name)?
                }
                Table::Macro => {
                    let rows = store.query_macro(&MacroFilter::default())?;
                    write_snapshot(&rows, &config.parquet_dir, &base_name)?
                }
                Table::Events => {
                    let rows = store.query_events(&EventFilter::default())?;
                    write_snapshot(&rows, &config.parquet_dir, &base_name)?
                }
            };
            println!("snapshot written to {}", path.display());
        }
        SnapshotAction::Import { table, file } => {
            let written = match Table::from(table) {
                Table::Series => {
                    let rows: Vec<TimeSeriesPoint> = read_snapshot(&file)?;
                    store.upsert_series(&rows)?
                }
                Table::Macro => {
                    let rows: Vec<MacroObservation> = read_snapshot(&file)?;
                    store.upsert_macro(&rows)?
                }
                Table::Events => {
                    let rows: Vec<EventRecord> = read_snapshot(&file)?;
                    store.upsert_events(&rows)?
                }
            };
            println!("{written} rows imported from {}", file.display());
        }
    }
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date `{raw}`, expected YYYY-MM-DD"))
}

fn parse_date_or_today(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(raw) => parse_date(raw),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn default_start(end: NaiveDate) -> NaiveDate {
    end.checked_sub_days(Days::new(DEFAULT_LOOKBACK_DAYS))
        .unwrap_or(end)
}

fn period_desc(start: NaiveDate, end: NaiveDate) -> String {
    format!("{start} to {end}")
}
