//! Plain-text summaries of fetched series, consumed by downstream
//! report generation. Input is assumed sorted by timestamp (the store
//! and the cleaning pass both guarantee it).

use crate::domain::{MacroObservation, TimeSeriesPoint};

/// Fractional move treated as a trend rather than sideways noise.
const TREND_THRESHOLD: f64 = 0.02;

/// Summarize an OHLCV series: overall return, range, volume, trend
/// label, and the peak/bottom dates.
pub fn summarize_series(points: &[TimeSeriesPoint], period_desc: &str) -> String {
    let usable: Vec<&TimeSeriesPoint> = points
        .iter()
        .filter(|p| !(p.open.is_nan() || p.high.is_nan() || p.low.is_nan() || p.close.is_nan()))
        .collect();

    let (first, last) = match (usable.first(), usable.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return format!("No data available for {period_desc}."),
    };

    let first_open = first.open;
    let last_close = last.close;
    let overall_return = if first_open != 0.0 {
        (last_close - first_open) / first_open
    } else {
        0.0
    };

    let mut highest = usable[0];
    let mut lowest = usable[0];
    let mut volume_sum = 0.0;
    for &point in &usable {
        if point.high > highest.high {
            highest = point;
        }
        if point.low < lowest.low {
            lowest = point;
        }
        if !point.volume.is_nan() {
            volume_sum += point.volume;
        }
    }
    let avg_volume = volume_sum / usable.len() as f64;

    let trend = if overall_return > TREND_THRESHOLD {
        "uptrend"
    } else if overall_return < -TREND_THRESHOLD {
        "downtrend"
    } else {
        "sideways movement"
    };

    format!(
        "Summary for {period_desc} ({} to {}):\n\
         - Overall return: {:.2}%.\n\
         - Price range: low {:.2} to high {:.2}.\n\
         - Average daily volume: {:.0}.\n\
         - General trend: {trend}.\n\
         - Started at {:.2}, ended at {:.2}.\n\
         - Period peak {:.2} (on {}), period bottom {:.2} (on {}).",
        first.timestamp.date(),
        last.timestamp.date(),
        overall_return * 100.0,
        lowest.low,
        highest.high,
        avg_volume,
        first_open,
        last_close,
        highest.high,
        highest.timestamp.date(),
        lowest.low,
        lowest.timestamp.date(),
    )
}

/// Summarize a macro series: latest value, previous value, change, and
/// the period range.
pub fn summarize_indicator(
    observations: &[MacroObservation],
    indicator_name: &str,
    period_desc: &str,
) -> String {
    let usable: Vec<&MacroObservation> = observations
        .iter()
        .filter(|o| !o.value.is_nan())
        .collect();

    let latest = match usable.last() {
        Some(latest) => *latest,
        None => return format!("No data available for indicator '{indicator_name}' for {period_desc}."),
    };

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for obs in &usable {
        min = min.min(obs.value);
        max = max.max(obs.value);
    }

    let change_line = if usable.len() >= 2 {
        let previous = usable[usable.len() - 2];
        let change = latest.value - previous.value;
        let pct = if previous.value != 0.0 {
            format!(" ({:.2}%)", change / previous.value * 100.0)
        } else {
            String::new()
        };
        format!(
            "- Previous value ({}): {:.2}.\n- Change from previous: {:.2}{pct}.",
            previous.timestamp.date(),
            previous.value,
            change,
        )
    } else {
        "- Previous value: N/A.\n- Change from previous: N/A.".to_string()
    };

    format!(
        "Indicator summary for '{indicator_name}' ({period_desc}):\n\
         - Latest value ({}): {:.2}.\n\
         {change_line}\n\
         - Range in period: min {min:.2} to max {max:.2}.",
        latest.timestamp.date(),
        latest.value,
    )
}
