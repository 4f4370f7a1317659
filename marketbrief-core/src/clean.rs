//! Cleaning pass applied to fetched bars before storage-quality use:
//! sorting, gap filling, and basic outlier detection.

use tracing::{info, warn};

use crate::domain::TimeSeriesPoint;

/// What the cleaning pass did to a batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Individual price/volume fields filled from a neighbouring row.
    pub filled: usize,
    /// Rows dropped because no fill source existed.
    pub dropped: usize,
}

/// Sort bars by timestamp and repair missing values in place:
/// NaN prices forward-fill from the previous row, leading NaNs
/// back-fill from the next, NaN volume becomes zero. Rows that still
/// lack a price after both passes are dropped.
pub fn clean_series(points: &mut Vec<TimeSeriesPoint>) -> CleanReport {
    let mut report = CleanReport::default();
    if points.is_empty() {
        return report;
    }

    points.sort_by_key(|p| p.timestamp);

    // Forward fill prices from the previous bar.
    for i in 1..points.len() {
        let (before, rest) = points.split_at_mut(i);
        let prev = &before[i - 1];
        let current = &mut rest[0];
        for (value, source) in [
            (&mut current.open, prev.open),
            (&mut current.high, prev.high),
            (&mut current.low, prev.low),
            (&mut current.close, prev.close),
        ] {
            if value.is_nan() && !source.is_nan() {
                *value = source;
                report.filled += 1;
            }
        }
    }

    // Back fill leading gaps from the next bar.
    for i in (0..points.len().saturating_sub(1)).rev() {
        let (head, tail) = points.split_at_mut(i + 1);
        let next = &tail[0];
        let current = &mut head[i];
        for (value, source) in [
            (&mut current.open, next.open),
            (&mut current.high, next.high),
            (&mut current.low, next.low),
            (&mut current.close, next.close),
        ] {
            if value.is_nan() && !source.is_nan() {
                *value = source;
                report.filled += 1;
            }
        }
    }

    for point in points.iter_mut() {
        if point.volume.is_nan() {
            point.volume = 0.0;
            report.filled += 1;
        }
    }

    let before = points.len();
    points.retain(|p| {
        !(p.open.is_nan() || p.high.is_nan() || p.low.is_nan() || p.close.is_nan())
    });
    report.dropped = before - points.len();

    if report.filled > 0 || report.dropped > 0 {
        info!(
            filled = report.filled,
            dropped = report.dropped,
            "cleaned series batch"
        );
    }
    report
}

/// Flag outliers with the IQR rule: values outside
/// `[Q1 - k*IQR, Q3 + k*IQR]`. NaNs are never flagged.
pub fn detect_outliers_iqr(values: &[f64], k: f64) -> Vec<bool> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.len() < 4 {
        return vec![false; values.len()];
    }
    finite.sort_by(|a, b| a.total_cmp(b));

    let q1 = percentile(&finite, 0.25);
    let q3 = percentile(&finite, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - k * iqr;
    let upper = q3 + k * iqr;

    values
        .iter()
        .map(|&v| !v.is_nan() && (v < lower || v > upper))
        .collect()
}

/// Indices of bars whose close moved more than `threshold` (fractional)
/// against the previous close. Logged only; the data is left untouched.
pub fn flag_price_spikes(points: &[TimeSeriesPoint], threshold: f64) -> Vec<usize> {
    let mut flagged = Vec::new();
    for i in 1..points.len() {
        let prev = points[i - 1].close;
        let current = points[i].close;
        if prev.is_nan() || current.is_nan() || prev == 0.0 {
            continue;
        }
        let change = ((current - prev) / prev).abs();
        if change > threshold {
            warn!(
                symbol = %points[i].symbol,
                timestamp = %points[i].timestamp,
                change_pct = change * 100.0,
                "price spike exceeds threshold"
            );
            flagged.push(i);
        }
    }
    flagged
}

/// Linear-interpolation percentile over a sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        let weight = rank - low as f64;
        sorted[low] * (1.0 - weight) + sorted[high] * weight
    }
}
