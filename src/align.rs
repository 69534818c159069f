//! Multi-asset timeline alignment.
//!
//! Assets trade on different calendars: equities on market days, crypto
//! around the clock. For backtests the series with the fewest points becomes
//! the base timeline, and every other asset is forward-filled onto it.
//! Comparison charts use [`align_tail`] instead, which lines series up by
//! their most recent points.

use crate::error::{BacktestError, Result};
use crate::types::{AlignedTimeline, PriceSeries};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Align cleaned series onto the sparsest series' timestamps.
///
/// For each base timestamp an asset takes its exact close when it has a
/// positive one there, otherwise the last price it was filled with. Before an
/// asset's first fill the closest price is used: the latest positive close at
/// or before the timestamp, or failing that the first positive close after it.
pub fn align_series(series: &[PriceSeries]) -> Result<AlignedTimeline> {
    // Fewest points wins; ties keep the earlier series.
    let base = series
        .iter()
        .fold(None::<&PriceSeries>, |best, s| match best {
            Some(b) if b.len() <= s.len() => Some(b),
            _ => Some(s),
        })
        .ok_or_else(|| BacktestError::InvalidInput("no assets provided".to_string()))?;

    if base.is_empty() {
        return Err(BacktestError::InsufficientData(format!(
            "no timestamps found in base asset {}",
            base.symbol
        )));
    }

    let mut timeline = base.timestamps.clone();
    timeline.sort_unstable();

    debug!(
        "Aligning {} assets onto {} timestamps from {}",
        series.len(),
        timeline.len(),
        base.symbol
    );

    let times = to_times(&timeline)?;

    let aligned = series
        .iter()
        .map(|asset| fill_asset(asset, &timeline).map(|prices| (asset.symbol.clone(), prices)))
        .collect::<Result<Vec<_>>>()?;

    AlignedTimeline::new(times, aligned)
}

/// Line series up by their trailing points.
///
/// Every series is cut to the length of the shortest one, keeping its last
/// points. Labels come from the longest series (the first one on a tie),
/// sorted and cut the same way. Closes are taken as they are, zeros included.
pub fn align_tail(series: &[PriceSeries]) -> Result<AlignedTimeline> {
    let reference = series
        .iter()
        .fold(None::<&PriceSeries>, |best, s| match best {
            Some(b) if b.len() >= s.len() => Some(b),
            _ => Some(s),
        })
        .ok_or_else(|| BacktestError::InvalidInput("no series fetched".to_string()))?;

    let min_len = series
        .iter()
        .map(|s| s.closes.len())
        .fold(reference.len(), usize::min);
    if min_len < 2 {
        return Err(BacktestError::InsufficientData(format!(
            "not enough data points: need 2, shortest series has {}",
            min_len
        )));
    }

    let mut timeline = reference.timestamps.clone();
    timeline.sort_unstable();
    let times = to_times(&timeline[timeline.len() - min_len..])?;

    debug!(
        "Tail-aligning {} series to {} points on {}",
        series.len(),
        min_len,
        reference.symbol
    );

    let aligned = series
        .iter()
        .map(|s| (s.symbol.clone(), s.closes[s.closes.len() - min_len..].to_vec()))
        .collect();

    AlignedTimeline::new(times, aligned)
}

fn to_times(timestamps: &[i64]) -> Result<Vec<DateTime<Utc>>> {
    timestamps
        .iter()
        .map(|&ts| {
            DateTime::<Utc>::from_timestamp(ts, 0).ok_or_else(|| {
                BacktestError::AlignmentError(format!("timestamp {} out of range", ts))
            })
        })
        .collect()
}

fn fill_asset(asset: &PriceSeries, timeline: &[i64]) -> Result<Vec<f64>> {
    let by_time: HashMap<i64, f64> = asset.points().filter(|&(_, close)| close > 0.0).collect();

    let mut prices = Vec::with_capacity(timeline.len());
    let mut last: Option<f64> = None;

    for &ts in timeline {
        let price = match (by_time.get(&ts), last) {
            (Some(&exact), _) => exact,
            (None, Some(prev)) => prev,
            (None, None) => closest_price(asset, ts).ok_or_else(|| {
                BacktestError::AlignmentError(format!(
                    "no valid price data found for asset {} at or before timestamp {}",
                    asset.symbol, ts
                ))
            })?,
        };
        last = Some(price);
        prices.push(price);
    }

    if prices.len() != timeline.len() {
        return Err(BacktestError::AlignmentError(format!(
            "price alignment failed for asset {}: got {} prices, expected {}",
            asset.symbol,
            prices.len(),
            timeline.len()
        )));
    }

    Ok(prices)
}

/// Latest positive close at or before `ts`, else the first positive close
/// after it in series order.
///
/// The forward search can place a later price into an earlier slot. It only
/// triggers when an asset has no usable history before the base timeline
/// starts.
pub fn closest_price(asset: &PriceSeries, ts: i64) -> Option<f64> {
    let before = asset
        .points()
        .filter(|&(t, close)| t <= ts && close > 0.0)
        .fold(None::<(i64, f64)>, |best, (t, close)| match best {
            Some((bt, _)) if bt >= t => best,
            _ => Some((t, close)),
        });

    if let Some((_, close)) = before {
        return Some(close);
    }

    asset
        .points()
        .find(|&(t, close)| t > ts && close > 0.0)
        .map(|(_, close)| close)
}
