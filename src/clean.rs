//! Outlier and glitch removal for raw provider series.
//!
//! Provider feeds occasionally carry negative closes or single-bar spikes
//! several orders of magnitude off. Two passes run in order: negative values
//! are dropped, then an interquartile-range fence removes the spikes.
//! Zero closes pass the first filter; they mark missing bars for alignment.

use crate::types::PriceSeries;
use tracing::debug;

/// Fence multiplier applied to the interquartile range.
pub const IQR_MULTIPLIER: f64 = 1.5;

/// Series shorter than this are too small for the IQR fence to be meaningful.
pub const IQR_MIN_POINTS: usize = 20;

/// Drop points whose close is negative.
pub fn filter_non_negative(series: &PriceSeries) -> PriceSeries {
    series.retain_points(|_, close| close >= 0.0)
}

/// Linear-interpolated percentile of an ascending slice.
///
/// `p` is in `[0, 1]`. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let pos = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = pos.floor() as usize;
            let upper = pos.ceil() as usize;
            if lower == upper {
                return Some(sorted[lower]);
            }
            let frac = pos - lower as f64;
            Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
        }
    }
}

/// Drop points outside `[Q1 - k*IQR, Q3 + k*IQR]`.
///
/// The input is returned unchanged when it has fewer than `min_points`
/// points, when the IQR is not positive, or when filtering would leave fewer
/// than `min_points / 2` points.
pub fn filter_iqr(series: &PriceSeries, k: f64, min_points: usize) -> PriceSeries {
    if series.len() < min_points {
        return series.clone();
    }

    let mut sorted = series.closes.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let (Some(q1), Some(q3)) = (percentile(&sorted, 0.25), percentile(&sorted, 0.75)) else {
        return series.clone();
    };
    let iqr = q3 - q1;
    if !(iqr > 0.0) {
        return series.clone();
    }

    let lower = q1 - k * iqr;
    let upper = q3 + k * iqr;
    let filtered = series.retain_points(|_, close| close >= lower && close <= upper);

    if filtered.len() < min_points / 2 {
        debug!(
            "IQR filter for {} would keep only {} of {} points, leaving series unchanged",
            series.symbol,
            filtered.len(),
            series.len()
        );
        return series.clone();
    }

    filtered
}

/// Run both cleaning passes with the default fence.
pub fn clean_series(series: PriceSeries) -> PriceSeries {
    let original = series.len();
    let non_negative = filter_non_negative(&series);
    let negatives = original - non_negative.len();

    let cleaned = filter_iqr(&non_negative, IQR_MULTIPLIER, IQR_MIN_POINTS);
    let outliers = non_negative.len() - cleaned.len();

    if negatives > 0 || outliers > 0 {
        debug!(
            "Cleaned {}: dropped {} negative and {} outlier points ({} remain)",
            cleaned.symbol,
            negatives,
            outliers,
            cleaned.len()
        );
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(closes: Vec<f64>) -> PriceSeries {
        let timestamps = (0..closes.len() as i64).map(|i| 1_700_000_000 + i * 86_400).collect();
        PriceSeries::new("TEST", timestamps, closes)
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile(&sorted, 1.0), Some(4.0));
        assert!((percentile(&sorted, 0.25).unwrap() - 1.75).abs() < 1e-12);
        assert!((percentile(&sorted, 0.5).unwrap() - 2.5).abs() < 1e-12);
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&[7.0], 0.9), Some(7.0));
    }

    #[test]
    fn test_negative_closes_dropped_zero_kept() {
        let cleaned = filter_non_negative(&series(vec![10.0, -1.0, 0.0, 11.0]));
        assert_eq!(cleaned.closes, vec![10.0, 0.0, 11.0]);
        assert_eq!(cleaned.timestamps.len(), 3);
    }

    #[test]
    fn test_spike_removed() {
        let mut closes: Vec<f64> = (100..=118).map(f64::from).collect();
        closes.push(11000.0);
        let input = series(closes);

        let cleaned = clean_series(input.clone());
        assert_eq!(cleaned.len(), 19);
        assert!(cleaned.closes.iter().all(|&c| c < 200.0));
        assert_eq!(cleaned.timestamps[..], input.timestamps[..19]);
    }

    #[test]
    fn test_spike_kept_below_iqr_floor() {
        let mut closes: Vec<f64> = (100..=117).map(f64::from).collect();
        closes.push(11000.0);
        let input = series(closes);
        assert_eq!(input.len(), IQR_MIN_POINTS - 1);

        assert_eq!(clean_series(input.clone()), input);
    }

    #[test]
    fn test_short_series_untouched() {
        let input = series(vec![100.0, 101.0, 102.0, 5000.0]);
        assert_eq!(filter_iqr(&input, IQR_MULTIPLIER, IQR_MIN_POINTS), input);
    }

    #[test]
    fn test_flat_series_untouched() {
        let input = series(vec![50.0; 30]);
        assert_eq!(filter_iqr(&input, IQR_MULTIPLIER, IQR_MIN_POINTS), input);
    }

    #[test]
    fn test_over_aggressive_filter_reverted() {
        // With k = 0 only 9..=22 sit inside the fence: 14 of 30, under the 15 floor.
        let input = series((1..=30).map(f64::from).collect());
        let out = filter_iqr(&input, 0.0, 30);
        assert_eq!(out, input);

        // Same data with a lower floor keeps the filtered result.
        let out = filter_iqr(&input, 0.0, 20);
        assert_eq!(out.len(), 14);
    }
}
