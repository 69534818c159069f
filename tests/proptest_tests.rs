//! Property-based tests using proptest for invariant testing.
//!
//! These tests verify that:
//! 1. Cleaning keeps timestamps and closes paired, never leaves negatives,
//!    and the negative filter is idempotent
//! 2. Alignment always produces the base series' length
//! 3. Portfolio values equal cash plus marked-to-market holdings every day
//! 4. Drawdown stays within [0, 1] and steadily rising portfolios have a
//!    positive Sharpe ratio
//! 5. The weight parser rejects bad input without panicking
//! 6. Window resolution picks the smallest covering range code

use chrono::{DateTime, Utc};
use proptest::prelude::*;

use chartfolio::align::align_series;
use chartfolio::analytics::{max_drawdown, PortfolioStats};
use chartfolio::clean::{clean_series, filter_iqr, filter_non_negative, IQR_MIN_POINTS};
use chartfolio::parser::{parse_weighted_portfolio, MAX_GROSS_EXPOSURE};
use chartfolio::portfolio::PortfolioEngine;
use chartfolio::types::{AlignedTimeline, PortfolioConfig, PortfolioData, PriceSeries, WeightedAsset};
use chartfolio::window::{resolve_window, RangeCode};

const BASE_TS: i64 = 1_704_205_800;
const DAY: i64 = 86_400;

// ============================================================================
// Strategies
// ============================================================================

/// Series with ascending timestamps and closes that may be negative or zero.
fn raw_series_strategy() -> impl Strategy<Value = PriceSeries> {
    prop::collection::vec((1i64..3, -50.0..500.0f64), 0..60).prop_map(|steps| {
        let mut ts = BASE_TS;
        let points: Vec<(i64, f64)> = steps
            .into_iter()
            .map(|(gap, close)| {
                ts += gap * DAY;
                (ts, close)
            })
            .collect();
        PriceSeries::from_points("RAW", points)
    })
}

/// Strictly positive series sharing a calendar but with random holes.
fn positive_series_strategy(symbol: &'static str) -> impl Strategy<Value = PriceSeries> {
    prop::collection::vec((any::<bool>(), 1.0..1000.0f64), 2..40).prop_map(move |days| {
        let points: Vec<(i64, f64)> = days
            .into_iter()
            .enumerate()
            .filter(|(i, (keep, _))| *i == 0 || *keep)
            .map(|(i, (_, close))| (BASE_TS + i as i64 * DAY, close))
            .collect();
        PriceSeries::from_points(symbol, points)
    })
}

/// Aligned timeline with 1-4 assets, 2-50 days, and matching weights.
fn timeline_strategy() -> impl Strategy<Value = (AlignedTimeline, Vec<WeightedAsset>)> {
    (1usize..5, 2usize..50).prop_flat_map(|(assets, days)| {
        (
            prop::collection::vec(prop::collection::vec(0.5..2000.0f64, days), assets),
            prop::collection::vec(-1.0..1.0f64, assets),
        )
            .prop_map(move |(prices, weights)| {
                let times: Vec<DateTime<Utc>> = (0..days as i64)
                    .filter_map(|i| DateTime::from_timestamp(BASE_TS + i * DAY, 0))
                    .collect();
                let symbols: Vec<String> = (0..prices.len()).map(|i| format!("A{}", i)).collect();
                let timeline = AlignedTimeline::new(
                    times,
                    symbols.iter().cloned().zip(prices).collect(),
                )
                .unwrap();
                let assets = symbols
                    .into_iter()
                    .zip(weights)
                    .map(|(s, w)| WeightedAsset::new(s, w))
                    .collect();
                (timeline, assets)
            })
    })
}

// ============================================================================
// Cleaning
// ============================================================================

proptest! {
    #[test]
    fn prop_cleaning_keeps_pairs_and_drops_negatives(series in raw_series_strategy()) {
        let original: Vec<(i64, f64)> = series.points().collect();
        let cleaned = clean_series(series);

        prop_assert_eq!(cleaned.timestamps.len(), cleaned.closes.len());
        prop_assert!(cleaned.closes.iter().all(|&c| c >= 0.0));

        // Every surviving point existed in the input with the same close.
        for point in cleaned.points() {
            prop_assert!(original.contains(&point));
        }
        prop_assert!(cleaned.timestamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prop_non_negative_filter_keeps_zeros(series in raw_series_strategy()) {
        let zeros = series.closes.iter().filter(|&&c| c == 0.0).count();
        let filtered = filter_non_negative(&series);
        prop_assert_eq!(filtered.closes.iter().filter(|&&c| c == 0.0).count(), zeros);
    }

    #[test]
    fn prop_non_negative_filter_idempotent(series in raw_series_strategy()) {
        let once = filter_non_negative(&series);
        let twice = filter_non_negative(&once);
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn prop_iqr_never_over_trims(series in raw_series_strategy()) {
        let positive = filter_non_negative(&series);
        let filtered = filter_iqr(&positive, 1.5, IQR_MIN_POINTS);

        if positive.len() < IQR_MIN_POINTS {
            prop_assert_eq!(&filtered, &positive);
        } else {
            prop_assert!(filtered.len() >= IQR_MIN_POINTS / 2);
        }
    }
}

// ============================================================================
// Alignment and backtest
// ============================================================================

proptest! {
    #[test]
    fn prop_aligned_length_matches_shortest(
        a in positive_series_strategy("AAA"),
        b in positive_series_strategy("BBB"),
    ) {
        let shortest = a.len().min(b.len());
        let timeline = align_series(&[a, b]).unwrap();

        prop_assert_eq!(timeline.len(), shortest);
        for symbol in timeline.symbols() {
            let prices = timeline.prices(symbol).unwrap();
            prop_assert_eq!(prices.len(), shortest);
            prop_assert!(prices.iter().all(|&p| p > 0.0));
        }
    }

    #[test]
    fn prop_value_is_cash_plus_holdings((timeline, assets) in timeline_strategy()) {
        let config = PortfolioConfig::new(assets, 100.0);
        let data = PortfolioEngine::new(config).run(&timeline).unwrap();

        prop_assert_eq!(data.values.len(), timeline.len());
        prop_assert_eq!(data.returns.len(), timeline.len() - 1);
        prop_assert!((data.values[0] - 100.0).abs() < 1e-6);

        for (day, &value) in data.values.iter().enumerate() {
            let marked: f64 = data
                .holdings
                .iter()
                .map(|h| h.shares * timeline.prices(&h.symbol).unwrap()[day])
                .sum();
            let expected = data.cash_value + marked;
            prop_assert!(
                (value - expected).abs() <= 1e-9 * expected.abs().max(1.0),
                "day {}: {} != {}", day, value, expected
            );
        }
    }

    #[test]
    fn prop_positive_returns_positive_sharpe(
        returns in prop::collection::vec(0.001..0.05f64, 2..60),
    ) {
        // Identical returns have zero volatility and a Sharpe of 0.
        prop_assume!(returns.iter().any(|&r| r != returns[0]));

        let mut values = vec![100.0];
        for r in &returns {
            let last = values[values.len() - 1];
            values.push(last * (1.0 + r));
        }
        let data = PortfolioData {
            timestamps: Vec::new(),
            values,
            returns,
            holdings: Vec::new(),
            cash_value: 0.0,
        };

        let stats = PortfolioStats::from_portfolio(&data).unwrap();
        prop_assert!(stats.volatility_pct > 0.0);
        prop_assert!(stats.sharpe_ratio > 0.0, "sharpe {}", stats.sharpe_ratio);
    }

    #[test]
    fn prop_drawdown_bounded(values in prop::collection::vec(0.0..10_000.0f64, 0..100)) {
        let dd = max_drawdown(&values);
        prop_assert!((0.0..=1.0).contains(&dd), "drawdown {}", dd);
    }
}

// ============================================================================
// Parsing and windows
// ============================================================================

proptest! {
    #[test]
    fn prop_parser_never_panics(input in "[A-Za-z0-9 .\\-]{0,40}") {
        if let Ok(spec) = parse_weighted_portfolio(&input) {
            prop_assert!(!spec.assets.is_empty());
            prop_assert!(spec.gross_exposure() <= MAX_GROSS_EXPOSURE);
            prop_assert!(spec.assets.iter().all(|a| a.weight.abs() <= 1.0));
            prop_assert!((spec.cash_weight - (1.0 - spec.weights().iter().sum::<f64>())).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_window_picks_smallest_cover(n in 1u32..400, unit in prop::sample::select(vec!['d', 'w', 'm', 'y'])) {
        let window = resolve_window(&format!("{}{}", n, unit)).unwrap();
        let days = window.target_days;

        match window.range.span_days() {
            Some(span) => prop_assert!(span >= days),
            None => prop_assert_eq!(window.range, RangeCode::Max),
        }

        // No smaller resolvable code would do.
        for code in RangeCode::RESOLVABLE {
            if let Some(span) = code.span_days() {
                if span < window.range.span_days().unwrap_or(u32::MAX) {
                    prop_assert!(span < days, "{} also covers {} days", code, days);
                }
            }
        }
    }
}
