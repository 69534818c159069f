//! Lookback windows, provider range codes and request intervals.
//!
//! Users ask for spans like `3m` or `2y`. The provider only understands a
//! small set of coarse range codes, so a window resolves to the smallest range
//! code that covers the request plus the exact day count used to trim the
//! fetched series back down afterwards.

use crate::error::{BacktestError, Result};
use crate::types::PriceSeries;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const SECONDS_PER_DAY: i64 = 24 * 3600;

/// Provider range codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeCode {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "30y")]
    ThirtyYears,
    #[serde(rename = "max")]
    Max,
}

impl RangeCode {
    /// Codes the resolver picks from, narrowest first.
    pub const RESOLVABLE: [RangeCode; 9] = [
        RangeCode::FiveDays,
        RangeCode::OneMonth,
        RangeCode::ThreeMonths,
        RangeCode::SixMonths,
        RangeCode::OneYear,
        RangeCode::TwoYears,
        RangeCode::FiveYears,
        RangeCode::TenYears,
        RangeCode::Max,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeCode::OneDay => "1d",
            RangeCode::FiveDays => "5d",
            RangeCode::OneMonth => "1mo",
            RangeCode::ThreeMonths => "3mo",
            RangeCode::SixMonths => "6mo",
            RangeCode::OneYear => "1y",
            RangeCode::TwoYears => "2y",
            RangeCode::FiveYears => "5y",
            RangeCode::TenYears => "10y",
            RangeCode::ThirtyYears => "30y",
            RangeCode::Max => "max",
        }
    }

    /// Ranges a chart request can be clamped through, narrowest first.
    pub const CHART_LADDER: [RangeCode; 10] = [
        RangeCode::OneDay,
        RangeCode::FiveDays,
        RangeCode::OneMonth,
        RangeCode::ThreeMonths,
        RangeCode::SixMonths,
        RangeCode::OneYear,
        RangeCode::TwoYears,
        RangeCode::FiveYears,
        RangeCode::TenYears,
        RangeCode::ThirtyYears,
    ];

    /// Longest span in days this code covers. `None` for `max`.
    pub fn span_days(&self) -> Option<u32> {
        match self {
            RangeCode::OneDay => Some(1),
            RangeCode::FiveDays => Some(5),
            RangeCode::OneMonth => Some(30),
            RangeCode::ThreeMonths => Some(90),
            RangeCode::SixMonths => Some(180),
            RangeCode::OneYear => Some(365),
            RangeCode::TwoYears => Some(730),
            RangeCode::FiveYears => Some(1825),
            RangeCode::TenYears => Some(3650),
            RangeCode::ThirtyYears => Some(10950),
            RangeCode::Max => None,
        }
    }

    /// Smallest resolvable code whose span covers `days`.
    pub fn covering(days: u32) -> Self {
        Self::RESOLVABLE
            .iter()
            .copied()
            .find(|code| code.span_days().map_or(true, |span| span >= days))
            .unwrap_or(RangeCode::Max)
    }
}

impl fmt::Display for RangeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeCode {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1d" => Ok(RangeCode::OneDay),
            "5d" => Ok(RangeCode::FiveDays),
            "1mo" => Ok(RangeCode::OneMonth),
            "3mo" => Ok(RangeCode::ThreeMonths),
            "6mo" => Ok(RangeCode::SixMonths),
            "1y" => Ok(RangeCode::OneYear),
            "2y" => Ok(RangeCode::TwoYears),
            "5y" => Ok(RangeCode::FiveYears),
            "10y" => Ok(RangeCode::TenYears),
            "30y" => Ok(RangeCode::ThirtyYears),
            "max" => Ok(RangeCode::Max),
            other => Err(BacktestError::InvalidInput(format!(
                "unknown range code: {}",
                other
            ))),
        }
    }
}

/// Bar interval requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
        }
    }

    /// Widest chart range the provider serves at this interval.
    pub fn max_chart_range(&self) -> RangeCode {
        match self {
            Interval::OneMinute => RangeCode::OneMonth,
            Interval::FiveMinutes => RangeCode::ThreeMonths,
            Interval::FifteenMinutes => RangeCode::SixMonths,
            Interval::OneHour => RangeCode::TwoYears,
            Interval::OneDay => RangeCode::ThirtyYears,
        }
    }

    /// Window used when a chart request names none.
    pub fn default_chart_window(&self) -> &'static str {
        match self {
            Interval::OneMinute => "30d",
            Interval::FiveMinutes => "1m",
            Interval::FifteenMinutes => "3m",
            Interval::OneHour | Interval::OneDay => "1y",
        }
    }

    /// Longest lookback the provider serves at this interval.
    pub fn max_lookback_days(&self) -> u32 {
        match self {
            Interval::OneMinute => 30,
            Interval::FiveMinutes => 90,
            Interval::FifteenMinutes => 180,
            Interval::OneHour => 730,
            Interval::OneDay => 10950,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(Interval::OneMinute),
            "5m" => Ok(Interval::FiveMinutes),
            "15m" => Ok(Interval::FifteenMinutes),
            "1h" => Ok(Interval::OneHour),
            "1d" => Ok(Interval::OneDay),
            other => Err(BacktestError::InvalidInput(format!(
                "unsupported interval: {} (use 1m, 5m, 15m, 1h or 1d)",
                other
            ))),
        }
    }
}

/// A resolved lookback: what to fetch and how much of it to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    pub range: RangeCode,
    pub target_days: u32,
}

impl LookbackWindow {
    pub fn new(range: RangeCode, target_days: u32) -> Self {
        Self { range, target_days }
    }
}

impl Default for LookbackWindow {
    fn default() -> Self {
        Self::new(RangeCode::OneYear, 365)
    }
}

/// Resolve a lookback token such as `10d`, `3w`, `6m` or `2y`.
///
/// An empty token means one year. A token with a known unit but an
/// unparseable or non-positive count falls back to a per-unit default
/// instead of failing. An unknown unit is an error.
///
/// # Example
/// ```
/// use chartfolio::window::{resolve_window, RangeCode};
///
/// let window = resolve_window("3w").unwrap();
/// assert_eq!(window.range, RangeCode::OneMonth);
/// assert_eq!(window.target_days, 21);
/// ```
pub fn resolve_window(token: &str) -> Result<LookbackWindow> {
    let token = token.trim().to_lowercase();
    if token.is_empty() {
        return Ok(LookbackWindow::default());
    }

    // Split off the trailing unit character.
    let Some(unit) = token.chars().last() else {
        return Ok(LookbackWindow::default());
    };
    let count = &token[..token.len() - unit.len_utf8()];

    let (days_per_unit, fallback) = match unit {
        'd' => (1, LookbackWindow::new(RangeCode::OneMonth, 30)),
        'w' => (7, LookbackWindow::new(RangeCode::OneMonth, 21)),
        'm' => (30, LookbackWindow::new(RangeCode::OneYear, 365)),
        'y' => (365, LookbackWindow::new(RangeCode::OneYear, 365)),
        _ => return Err(BacktestError::InvalidWindow(token)),
    };

    match count.parse::<u32>() {
        Ok(n) if n > 0 => {
            let target_days = n.saturating_mul(days_per_unit);
            Ok(LookbackWindow::new(RangeCode::covering(target_days), target_days))
        }
        _ => Ok(fallback),
    }
}

/// Check a requested span against the provider's per-interval ceiling.
pub fn check_lookback(interval: Interval, days: u32) -> Result<()> {
    let max = interval.max_lookback_days();
    if days > max {
        return Err(BacktestError::InvalidInput(format!(
            "{} interval supports at most {} days of history, requested {}",
            interval, max, days
        )));
    }
    Ok(())
}

/// Map a chart request's interval and window onto what the provider serves.
///
/// An unknown interval becomes `5m`. An empty window takes the interval's
/// default. Window tokens are matched against a fixed list (`1d`, `5d`,
/// `30d`/`1m`, `90d`/`3m`, `180d`/`6m`, `1y`, `2y`, `5y`, `10y`, `30y`);
/// anything else means one month. The result is then clamped to the widest
/// range the interval allows.
///
/// # Example
/// ```
/// use chartfolio::window::{normalize_interval_window, Interval, RangeCode};
///
/// let (interval, range) = normalize_interval_window("1m", "1y");
/// assert_eq!(interval, Interval::OneMinute);
/// assert_eq!(range, RangeCode::OneMonth);
/// ```
pub fn normalize_interval_window(interval: &str, window: &str) -> (Interval, RangeCode) {
    let interval = interval.parse::<Interval>().unwrap_or_else(|_| {
        debug!("Unknown chart interval {:?}, using 5m", interval);
        Interval::FiveMinutes
    });

    let window = window.trim().to_lowercase();
    let window = if window.is_empty() {
        interval.default_chart_window()
    } else {
        window.as_str()
    };

    let requested = chart_rank(window);
    let ceiling = chart_rank(interval.max_chart_range().as_str());
    (interval, RangeCode::CHART_LADDER[requested.min(ceiling)])
}

/// Position of a window token on [`RangeCode::CHART_LADDER`].
fn chart_rank(window: &str) -> usize {
    match window {
        "1d" => 0,
        "5d" => 1,
        "30d" | "1m" | "1mo" => 2,
        "90d" | "3m" | "3mo" => 3,
        "180d" | "6m" | "6mo" => 4,
        "1y" => 5,
        "2y" => 6,
        "5y" => 7,
        "10y" => 8,
        "30y" => 9,
        _ => 2,
    }
}

/// Keep only the trailing `target_days` of a series.
///
/// The cutoff is measured back from the last timestamp. A series with no
/// more points than `target_days` is returned whole.
pub fn trim_to_span(series: PriceSeries, target_days: u32) -> PriceSeries {
    if series.is_empty() || target_days == 0 || series.len() <= target_days as usize {
        return series;
    }

    let Some(&latest) = series.timestamps.last() else {
        return series;
    };
    let cutoff = latest - i64::from(target_days) * SECONDS_PER_DAY;
    let start = series
        .timestamps
        .iter()
        .position(|&ts| ts >= cutoff)
        .unwrap_or(0);

    PriceSeries {
        symbol: series.symbol,
        timestamps: series.timestamps[start..].to_vec(),
        closes: series.closes[start..].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_defaults_to_one_year() {
        let window = resolve_window("").unwrap();
        assert_eq!(window, LookbackWindow::new(RangeCode::OneYear, 365));
        assert_eq!(resolve_window("   ").unwrap(), window);
    }

    #[test]
    fn test_day_windows() {
        assert_eq!(resolve_window("5d").unwrap(), LookbackWindow::new(RangeCode::FiveDays, 5));
        assert_eq!(resolve_window("6d").unwrap(), LookbackWindow::new(RangeCode::OneMonth, 6));
        assert_eq!(resolve_window("90d").unwrap(), LookbackWindow::new(RangeCode::ThreeMonths, 90));
        assert_eq!(resolve_window("91d").unwrap(), LookbackWindow::new(RangeCode::SixMonths, 91));
        assert_eq!(resolve_window("400d").unwrap(), LookbackWindow::new(RangeCode::TwoYears, 400));
    }

    #[test]
    fn test_week_month_year_windows() {
        assert_eq!(resolve_window("3w").unwrap(), LookbackWindow::new(RangeCode::OneMonth, 21));
        assert_eq!(resolve_window("25w").unwrap(), LookbackWindow::new(RangeCode::SixMonths, 175));
        assert_eq!(resolve_window("26w").unwrap(), LookbackWindow::new(RangeCode::OneYear, 182));
        assert_eq!(resolve_window("1m").unwrap(), LookbackWindow::new(RangeCode::OneMonth, 30));
        assert_eq!(resolve_window("6m").unwrap(), LookbackWindow::new(RangeCode::SixMonths, 180));
        assert_eq!(resolve_window("12m").unwrap(), LookbackWindow::new(RangeCode::OneYear, 360));
        assert_eq!(resolve_window("1y").unwrap(), LookbackWindow::new(RangeCode::OneYear, 365));
        assert_eq!(resolve_window("2Y").unwrap(), LookbackWindow::new(RangeCode::TwoYears, 730));
        assert_eq!(resolve_window("3y").unwrap(), LookbackWindow::new(RangeCode::FiveYears, 1095));
        assert_eq!(resolve_window("10y").unwrap(), LookbackWindow::new(RangeCode::TenYears, 3650));
        assert_eq!(resolve_window("20y").unwrap(), LookbackWindow::new(RangeCode::Max, 7300));
    }

    #[test]
    fn test_unparseable_count_falls_back() {
        assert_eq!(resolve_window("xd").unwrap(), LookbackWindow::new(RangeCode::OneMonth, 30));
        assert_eq!(resolve_window("w").unwrap(), LookbackWindow::new(RangeCode::OneMonth, 21));
        assert_eq!(resolve_window("0m").unwrap(), LookbackWindow::new(RangeCode::OneYear, 365));
        assert_eq!(resolve_window("-2y").unwrap(), LookbackWindow::new(RangeCode::OneYear, 365));
    }

    #[test]
    fn test_unknown_unit_is_error() {
        let err = resolve_window("3q").unwrap_err();
        assert!(matches!(err, BacktestError::InvalidWindow(_)));
        assert!(resolve_window("1mo").is_err());
        assert!(resolve_window("AAPL").is_err());
    }

    #[test]
    fn test_huge_counts_saturate_to_max() {
        let window = resolve_window("99999999y").unwrap();
        assert_eq!(window.range, RangeCode::Max);
        assert_eq!(window.target_days, u32::MAX);
    }

    #[test]
    fn test_covering_is_smallest_sufficient() {
        for days in [1u32, 5, 6, 30, 31, 180, 181, 365, 366, 1825, 3650, 3651] {
            let code = RangeCode::covering(days);
            if let Some(span) = code.span_days() {
                assert!(span >= days);
            }
            let idx = RangeCode::RESOLVABLE.iter().position(|c| *c == code).unwrap();
            if idx > 0 {
                let smaller = RangeCode::RESOLVABLE[idx - 1].span_days().unwrap();
                assert!(smaller < days, "{} should not be needed for {} days", code, days);
            }
        }
    }

    #[test]
    fn test_range_code_round_trip_strings() {
        for code in ["1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "30y", "max"] {
            assert_eq!(code.parse::<RangeCode>().unwrap().as_str(), code);
        }
        assert!("7y".parse::<RangeCode>().is_err());
    }

    #[test]
    fn test_interval_ceilings() {
        assert!(check_lookback(Interval::OneMinute, 30).is_ok());
        assert!(check_lookback(Interval::OneMinute, 31).is_err());
        assert!(check_lookback(Interval::OneHour, 730).is_ok());
        assert!(check_lookback(Interval::OneDay, 10950).is_ok());
        assert!(check_lookback(Interval::OneDay, 10951).is_err());
        assert_eq!("15M".parse::<Interval>().unwrap(), Interval::FifteenMinutes);
        assert!("2h".parse::<Interval>().is_err());
    }

    #[test]
    fn test_lookback_serializes_wire_codes() {
        let json = serde_json::to_string(&resolve_window("1y").unwrap()).unwrap();
        assert_eq!(json, r#"{"range":"1y","target_days":365}"#);

        let back: LookbackWindow = serde_json::from_str(r#"{"range":"3mo","target_days":90}"#).unwrap();
        assert_eq!(back, LookbackWindow::new(RangeCode::ThreeMonths, 90));

        for code in RangeCode::RESOLVABLE.iter().chain(&[RangeCode::OneDay, RangeCode::ThirtyYears]) {
            assert_eq!(serde_json::to_string(code).unwrap(), format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_normalize_interval_window_defaults() {
        assert_eq!(normalize_interval_window("1m", ""), (Interval::OneMinute, RangeCode::OneMonth));
        assert_eq!(normalize_interval_window("5m", ""), (Interval::FiveMinutes, RangeCode::OneMonth));
        assert_eq!(normalize_interval_window("15m", ""), (Interval::FifteenMinutes, RangeCode::ThreeMonths));
        assert_eq!(normalize_interval_window("1h", ""), (Interval::OneHour, RangeCode::OneYear));
        assert_eq!(normalize_interval_window("1d", " "), (Interval::OneDay, RangeCode::OneYear));
    }

    #[test]
    fn test_normalize_interval_window_clamps_to_interval() {
        assert_eq!(normalize_interval_window("1m", "5y").1, RangeCode::OneMonth);
        assert_eq!(normalize_interval_window("5m", "6m").1, RangeCode::ThreeMonths);
        assert_eq!(normalize_interval_window("15m", "1y").1, RangeCode::SixMonths);
        assert_eq!(normalize_interval_window("1h", "10y").1, RangeCode::TwoYears);
        assert_eq!(normalize_interval_window("1d", "30y").1, RangeCode::ThirtyYears);
        assert_eq!(normalize_interval_window("1d", "5d").1, RangeCode::FiveDays);
        assert_eq!(normalize_interval_window("1H", "90D").1, RangeCode::ThreeMonths);
    }

    #[test]
    fn test_normalize_interval_window_fallbacks() {
        // Unknown interval means 5m, unknown window means one month.
        assert_eq!(normalize_interval_window("2h", "1d"), (Interval::FiveMinutes, RangeCode::OneDay));
        assert_eq!(normalize_interval_window("1d", "7w"), (Interval::OneDay, RangeCode::OneMonth));
        assert_eq!(normalize_interval_window("", "3y"), (Interval::FiveMinutes, RangeCode::OneMonth));
    }

    #[test]
    fn test_trim_to_span_keeps_trailing_days() {
        let day = SECONDS_PER_DAY;
        let timestamps: Vec<i64> = (0..10).map(|i| i * day).collect();
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let series = PriceSeries::new("SPY", timestamps, closes);

        let trimmed = trim_to_span(series.clone(), 3);
        assert_eq!(trimmed.timestamps, vec![6 * day, 7 * day, 8 * day, 9 * day]);
        assert_eq!(trimmed.closes, vec![106.0, 107.0, 108.0, 109.0]);

        // Fewer points than target days: untouched.
        assert_eq!(trim_to_span(series.clone(), 10), series);
        assert_eq!(trim_to_span(series.clone(), 0), series);
    }
}
