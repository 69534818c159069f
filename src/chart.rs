//! Chart payloads and renderers.
//!
//! A [`ChartPayload`] carries everything a line-chart renderer needs: titles,
//! axis labels in US Eastern time, one or more value lines, padded y-ranges
//! and, for backtests, the stats shown in the subtitle. Turning it into
//! pixels is left to a [`ChartRenderer`] implementation.

use crate::analytics::{percent_change, rebase, PortfolioStats};
use crate::error::{BacktestError, Result};
use crate::types::{AlignedTimeline, PortfolioConfig, PortfolioData};
use crate::window::{Interval, RangeCode};
use chrono::{DateTime, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

/// Series up to this many points get day-level labels.
const DAY_LABEL_MAX_POINTS: usize = 60;

/// Series up to this many points get a proportional split number.
const DENSE_SPLIT_MAX_POINTS: usize = 30;

const DEFAULT_SPLIT_NUMBER: usize = 6;
const MIN_SPLIT_NUMBER: usize = 3;

/// Fraction of the value span added above and below the series.
const Y_PADDING: f64 = 0.05;

/// Minimum price padding as a fraction of the max.
const PRICE_MIN_PADDING: f64 = 0.002;

/// Comparison charts with more symbols than this plot percent change.
const RAW_PRICE_MAX_SYMBOLS: usize = 2;

/// One plotted line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartLine {
    pub name: String,
    pub values: Vec<f64>,
    /// Index into [`ChartPayload::y_axes`].
    pub axis: usize,
}

/// Bounds of one y-axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    fn union(self, other: AxisRange) -> AxisRange {
        AxisRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

impl From<(f64, f64)> for AxisRange {
    fn from((min, max): (f64, f64)) -> Self {
        Self { min, max }
    }
}

/// What an indexed chart's first point is scaled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexBase {
    #[default]
    Hundred,
    One,
}

impl IndexBase {
    pub fn scale(&self) -> f64 {
        match self {
            IndexBase::Hundred => 100.0,
            IndexBase::One => 1.0,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            IndexBase::Hundred => "100",
            IndexBase::One => "1.0",
        }
    }
}

/// Renderer-agnostic description of a line chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPayload {
    pub title: String,
    /// Stats line for backtests, symbol list for comparisons.
    pub subtitle: String,
    pub x_labels: Vec<String>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub series: Vec<ChartLine>,
    pub y_axes: Vec<AxisRange>,
    /// Suggested number of x-axis divisions.
    pub split_number: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<PortfolioStats>,
}

impl ChartPayload {
    /// Build a payload for a completed backtest.
    pub fn new(title: impl Into<String>, data: &PortfolioData, stats: &PortfolioStats) -> Result<Self> {
        let y_range = padded_range(&data.values).ok_or_else(|| {
            BacktestError::RenderError("cannot chart an empty value series".to_string())
        })?;

        let x_labels = x_labels(&data.timestamps);
        let split_number = split_number(x_labels.len());

        Ok(Self {
            title: title.into(),
            subtitle: stats.summary_line(),
            x_labels,
            timestamps: data.timestamps.clone(),
            series: vec![ChartLine {
                name: "Portfolio".to_string(),
                values: data.values.clone(),
                axis: 0,
            }],
            y_axes: vec![y_range.into()],
            split_number,
            stats: Some(stats.clone()),
        })
    }

    /// Closes of a single symbol: `SPY • 1D • 1Y`.
    pub fn price(timeline: &AlignedTimeline, interval: Interval, range: RangeCode) -> Result<Self> {
        let (symbol, closes) = lines(timeline)?
            .into_iter()
            .next()
            .ok_or_else(|| BacktestError::RenderError("no series to chart".to_string()))?;
        let y_range = price_range(closes, true)?;

        Ok(Self {
            title: format!("{} • {}", symbol, interval_range_label(interval, range)),
            subtitle: String::new(),
            x_labels: interval_labels(timeline.times(), interval),
            timestamps: timeline.times().to_vec(),
            series: vec![ChartLine {
                name: symbol.to_string(),
                values: closes.to_vec(),
                axis: 0,
            }],
            y_axes: vec![y_range],
            split_number: range_split_number(range),
            stats: None,
        })
    }

    /// Several symbols on one chart.
    ///
    /// Up to two symbols are plotted as prices, alternating between a left and
    /// a right axis. With more, every line becomes percent change from its
    /// first non-zero close on a shared axis.
    pub fn comparison(timeline: &AlignedTimeline, interval: Interval, range: RangeCode) -> Result<Self> {
        let lines = lines(timeline)?;
        let names: Vec<String> = lines.iter().map(|(name, _)| name.to_string()).collect();
        let normalized = lines.len() > RAW_PRICE_MAX_SYMBOLS;

        let (series, y_axes, subtitle) = if normalized {
            let series: Vec<ChartLine> = lines
                .iter()
                .map(|(name, closes)| ChartLine {
                    name: name.to_string(),
                    values: percent_change(closes),
                    axis: 0,
                })
                .collect();
            let axis = shared_range(&series)?;
            (series, vec![axis], format!("{} • normalized %", names.join(", ")))
        } else {
            let mut axes: Vec<AxisRange> = Vec::with_capacity(2);
            let mut series = Vec::with_capacity(lines.len());
            for (idx, (name, closes)) in lines.iter().enumerate() {
                let axis = idx % 2;
                let bounds = price_range(closes, false)?;
                match axes.get_mut(axis) {
                    Some(existing) => *existing = existing.union(bounds),
                    None => axes.push(bounds),
                }
                series.push(ChartLine {
                    name: name.to_string(),
                    values: closes.to_vec(),
                    axis,
                });
            }
            (series, axes, names.join(", "))
        };

        Ok(Self {
            title: format!("Multi • {}", interval_range_label(interval, range)),
            subtitle,
            x_labels: interval_labels(timeline.times(), interval),
            timestamps: timeline.times().to_vec(),
            series,
            y_axes,
            split_number: range_split_number(range),
            stats: None,
        })
    }

    /// Several symbols scaled so each starts at `base`.
    pub fn indexed(
        timeline: &AlignedTimeline,
        interval: Interval,
        range: RangeCode,
        base: IndexBase,
    ) -> Result<Self> {
        let lines = lines(timeline)?;
        let names: Vec<String> = lines.iter().map(|(name, _)| name.to_string()).collect();
        let series: Vec<ChartLine> = lines
            .iter()
            .map(|(name, closes)| ChartLine {
                name: name.to_string(),
                values: rebase(closes, base.scale()),
                axis: 0,
            })
            .collect();
        let axis = shared_range(&series)?;

        Ok(Self {
            title: format!("Indexed • {}", interval_range_label(interval, range)),
            subtitle: format!("{} • base {}", names.join(", "), base.label()),
            x_labels: interval_labels(timeline.times(), interval),
            timestamps: timeline.times().to_vec(),
            series,
            y_axes: vec![axis],
            split_number: range_split_number(range),
            stats: None,
        })
    }
}

fn lines(timeline: &AlignedTimeline) -> Result<Vec<(&str, &[f64])>> {
    timeline
        .symbols()
        .iter()
        .map(|symbol| {
            timeline
                .prices(symbol)
                .map(|prices| (symbol.as_str(), prices))
                .ok_or_else(|| BacktestError::RenderError(format!("no prices for {}", symbol)))
        })
        .collect()
}

/// `1D • 1Y`
fn interval_range_label(interval: Interval, range: RangeCode) -> String {
    format!(
        "{} • {}",
        interval.as_str().to_uppercase(),
        range.as_str().to_uppercase()
    )
}

/// Min/max across every line, widened by 5% of the span.
fn shared_range(series: &[ChartLine]) -> Result<AxisRange> {
    let all: Vec<f64> = series.iter().flat_map(|line| line.values.iter().copied()).collect();
    padded_range(&all)
        .map(AxisRange::from)
        .ok_or_else(|| BacktestError::RenderError("cannot chart empty series".to_string()))
}

/// Price bounds padded by 5% of the span, at least 0.2% of the max.
/// `floor_at_zero` keeps the lower bound non-negative.
pub fn price_range(values: &[f64], floor_at_zero: bool) -> Result<AxisRange> {
    let first = *values
        .first()
        .ok_or_else(|| BacktestError::RenderError("cannot chart an empty series".to_string()))?;
    let (min, max) = values
        .iter()
        .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let padding = ((max - min) * Y_PADDING).max(max * PRICE_MIN_PADDING);
    let mut lower = min - padding;
    if floor_at_zero && lower < 0.0 {
        lower = 0.0;
    }
    Ok(AxisRange {
        min: lower,
        max: max + padding,
    })
}

/// `Equal Weighted Portfolio (SPY, AAPL)`
pub fn equal_weight_title(symbols: &[String]) -> String {
    format!("Equal Weighted Portfolio ({})", symbols.join(", "))
}

/// `Weighted Portfolio (SPY 60.0%, TSLA 20.0% SHORT, Cash 60.0%)`
pub fn weighted_title(config: &PortfolioConfig) -> String {
    let mut parts: Vec<String> = config
        .assets
        .iter()
        .map(|asset| {
            if asset.weight >= 0.0 {
                format!("{} {:.1}%", asset.symbol, asset.weight * 100.0)
            } else {
                format!("{} {:.1}% SHORT", asset.symbol, -asset.weight * 100.0)
            }
        })
        .collect();

    // Sums like 1 - 0.6 - 0.4 leave float dust; treat it as no cash.
    let cash = config.cash_weight;
    if cash > 1e-9 {
        parts.push(format!("Cash {:.1}%", cash * 100.0));
    } else if cash < -1e-9 {
        parts.push(format!("Margin {:.1}%", -cash * 100.0));
    }

    format!("Weighted Portfolio ({})", parts.join(", "))
}

/// Labels in America/New_York: `Jan 02` for short series, `Jan '24` beyond.
pub fn x_labels(timestamps: &[DateTime<Utc>]) -> Vec<String> {
    let format = if timestamps.len() <= DAY_LABEL_MAX_POINTS {
        "%b %d"
    } else {
        "%b '%y"
    };
    timestamps
        .iter()
        .map(|ts| ts.with_timezone(&New_York).format(format).to_string())
        .collect()
}

/// Min/max widened by 5% of the span, or 5% of the max for a flat series.
pub fn padded_range(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    let (min, max) = values
        .iter()
        .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let mut padding = (max - min) * Y_PADDING;
    if padding == 0.0 {
        padding = max * Y_PADDING;
    }
    Some((min - padding, max + padding))
}

/// Labels in America/New_York at the bar interval's resolution.
pub fn interval_labels(timestamps: &[DateTime<Utc>], interval: Interval) -> Vec<String> {
    let format = match interval {
        Interval::OneDay => "%Y-%m-%d",
        Interval::OneHour => "%b %d %H:00",
        _ => "%b %d %H:%M",
    };
    timestamps
        .iter()
        .map(|ts| ts.with_timezone(&New_York).format(format).to_string())
        .collect()
}

/// X-axis divisions for a range: 8 for five days, 10 up to six months, else 12.
pub fn range_split_number(range: RangeCode) -> usize {
    match range {
        RangeCode::FiveDays => 8,
        RangeCode::OneMonth | RangeCode::ThreeMonths | RangeCode::SixMonths => 10,
        _ => 12,
    }
}

/// 6 divisions, or `len / 3` (at least 3) for series up to 30 points.
pub fn split_number(len: usize) -> usize {
    if len <= DENSE_SPLIT_MAX_POINTS {
        (len / 3).max(MIN_SPLIT_NUMBER)
    } else {
        DEFAULT_SPLIT_NUMBER
    }
}

/// Turns a payload into image (or other) bytes.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, payload: &ChartPayload) -> Result<Vec<u8>>;

    /// MIME type of the rendered bytes.
    fn content_type(&self) -> &'static str;
}

/// Emits the payload itself as pretty JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRenderer;

impl ChartRenderer for JsonRenderer {
    fn render(&self, payload: &ChartPayload) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(payload)?)
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}
