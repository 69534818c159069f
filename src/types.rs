//! Core data types for the pipeline.
//!
//! All of these are request-scoped values: built fresh for each backtest
//! request and dropped once the result has been rendered.

use crate::error::{BacktestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Close prices for one symbol, index-aligned with their Unix timestamps.
///
/// A close of `0.0` marks a missing observation; the negative-price filter keeps
/// it and alignment skips it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub timestamps: Vec<i64>,
    pub closes: Vec<f64>,
}

impl PriceSeries {
    /// Create a series, truncating both vectors to the shorter length so the
    /// pairs stay aligned.
    pub fn new(symbol: impl Into<String>, mut timestamps: Vec<i64>, mut closes: Vec<f64>) -> Self {
        let n = timestamps.len().min(closes.len());
        timestamps.truncate(n);
        closes.truncate(n);
        Self {
            symbol: symbol.into(),
            timestamps,
            closes,
        }
    }

    /// Build a series from `(timestamp, close)` pairs.
    pub fn from_points(symbol: impl Into<String>, points: impl IntoIterator<Item = (i64, f64)>) -> Self {
        let (timestamps, closes) = points.into_iter().unzip();
        Self {
            symbol: symbol.into(),
            timestamps,
            closes,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Iterate over `(timestamp, close)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.timestamps
            .iter()
            .copied()
            .zip(self.closes.iter().copied())
    }

    /// Keep only the points for which `keep` returns true.
    pub fn retain_points(&self, mut keep: impl FnMut(i64, f64) -> bool) -> Self {
        Self::from_points(
            self.symbol.clone(),
            self.points().filter(|&(ts, close)| keep(ts, close)),
        )
    }
}

/// A position in the portfolio as a fraction of initial capital.
///
/// Positive weights are long, negative weights are short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedAsset {
    pub symbol: String,
    pub weight: f64,
}

impl WeightedAsset {
    pub fn new(symbol: impl Into<String>, weight: f64) -> Self {
        Self {
            symbol: symbol.into(),
            weight,
        }
    }

    pub fn is_short(&self) -> bool {
        self.weight < 0.0
    }
}

/// Static allocation realized once at the first aligned timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub assets: Vec<WeightedAsset>,
    /// `1.0 - sum(weights)`. Negative means margin.
    pub cash_weight: f64,
    pub initial_value: f64,
}

impl PortfolioConfig {
    /// Create a config whose cash weight absorbs whatever the assets leave.
    pub fn new(assets: Vec<WeightedAsset>, initial_value: f64) -> Self {
        let net: f64 = assets.iter().map(|a| a.weight).sum();
        Self {
            assets,
            cash_weight: 1.0 - net,
            initial_value,
        }
    }

    /// `1/N` in every symbol, no cash.
    pub fn equal_weight(symbols: &[String], initial_value: f64) -> Self {
        if symbols.is_empty() {
            return Self {
                assets: Vec::new(),
                cash_weight: 1.0,
                initial_value,
            };
        }

        let weight = 1.0 / symbols.len() as f64;
        Self {
            assets: symbols
                .iter()
                .map(|s| WeightedAsset::new(s.clone(), weight))
                .collect(),
            cash_weight: 0.0,
            initial_value,
        }
    }

    /// Sum of absolute weights.
    pub fn gross_exposure(&self) -> f64 {
        self.assets.iter().map(|a| a.weight.abs()).sum()
    }

    /// Sum of signed weights.
    pub fn net_exposure(&self) -> f64 {
        self.assets.iter().map(|a| a.weight).sum()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.symbol.clone()).collect()
    }
}

/// A single unified timeline with one gap-free price vector per asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTimeline {
    times: Vec<DateTime<Utc>>,
    symbols: Vec<String>,
    prices: HashMap<String, Vec<f64>>,
}

impl AlignedTimeline {
    /// Build a timeline, rejecting any vector whose length differs from `times`.
    pub fn new(times: Vec<DateTime<Utc>>, series: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let mut symbols = Vec::with_capacity(series.len());
        let mut prices = HashMap::with_capacity(series.len());

        for (symbol, values) in series {
            if values.len() != times.len() {
                return Err(BacktestError::AlignmentError(format!(
                    "price alignment failed for asset {}: got {} prices, expected {}",
                    symbol,
                    values.len(),
                    times.len()
                )));
            }
            if prices.insert(symbol.clone(), values).is_some() {
                return Err(BacktestError::AlignmentError(format!(
                    "duplicate asset in timeline: {}",
                    symbol
                )));
            }
            symbols.push(symbol);
        }

        Ok(Self {
            times,
            symbols,
            prices,
        })
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    /// Symbols in input order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Price vector for a symbol.
    pub fn prices(&self, symbol: &str) -> Option<&[f64]> {
        self.prices.get(symbol).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn num_assets(&self) -> usize {
        self.symbols.len()
    }
}

/// Shares held in one asset for the whole backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub weight: f64,
    /// Negative for short positions.
    pub shares: f64,
    pub entry_price: f64,
}

impl Holding {
    /// Position value at a given price.
    pub fn value_at(&self, price: f64) -> f64 {
        self.shares * price
    }
}

/// Daily portfolio trajectory produced by the backtest engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioData {
    pub timestamps: Vec<DateTime<Utc>>,
    /// `values[0]` is the initial value.
    pub values: Vec<f64>,
    /// Simple day-over-day returns, one fewer than `values`.
    pub returns: Vec<f64>,
    pub holdings: Vec<Holding>,
    /// Constant cash (or margin, when negative) balance.
    pub cash_value: f64,
}

impl PortfolioData {
    /// Shares held in a symbol.
    pub fn shares(&self, symbol: &str) -> Option<f64> {
        self.holdings
            .iter()
            .find(|h| h.symbol == symbol)
            .map(|h| h.shares)
    }

    pub fn initial_value(&self) -> Option<f64> {
        self.values.first().copied()
    }

    pub fn final_value(&self) -> Option<f64> {
        self.values.last().copied()
    }
}
