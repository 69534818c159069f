//! Static buy-and-hold portfolio backtest.
//!
//! Weights are realized once at the first aligned timestamp: each asset gets
//! `initial_value * weight / first_price` shares (negative for shorts) and the
//! rest sits in a constant cash balance. Nothing is rebalanced afterwards.

use crate::error::{BacktestError, Result};
use crate::types::{AlignedTimeline, Holding, PortfolioConfig, PortfolioData};
use tracing::debug;

/// Runs a [`PortfolioConfig`] over an [`AlignedTimeline`].
#[derive(Debug, Clone)]
pub struct PortfolioEngine {
    config: PortfolioConfig,
}

impl PortfolioEngine {
    pub fn new(config: PortfolioConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    /// Simulate the portfolio over every timestamp in `timeline`.
    pub fn run(&self, timeline: &AlignedTimeline) -> Result<PortfolioData> {
        let initial_value = self.config.initial_value;
        if !initial_value.is_finite() || initial_value <= 0.0 {
            return Err(BacktestError::InvalidInput(format!(
                "initial value must be positive and finite, got {}",
                initial_value
            )));
        }

        let num_days = timeline.len();
        if num_days < 2 {
            return Err(BacktestError::InsufficientData(format!(
                "need at least 2 data points for portfolio calculation, got {}",
                num_days
            )));
        }

        let mut price_rows = Vec::with_capacity(self.config.assets.len());
        let mut holdings = Vec::with_capacity(self.config.assets.len());

        for asset in &self.config.assets {
            let prices = timeline.prices(&asset.symbol).ok_or_else(|| {
                BacktestError::DataIntegrity(format!("no price data for asset {}", asset.symbol))
            })?;
            if prices.len() != num_days {
                return Err(BacktestError::DataIntegrity(format!(
                    "asset {} has {} data points, expected {}",
                    asset.symbol,
                    prices.len(),
                    num_days
                )));
            }

            let entry_price = prices[0];
            if !entry_price.is_finite() || entry_price <= 0.0 {
                return Err(BacktestError::DataIntegrity(format!(
                    "invalid initial price for asset {}: {}",
                    asset.symbol, entry_price
                )));
            }

            let shares = initial_value * asset.weight / entry_price;
            if !shares.is_finite() {
                return Err(BacktestError::DataIntegrity(format!(
                    "invalid share calculation for asset {}: {}",
                    asset.symbol, shares
                )));
            }

            holdings.push(Holding {
                symbol: asset.symbol.clone(),
                weight: asset.weight,
                shares,
                entry_price,
            });
            price_rows.push(prices);
        }

        let cash_value = initial_value * self.config.cash_weight;
        if !cash_value.is_finite() {
            return Err(BacktestError::DataIntegrity(format!(
                "invalid cash value: {}",
                cash_value
            )));
        }

        let mut values = Vec::with_capacity(num_days);
        let mut returns = Vec::with_capacity(num_days - 1);
        values.push(initial_value);

        for day in 1..num_days {
            let mut value = cash_value;
            for (holding, prices) in holdings.iter().zip(&price_rows) {
                let price = prices[day];
                if !price.is_finite() || price < 0.0 {
                    return Err(BacktestError::DataIntegrity(format!(
                        "invalid price for asset {} on day {}: {}",
                        holding.symbol, day, price
                    )));
                }
                value += holding.value_at(price);
            }

            if !value.is_finite() {
                return Err(BacktestError::DataIntegrity(format!(
                    "invalid portfolio value on day {}: {}",
                    day, value
                )));
            }

            let prev = values[day - 1];
            let daily_return = if prev > 0.0 { (value - prev) / prev } else { 0.0 };
            if !daily_return.is_finite() {
                return Err(BacktestError::DataIntegrity(format!(
                    "invalid daily return on day {}: {}",
                    day, daily_return
                )));
            }

            values.push(value);
            returns.push(daily_return);
        }

        debug!(
            "Backtested {} assets over {} days: {:.2} -> {:.2}",
            holdings.len(),
            num_days,
            initial_value,
            values[num_days - 1]
        );

        Ok(PortfolioData {
            timestamps: timeline.times().to_vec(),
            values,
            returns,
            holdings,
            cash_value,
        })
    }
}
