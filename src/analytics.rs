//! Performance statistics and result formatting.

use crate::chart::ChartPayload;
use crate::error::{BacktestError, Result};
use crate::pipeline::BacktestReport;
use crate::types::PortfolioData;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{builder::Builder, settings::Style};

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Summary statistics for a backtest. Percentages are scaled by 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub initial_value: f64,
    pub final_value: f64,
    pub total_return_pct: f64,
    pub annual_return_pct: f64,
    /// Annualized volatility of daily returns.
    pub volatility_pct: f64,
    /// Zero risk-free rate.
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    /// Number of portfolio values, including the initial one.
    pub num_days: usize,
}

impl PortfolioStats {
    /// Compute statistics from a backtest trajectory.
    ///
    /// Needs at least two values and two returns. Any statistic that comes
    /// out NaN or infinite is an error naming that statistic.
    pub fn from_portfolio(data: &PortfolioData) -> Result<Self> {
        let num_days = data.values.len();
        if num_days < 2 {
            return Err(BacktestError::InsufficientData(format!(
                "need at least 2 portfolio values, got {}",
                num_days
            )));
        }
        if data.returns.len() < 2 {
            return Err(BacktestError::InsufficientData(format!(
                "need at least 2 return observations for statistics, got {}",
                data.returns.len()
            )));
        }

        let initial = data.values[0];
        let final_value = data.values[num_days - 1];

        let total_return = (final_value - initial) / initial;

        let daily_vol = sample_std_dev(&data.returns);
        let years = data.returns.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annual_return = if years > 0.0 && final_value > 0.0 && initial > 0.0 {
            (final_value / initial).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let annual_vol = daily_vol * TRADING_DAYS_PER_YEAR.sqrt();
        let sharpe = if annual_vol > 0.0 {
            annual_return / annual_vol
        } else {
            0.0
        };

        let stats = Self {
            initial_value: initial,
            final_value,
            total_return_pct: total_return * 100.0,
            annual_return_pct: annual_return * 100.0,
            volatility_pct: annual_vol * 100.0,
            sharpe_ratio: sharpe,
            max_drawdown_pct: max_drawdown(&data.values) * 100.0,
            num_days,
        };
        stats.validate()?;
        Ok(stats)
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("total return", self.total_return_pct),
            ("annual return", self.annual_return_pct),
            ("volatility", self.volatility_pct),
            ("Sharpe ratio", self.sharpe_ratio),
            ("max drawdown", self.max_drawdown_pct),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(BacktestError::DataIntegrity(format!(
                    "invalid {}: {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// `Return: x% | Sharpe: y | Vol: z% | MaxDD: w%`
    pub fn summary_line(&self) -> String {
        format!(
            "Return: {:.2}% | Sharpe: {:.2} | Vol: {:.2}% | MaxDD: {:.2}%",
            self.total_return_pct, self.sharpe_ratio, self.volatility_pct, self.max_drawdown_pct
        )
    }
}

/// Sample standard deviation (N-1 denominator). Zero for fewer than 2 values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

/// Largest peak-to-trough decline as a fraction of the peak.
///
/// The running peak starts at the first strictly positive value. Negative
/// values are skipped. Returns 0 when no value is positive.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let Some(start) = values.iter().position(|&v| v > 0.0) else {
        return 0.0;
    };

    let mut peak = values[start];
    let mut max_dd = 0.0_f64;

    for &value in &values[start..] {
        if value > peak {
            peak = value;
        }
        if value >= 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }

    max_dd
}

/// First non-zero value, or 1 when there is none.
pub fn first_nonzero(values: &[f64]) -> f64 {
    values.iter().copied().find(|&v| v != 0.0).unwrap_or(1.0)
}

/// Percent change of each value from the series' first non-zero value.
pub fn percent_change(values: &[f64]) -> Vec<f64> {
    let base = first_nonzero(values);
    values.iter().map(|v| (v / base - 1.0) * 100.0).collect()
}

/// Each value relative to the first non-zero value, times `scale`.
pub fn rebase(values: &[f64], scale: f64) -> Vec<f64> {
    let base = first_nonzero(values);
    values.iter().map(|v| v / base * scale).collect()
}

/// Format results for terminal display.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print a full report to stdout.
    pub fn print_report(report: &BacktestReport) {
        let stats = &report.stats;

        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", format!(" {} ", report.title).bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Overview".bold().underline());
        println!("  Window:          {}", report.window);
        if let (Some(start), Some(end)) = (report.data.timestamps.first(), report.data.timestamps.last()) {
            println!(
                "  Period:          {} to {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            );
        }
        println!("  Data Points:     {}", stats.num_days);
        println!();

        println!("{}", "Composition".bold().underline());
        for holding in &report.data.holdings {
            let side = if holding.shares < 0.0 { " SHORT" } else { "" };
            println!(
                "  {:<16} {:>7.1}%{}  ({:.4} sh @ {:.2})",
                holding.symbol,
                holding.weight.abs() * 100.0,
                side,
                holding.shares,
                holding.entry_price
            );
        }
        if report.config.cash_weight.abs() > 1e-9 {
            let label = if report.config.cash_weight < 0.0 { "Margin" } else { "Cash" };
            println!(
                "  {:<16} {:>7.1}%",
                label,
                report.config.cash_weight.abs() * 100.0
            );
        }
        println!();

        println!("{}", "Performance".bold().underline());
        println!("  Initial Value:   ${:>12.2}", stats.initial_value);
        println!(
            "  Final Value:     ${:>12.2}  {}",
            stats.final_value,
            Self::format_pct_change(stats.total_return_pct)
        );
        println!("  Total Return:    {:>12.2}%", stats.total_return_pct);
        println!("  Annual Return:   {:>12.2}%", stats.annual_return_pct);
        println!();

        println!("{}", "Risk Metrics".bold().underline());
        println!("  Max Drawdown:    {:>12.2}%", -stats.max_drawdown_pct);
        println!("  Volatility:      {:>12.2}%", stats.volatility_pct);
        println!("  Sharpe Ratio:    {:>12.2}", stats.sharpe_ratio);
        println!();

        println!("{}", "═".repeat(60).blue());
    }

    fn format_pct_change(pct: f64) -> String {
        if pct >= 0.0 {
            format!("(+{:.2}%)", pct).green().to_string()
        } else {
            format!("({:.2}%)", pct).red().to_string()
        }
    }

    /// Render reports as a rounded table.
    pub fn table(reports: &[BacktestReport]) -> String {
        let mut builder = Builder::new();
        builder.push_record([
            "Portfolio", "Window", "Return %", "Annual %", "Vol %", "Sharpe", "Max DD %", "Days",
        ]);

        for report in reports {
            let stats = &report.stats;
            builder.push_record([
                report.title.clone(),
                report.window.clone(),
                format!("{:.2}", stats.total_return_pct),
                format!("{:.2}", stats.annual_return_pct),
                format!("{:.2}", stats.volatility_pct),
                format!("{:.2}", stats.sharpe_ratio),
                format!("{:.2}", -stats.max_drawdown_pct),
                stats.num_days.to_string(),
            ]);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Print a chart payload's lines with their first and last values.
    pub fn print_chart(payload: &ChartPayload) {
        println!();
        println!("{}", payload.title.bold().blue());
        if !payload.subtitle.is_empty() {
            println!("{}", payload.subtitle);
        }
        if let (Some(start), Some(end)) = (payload.x_labels.first(), payload.x_labels.last()) {
            println!("{} to {} ({} points)", start, end, payload.x_labels.len());
        }
        println!("{}", Self::chart_table(payload));
    }

    /// One row per chart line: first, last and change between them.
    pub fn chart_table(payload: &ChartPayload) -> String {
        let mut builder = Builder::new();
        builder.push_record(["Series", "First", "Last", "Change %"]);

        for line in &payload.series {
            let (Some(&first), Some(&last)) = (line.values.first(), line.values.last()) else {
                continue;
            };
            let change = if first != 0.0 {
                format!("{:+.2}", (last / first - 1.0) * 100.0)
            } else {
                "-".to_string()
            };
            builder.push_record([
                line.name.clone(),
                format!("{:.2}", first),
                format!("{:.2}", last),
                change,
            ]);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Export a report to JSON.
    pub fn to_json(report: &BacktestReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}
