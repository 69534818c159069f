//! Chartfolio - buy-and-hold portfolio backtests on live market data.
//!
//! # Overview
//!
//! Chartfolio fetches daily or intraday closes for a set of symbols, cleans
//! and aligns them onto a common timeline, then simulates a static
//! buy-and-hold portfolio:
//!
//! - **Resilient fetching**: host failover, retry with backoff, and a
//!   fallback to a second response schema
//! - **Cleaning**: negative prices dropped, IQR outlier filter with a safety
//!   revert
//! - **Alignment**: every asset sampled on the shortest series' timestamps
//! - **Weighted portfolios**: longs, shorts, residual cash or margin
//! - **Analytics**: total and annualized return, volatility, Sharpe, max
//!   drawdown
//! - **Caching**: rendered chart payloads kept for a short TTL
//! - **Charts**: single-symbol, multi-symbol and indexed comparison payloads
//!   at any supported bar interval
//!
//! # Quick Start
//!
//! ```no_run
//! use chartfolio::{
//!     cache::TtlCache,
//!     chart::JsonRenderer,
//!     pipeline::{BacktestService, ServiceSettings},
//!     provider::{ProviderClient, ProviderConfig},
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> chartfolio::Result<()> {
//! let client = ProviderClient::new(ProviderConfig::default())?;
//! let service = BacktestService::new(
//!     Arc::new(client),
//!     Arc::new(TtlCache::default()),
//!     Arc::new(JsonRenderer),
//!     ServiceSettings::default(),
//! );
//!
//! let report = service.weighted("SPY 0.6 TSLA -0.2 1y").await?;
//! println!("{}", report.stats.summary_line());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`types`]: Price series, portfolio configuration, aligned timelines
//! - [`window`]: Window tokens, range codes, intervals
//! - [`provider`]: HTTP client for the chart and spark endpoints
//! - [`retry`]: Backoff policy and schema fallback
//! - [`clean`]: Price filters
//! - [`align`]: Timeline alignment
//! - [`portfolio`]: Buy-and-hold engine
//! - [`analytics`]: Performance statistics and reporting
//! - [`parser`]: Portfolio request parsing
//! - [`cache`]: TTL artifact cache
//! - [`chart`]: Chart payloads and renderers
//! - [`pipeline`]: End-to-end request handling
//! - [`config`]: TOML configuration file support

pub mod align;
pub mod analytics;
pub mod cache;
pub mod chart;
pub mod clean;
pub mod config;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod portfolio;
pub mod provider;
pub mod retry;
pub mod types;
pub mod window;

// Re-exports for convenience
pub use align::{align_series, align_tail};
pub use analytics::{PortfolioStats, ResultFormatter};
pub use cache::{ArtifactCache, NoopCache, TtlCache};
pub use chart::{AxisRange, ChartLine, ChartPayload, ChartRenderer, IndexBase, JsonRenderer};
pub use config::ChartfolioConfig;
pub use error::{BacktestError, ErrorKind, Result};
pub use parser::{parse_weighted_portfolio, EqualWeightRequest, WeightedPortfolioSpec};
pub use pipeline::{BacktestReport, BacktestService, ServiceSettings};
pub use portfolio::PortfolioEngine;
pub use provider::{ProviderClient, ProviderConfig, SeriesSource};
pub use retry::RetryPolicy;
pub use types::{
    AlignedTimeline, Holding, PortfolioConfig, PortfolioData, PriceSeries, WeightedAsset,
};
pub use window::{normalize_interval_window, resolve_window, Interval, LookbackWindow, RangeCode};
