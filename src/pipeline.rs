//! End-to-end backtest and chart requests.
//!
//! A backtest runs validate → resolve window → fetch (sequential, with a
//! small delay between symbols) → trim → align → backtest → stats. The
//! render variants wrap that in the artifact cache.
//!
//! Chart requests skip the backtest: they normalize the interval and window,
//! fetch, tail-align and hand back a [`ChartPayload`].

use crate::align::{align_series, align_tail};
use crate::analytics::PortfolioStats;
use crate::cache::{equal_weight_key, weighted_key, ArtifactCache};
use crate::chart::{equal_weight_title, weighted_title, ChartPayload, ChartRenderer, IndexBase};
use crate::error::{BacktestError, Result};
use crate::parser::{normalize_symbols, parse_weighted_portfolio, EqualWeightRequest, WeightedPortfolioSpec};
use crate::portfolio::PortfolioEngine;
use crate::provider::SeriesSource;
use crate::types::{AlignedTimeline, PortfolioConfig, PortfolioData, PriceSeries};
use crate::window::{normalize_interval_window, resolve_window, trim_to_span, Interval, LookbackWindow, RangeCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Knobs shared by every request a service handles.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub initial_value: f64,
    pub interval: Interval,
    /// Pause between consecutive symbol fetches.
    pub symbol_delay: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            initial_value: 100.0,
            interval: Interval::OneDay,
            symbol_delay: Duration::from_millis(100),
        }
    }
}

/// Everything produced by one backtest request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub title: String,
    /// Window token as the user gave it.
    pub window: String,
    pub lookback: LookbackWindow,
    pub config: PortfolioConfig,
    pub data: PortfolioData,
    pub stats: PortfolioStats,
}

impl BacktestReport {
    pub fn symbols(&self) -> Vec<String> {
        self.config.symbols()
    }

    /// Renderer payload for this report.
    pub fn chart_payload(&self) -> Result<ChartPayload> {
        ChartPayload::new(self.title.clone(), &self.data, &self.stats)
    }
}

/// Runs backtest requests against a series source.
pub struct BacktestService {
    source: Arc<dyn SeriesSource>,
    cache: Arc<dyn ArtifactCache>,
    renderer: Arc<dyn ChartRenderer>,
    settings: ServiceSettings,
    cancel: CancellationToken,
}

impl BacktestService {
    pub fn new(
        source: Arc<dyn SeriesSource>,
        cache: Arc<dyn ArtifactCache>,
        renderer: Arc<dyn ChartRenderer>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            source,
            cache,
            renderer,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort between symbol fetches once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Fetch and trim every symbol in order. The first failure aborts the
    /// whole request.
    pub async fn fetch_assets(
        &self,
        symbols: &[String],
        window: &LookbackWindow,
    ) -> Result<Vec<PriceSeries>> {
        let fetched = self
            .fetch_each(symbols, self.settings.interval, window.range)
            .await?;
        Ok(fetched
            .into_iter()
            .map(|series| trim_to_span(series, window.target_days))
            .collect())
    }

    async fn fetch_each(
        &self,
        symbols: &[String],
        interval: Interval,
        range: RangeCode,
    ) -> Result<Vec<PriceSeries>> {
        let mut assets = Vec::with_capacity(symbols.len());

        for (idx, symbol) in symbols.iter().enumerate() {
            if idx > 0 && !self.settings.symbol_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(BacktestError::Cancelled),
                    _ = tokio::time::sleep(self.settings.symbol_delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                return Err(BacktestError::Cancelled);
            }

            debug!("Fetching {}/{}: {}", idx + 1, symbols.len(), symbol);
            let series = self
                .source
                .fetch(symbol, interval, range)
                .await
                .and_then(|series| {
                    if series.is_empty() {
                        Err(BacktestError::NoData(symbol.clone()))
                    } else {
                        Ok(series)
                    }
                })
                .map_err(|e| BacktestError::FetchFailed {
                    symbol: symbol.clone(),
                    source: Box::new(e),
                })?;

            assets.push(series);
        }

        Ok(assets)
    }

    async fn run(
        &self,
        title: String,
        window: &str,
        lookback: LookbackWindow,
        config: PortfolioConfig,
    ) -> Result<BacktestReport> {
        let symbols = config.symbols();
        info!(
            "Backtesting {} over {} ({} days)",
            symbols.join(", "),
            lookback.range,
            lookback.target_days
        );

        let assets = self.fetch_assets(&symbols, &lookback).await?;
        let timeline = align_series(&assets)?;
        let data = PortfolioEngine::new(config.clone()).run(&timeline)?;
        let stats = PortfolioStats::from_portfolio(&data)?;

        info!("{}: {}", title, stats.summary_line());

        Ok(BacktestReport {
            title,
            window: window.to_string(),
            lookback,
            config,
            data,
            stats,
        })
    }

    /// Equal-weight, zero-cash backtest of `symbols`.
    pub async fn equal_weight<S: AsRef<str>>(&self, symbols: &[S], window: &str) -> Result<BacktestReport> {
        let request = EqualWeightRequest::new(symbols, window)?;
        let lookback = resolve_window(window)?;
        self.equal_weight_request(&request, lookback).await
    }

    async fn equal_weight_request(
        &self,
        request: &EqualWeightRequest,
        lookback: LookbackWindow,
    ) -> Result<BacktestReport> {
        let config = request.to_config(self.settings.initial_value);
        self.run(equal_weight_title(&request.symbols), &request.window, lookback, config)
            .await
    }

    /// Weighted backtest from a `SYM W ... WINDOW` string.
    pub async fn weighted(&self, input: &str) -> Result<BacktestReport> {
        let spec = parse_weighted_portfolio(input)?;
        self.weighted_spec(&spec).await
    }

    /// Weighted backtest from an already-parsed spec.
    pub async fn weighted_spec(&self, spec: &WeightedPortfolioSpec) -> Result<BacktestReport> {
        let lookback = resolve_window(&spec.window)?;
        let config = spec.to_config(self.settings.initial_value);
        self.run(weighted_title(&config), &spec.window, lookback, config).await
    }

    /// Rendered equal-weight chart, served from cache when fresh.
    pub async fn render_equal_weight<S: AsRef<str>>(&self, symbols: &[S], window: &str) -> Result<Vec<u8>> {
        let request = EqualWeightRequest::new(symbols, window)?;
        let lookback = resolve_window(window)?;
        let key = equal_weight_key(&request.symbols, &lookback);

        if let Some(bytes) = self.cache.get(&key) {
            debug!("Cache hit: {}", key);
            return Ok(bytes);
        }

        let report = self.equal_weight_request(&request, lookback).await?;
        self.render_and_store(&key, &report)
    }

    /// Rendered weighted chart, served from cache when fresh.
    pub async fn render_weighted(&self, input: &str) -> Result<Vec<u8>> {
        let spec = parse_weighted_portfolio(input)?;
        let lookback = resolve_window(&spec.window)?;
        let key = weighted_key(&spec.assets, &lookback);

        if let Some(bytes) = self.cache.get(&key) {
            debug!("Cache hit: {}", key);
            return Ok(bytes);
        }

        let report = self.weighted_spec(&spec).await?;
        self.render_and_store(&key, &report)
    }

    /// Render a finished report without touching the cache.
    pub fn render(&self, report: &BacktestReport) -> Result<Vec<u8>> {
        self.render_chart(&report.chart_payload()?)
    }

    /// Render any chart payload.
    pub fn render_chart(&self, payload: &ChartPayload) -> Result<Vec<u8>> {
        self.renderer.render(payload)
    }

    async fn fetch_tail_aligned<S: AsRef<str>>(
        &self,
        symbols: &[S],
        interval: &str,
        window: &str,
    ) -> Result<(AlignedTimeline, Interval, RangeCode)> {
        let symbols = normalize_symbols(symbols)?;
        let (interval, range) = normalize_interval_window(interval, window);
        info!("Charting {} at {} over {}", symbols.join(", "), interval, range);

        let series = self.fetch_each(&symbols, interval, range).await?;
        Ok((align_tail(&series)?, interval, range))
    }

    /// Price chart of one symbol at any supported interval.
    pub async fn chart_symbol(&self, symbol: &str, interval: &str, window: &str) -> Result<ChartPayload> {
        let (timeline, interval, range) = self.fetch_tail_aligned(&[symbol], interval, window).await?;
        ChartPayload::price(&timeline, interval, range)
    }

    /// Several symbols on one chart, as prices for two or fewer and as
    /// percent change beyond that.
    pub async fn chart_comparison<S: AsRef<str>>(
        &self,
        symbols: &[S],
        interval: &str,
        window: &str,
    ) -> Result<ChartPayload> {
        let (timeline, interval, range) = self.fetch_tail_aligned(symbols, interval, window).await?;
        ChartPayload::comparison(&timeline, interval, range)
    }

    /// Several symbols indexed to a common starting value.
    pub async fn chart_indexed<S: AsRef<str>>(
        &self,
        symbols: &[S],
        interval: &str,
        window: &str,
        base: IndexBase,
    ) -> Result<ChartPayload> {
        let (timeline, interval, range) = self.fetch_tail_aligned(symbols, interval, window).await?;
        ChartPayload::indexed(&timeline, interval, range, base)
    }

    fn render_and_store(&self, key: &str, report: &BacktestReport) -> Result<Vec<u8>> {
        let bytes = self.render(report)?;
        self.cache.set(key, bytes.clone());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopCache;
    use crate::chart::JsonRenderer;
    use async_trait::async_trait;

    struct EmptySource;

    #[async_trait]
    impl SeriesSource for EmptySource {
        async fn fetch(&self, symbol: &str, _: Interval, _: RangeCode) -> Result<PriceSeries> {
            Ok(PriceSeries::new(symbol, vec![], vec![]))
        }
    }

    fn service() -> BacktestService {
        BacktestService::new(
            Arc::new(EmptySource),
            Arc::new(NoopCache),
            Arc::new(JsonRenderer),
            ServiceSettings {
                symbol_delay: Duration::ZERO,
                ..ServiceSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn test_empty_series_is_fetch_failure() {
        let err = service().equal_weight(&["SPY"], "1m").await.unwrap_err();
        match err {
            BacktestError::FetchFailed { symbol, source } => {
                assert_eq!(symbol, "SPY");
                assert!(matches!(*source, BacktestError::NoData(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_window_rejected_before_fetch() {
        let err = service().equal_weight(&["SPY"], "3q").await.unwrap_err();
        assert!(matches!(err, BacktestError::InvalidWindow(_)));
    }

    #[tokio::test]
    async fn test_blank_chart_symbol_rejected_before_fetch() {
        let err = service().chart_symbol("  ", "1d", "1y").await.unwrap_err();
        assert!(matches!(err, BacktestError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_chart_series_is_fetch_failure() {
        let err = service().chart_comparison(&["SPY", "QQQ"], "5m", "").await.unwrap_err();
        assert!(matches!(err, BacktestError::FetchFailed { ref symbol, .. } if symbol == "SPY"));
    }

    #[tokio::test]
    async fn test_cancelled_service() {
        let token = CancellationToken::new();
        token.cancel();
        let svc = service().with_cancellation(token);
        let err = svc.weighted("SPY 0.5 AAPL 0.5 1y").await.unwrap_err();
        assert!(matches!(err, BacktestError::Cancelled));
    }
}
