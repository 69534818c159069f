//! Market-data provider client.
//!
//! Fetches close-price series over HTTP from two equivalent hosts. The
//! primary `chart` endpoint is tried first across every host with backoff
//! between rounds. If it never succeeds, the reduced `spark` endpoint is tried
//! the same way. Whichever answers, the series is cleaned before it is
//! returned.

use crate::clean::clean_series;
use crate::error::{BacktestError, Result};
use crate::retry::{with_fallback, with_retry, RetryPolicy};
use crate::types::PriceSeries;
use crate::window::{Interval, RangeCode};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_HOSTS: [&str; 2] = [
    "https://query1.finance.yahoo.com",
    "https://query2.finance.yahoo.com",
];

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";

const ACCEPT_VALUE: &str = "application/json, text/javascript, */*; q=0.01";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";

/// Banner some edge nodes return instead of a 429 status.
const RATE_LIMIT_BANNER: &str = "Edge: Too Many Requests";

const PREVIEW_CHARS: usize = 120;

/// Anything that can produce a price series for a symbol.
#[async_trait]
pub trait SeriesSource: Send + Sync {
    async fn fetch(&self, symbol: &str, interval: Interval, range: RangeCode) -> Result<PriceSeries>;
}

/// Provider client settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URLs tried in order, e.g. `https://query1.finance.yahoo.com`.
    pub hosts: Vec<String>,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            hosts: DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Which endpoint shape a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Chart,
    Spark,
}

impl Schema {
    fn url(&self, base: &str, symbol: &str, interval: Interval, range: RangeCode) -> String {
        let base = base.trim_end_matches('/');
        match self {
            Schema::Chart => format!(
                "{}/v8/finance/chart/{}?range={}&interval={}&includePrePost=true&events=div,splits",
                base, symbol, range, interval
            ),
            Schema::Spark => format!(
                "{}/v7/finance/spark?symbols={}&range={}&interval={}",
                base,
                symbol.to_uppercase(),
                range,
                interval
            ),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Schema::Chart => "chart",
            Schema::Spark => "spark",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub chart: ChartBody,
}

#[derive(Debug, Deserialize)]
pub struct ChartBody {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub timestamp: Vec<i64>,
    #[serde(default)]
    pub indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct SparkResponse {
    pub spark: SparkBody,
}

#[derive(Debug, Deserialize)]
pub struct SparkBody {
    #[serde(default)]
    pub result: Option<Vec<SparkResult>>,
}

#[derive(Debug, Deserialize)]
pub struct SparkResult {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub response: Vec<SparkSeries>,
}

#[derive(Debug, Deserialize)]
pub struct SparkSeries {
    #[serde(default)]
    pub timestamp: Vec<i64>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
}

/// A decoded body from either endpoint.
#[derive(Debug)]
pub enum ProviderPayload {
    Chart(ChartResponse),
    Spark(SparkResponse),
}

impl ProviderPayload {
    /// Decode a body of the given schema.
    pub fn parse(schema: Schema, body: &str) -> Result<Self> {
        let parsed = match schema {
            Schema::Chart => serde_json::from_str(body).map(ProviderPayload::Chart),
            Schema::Spark => serde_json::from_str(body).map(ProviderPayload::Spark),
        };
        parsed.map_err(|e| {
            BacktestError::SchemaError(format!(
                "failed to parse {} json: {}; body: {}",
                schema.name(),
                e,
                preview(body)
            ))
        })
    }

    /// Adapt either shape into a [`PriceSeries`].
    ///
    /// Null closes become `0.0`. A payload with no series is [`BacktestError::NoData`].
    pub fn into_series(self, symbol: &str) -> Result<PriceSeries> {
        let (timestamps, closes) = match self {
            ProviderPayload::Chart(resp) => {
                let first = resp
                    .chart
                    .result
                    .and_then(|results| results.into_iter().next())
                    .and_then(|result| {
                        let ts = result.timestamp;
                        result.indicators.quote.into_iter().next().map(|q| (ts, q.close))
                    });
                match first {
                    Some(pair) => pair,
                    None => return Err(BacktestError::NoData(symbol.to_string())),
                }
            }
            ProviderPayload::Spark(resp) => {
                let first = resp
                    .spark
                    .result
                    .and_then(|results| results.into_iter().next())
                    .and_then(|result| result.response.into_iter().next())
                    .map(|series| (series.timestamp, series.close));
                match first {
                    Some(pair) => pair,
                    None => return Err(BacktestError::NoData(symbol.to_string())),
                }
            }
        };

        let closes = closes.into_iter().map(|c| c.unwrap_or(0.0)).collect();
        Ok(PriceSeries::new(symbol, timestamps, closes))
    }
}

fn preview(body: &str) -> String {
    body.chars().take(PREVIEW_CHARS).collect()
}

/// HTTP client for the provider.
pub struct ProviderClient {
    http: Client,
    config: ProviderConfig,
    cancel: CancellationToken,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.hosts.is_empty() {
            return Err(BacktestError::ConfigError(
                "provider needs at least one host".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BacktestError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Abort pending backoffs when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// One request against one host. Any failure here is worth trying on
    /// another host, except an empty payload.
    async fn request_once(
        &self,
        schema: Schema,
        host: &str,
        symbol: &str,
        interval: Interval,
        range: RangeCode,
    ) -> Result<PriceSeries> {
        let url = schema.url(host, symbol, interval, range);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header(USER_AGENT, self.config.user_agent.as_str())
            .header(ACCEPT, ACCEPT_VALUE)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .header(
                REFERER,
                format!("https://finance.yahoo.com/quote/{}/chart", symbol.to_uppercase()),
            )
            .send()
            .await
            .map_err(|e| BacktestError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BacktestError::Transport(format!("failed to read response: {}", e)))?;

        if status == StatusCode::TOO_MANY_REQUESTS || body.starts_with(RATE_LIMIT_BANNER) {
            return Err(BacktestError::RateLimited {
                host: host.to_string(),
            });
        }

        if status != StatusCode::OK {
            return Err(BacktestError::UpstreamStatus {
                host: host.to_string(),
                status: status.as_u16(),
                preview: preview(&body),
            });
        }

        if body.starts_with('<') || body.starts_with("Edge:") {
            return Err(BacktestError::SchemaError(format!(
                "non-json body from {}: {}",
                host,
                preview(&body)
            )));
        }

        ProviderPayload::parse(schema, &body)?.into_series(symbol)
    }

    /// Try every host once, returning the first success or the last error.
    async fn host_round(
        &self,
        schema: Schema,
        symbol: &str,
        interval: Interval,
        range: RangeCode,
    ) -> Result<PriceSeries> {
        let mut last_err = None;

        for host in &self.config.hosts {
            match self.request_once(schema, host, symbol, interval, range).await {
                Ok(series) => return Ok(series),
                Err(e) if e.is_retryable() => {
                    warn!("{} request for {} via {} failed: {}", schema.name(), symbol, host, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            BacktestError::ConfigError("provider needs at least one host".to_string())
        }))
    }

    async fn fetch_schema(
        &self,
        schema: Schema,
        symbol: &str,
        interval: Interval,
        range: RangeCode,
    ) -> Result<PriceSeries> {
        with_retry(&self.config.retry, &self.cancel, move |_| {
            self.host_round(schema, symbol, interval, range)
        })
        .await
    }
}

#[async_trait]
impl SeriesSource for ProviderClient {
    async fn fetch(&self, symbol: &str, interval: Interval, range: RangeCode) -> Result<PriceSeries> {
        let raw = with_fallback(
            self.fetch_schema(Schema::Chart, symbol, interval, range),
            || self.fetch_schema(Schema::Spark, symbol, interval, range),
        )
        .await?;

        debug!("Fetched {} points for {} ({} {})", raw.len(), symbol, range, interval);
        Ok(clean_series(raw))
    }
}
