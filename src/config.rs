//! Configuration file support.
//!
//! Provider, cache and backtest settings load from a TOML file. Every field
//! has a default, so an empty file (or no file) is a valid configuration.

use crate::cache::{ArtifactCache, NoopCache, TtlCache};
use crate::error::{BacktestError, Result};
use crate::pipeline::ServiceSettings;
use crate::provider::{ProviderConfig, DEFAULT_HOSTS, DEFAULT_USER_AGENT};
use crate::retry::RetryPolicy;
use crate::window::Interval;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Complete configuration loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartfolioConfig {
    /// Market-data provider settings.
    #[serde(default)]
    pub provider: ProviderSettings,
    /// Artifact cache settings.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Backtest settings.
    #[serde(default)]
    pub backtest: BacktestSettings,
}

/// Market-data provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Base URLs tried in order.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Pauses between retry rounds. Attempts = len + 1.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
    /// Pause between symbols within one request.
    #[serde(default = "default_symbol_delay_ms")]
    pub symbol_delay_ms: u64,
}

fn default_hosts() -> Vec<String> {
    DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect()
}
fn default_user_agent() -> String { DEFAULT_USER_AGENT.to_string() }
fn default_request_timeout_ms() -> u64 { 10_000 }
fn default_backoff_ms() -> Vec<u64> { vec![200, 500, 1000] }
fn default_symbol_delay_ms() -> u64 { 100 }

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            user_agent: default_user_agent(),
            request_timeout_ms: default_request_timeout_ms(),
            backoff_ms: default_backoff_ms(),
            symbol_delay_ms: default_symbol_delay_ms(),
        }
    }
}

/// Artifact cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entry lifetime in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_true() -> bool { true }
fn default_ttl_secs() -> u64 { 60 }

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Backtest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSettings {
    /// Starting portfolio value.
    #[serde(default = "default_initial_value")]
    pub initial_value: f64,
    /// Bar interval: 1m, 5m, 15m, 1h or 1d.
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_initial_value() -> f64 { 100.0 }
fn default_interval() -> String { "1d".to_string() }

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_value: default_initial_value(),
            interval: default_interval(),
        }
    }
}

impl ChartfolioConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: ChartfolioConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BacktestError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        if self.provider.hosts.is_empty() {
            return Err(BacktestError::ConfigError(
                "provider.hosts must list at least one host".to_string(),
            ));
        }
        if self.provider.request_timeout_ms == 0 {
            return Err(BacktestError::ConfigError(
                "provider.request_timeout_ms must be positive".to_string(),
            ));
        }
        if !self.backtest.initial_value.is_finite() || self.backtest.initial_value <= 0.0 {
            return Err(BacktestError::ConfigError(format!(
                "backtest.initial_value must be positive, got {}",
                self.backtest.initial_value
            )));
        }
        self.interval()?;
        Ok(())
    }

    pub fn interval(&self) -> Result<Interval> {
        self.backtest
            .interval
            .parse::<Interval>()
            .map_err(|e| BacktestError::ConfigError(e.to_string()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(&self.provider.backoff_ms)
    }

    /// Convert to the provider client's settings.
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            hosts: self.provider.hosts.clone(),
            user_agent: self.provider.user_agent.clone(),
            request_timeout: Duration::from_millis(self.provider.request_timeout_ms),
            retry: self.retry_policy(),
        }
    }

    /// Convert to the backtest service's settings.
    pub fn to_service_settings(&self) -> Result<ServiceSettings> {
        Ok(ServiceSettings {
            initial_value: self.backtest.initial_value,
            interval: self.interval()?,
            symbol_delay: Duration::from_millis(self.provider.symbol_delay_ms),
        })
    }

    /// Build the configured artifact cache.
    pub fn build_cache(&self) -> Arc<dyn ArtifactCache> {
        if self.cache.enabled {
            Arc::new(TtlCache::new(Duration::from_secs(self.cache.ttl_secs)))
        } else {
            Arc::new(NoopCache)
        }
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# Chartfolio configuration file

[provider]
hosts = ["https://query1.finance.yahoo.com", "https://query2.finance.yahoo.com"]
request_timeout_ms = 10000
backoff_ms = [200, 500, 1000]   # 4 attempts per endpoint
symbol_delay_ms = 100
# user_agent = "Mozilla/5.0 ..."

[cache]
enabled = true
ttl_secs = 60

[backtest]
initial_value = 100.0
interval = "1d"                 # 1m, 5m, 15m, 1h, 1d
"#
        .to_string()
    }
}
