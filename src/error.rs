//! Error types for the market-data and backtest pipeline.

use thiserror::Error;

/// Main error type for the pipeline.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid window format: {0} (use format like 1d, 1w, 1m, 1y)")]
    InvalidWindow(String),

    #[error("{host} returned 429: Too Many Requests")]
    RateLimited { host: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{host} returned {status}: {preview}")]
    UpstreamStatus {
        host: String,
        status: u16,
        preview: String,
    },

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("No data for {0}")]
    NoData(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Alignment error: {0}")]
    AlignmentError(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("failed to fetch {symbol}: {source}")]
    FetchFailed {
        symbol: String,
        #[source]
        source: Box<BacktestError>,
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Coarse classification used to decide how an error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad user input. Reported verbatim, never retried.
    InvalidInput,
    /// Network, rate-limit or malformed-body failures. Retried with backoff.
    UpstreamTransient,
    /// NaN/Inf/negative values or broken alignment. Fatal for the request.
    DataIntegrity,
    /// Too few points or returns to compute a result.
    InsufficientData,
    /// Configuration, IO, rendering and cancellation.
    Internal,
}

impl BacktestError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::InvalidWindow(_) => ErrorKind::InvalidInput,
            Self::RateLimited { .. }
            | Self::Transport(_)
            | Self::UpstreamStatus { .. }
            | Self::SchemaError(_) => ErrorKind::UpstreamTransient,
            Self::DataIntegrity(_) | Self::AlignmentError(_) => ErrorKind::DataIntegrity,
            Self::NoData(_) | Self::InsufficientData(_) => ErrorKind::InsufficientData,
            Self::FetchFailed { source, .. } => source.kind(),
            Self::Cancelled
            | Self::ConfigError(_)
            | Self::RenderError(_)
            | Self::IoError(_)
            | Self::JsonError(_)
            | Self::TomlError(_) => ErrorKind::Internal,
        }
    }

    /// Whether another attempt (or another host) might succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::UpstreamTransient
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, BacktestError>;
