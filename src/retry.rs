//! Retry with fixed backoff, and a secondary-source fallback.

use crate::error::{BacktestError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fixed backoff schedule.
///
/// The first attempt runs immediately; each entry in `backoffs` is the pause
/// before the next attempt, so there are `backoffs.len() + 1` attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoffs: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(backoffs: Vec<Duration>) -> Self {
        Self { backoffs }
    }

    /// Build a policy from millisecond values.
    pub fn from_millis(backoffs: &[u64]) -> Self {
        Self::new(backoffs.iter().copied().map(Duration::from_millis).collect())
    }

    /// A single attempt with no retries.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    pub fn max_attempts(&self) -> usize {
        self.backoffs.len() + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(&[200, 500, 1000])
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// schedule is exhausted. The last error is returned on exhaustion.
///
/// `op` receives the zero-based attempt number. Cancelling `cancel` aborts a
/// pending backoff with [`BacktestError::Cancelled`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(BacktestError::Cancelled);
        }

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retryable() || attempt + 1 >= attempts {
            return Err(err);
        }

        let backoff = policy.backoffs[attempt];
        debug!(
            "Attempt {}/{} failed: {}, retrying in {:?}",
            attempt + 1,
            attempts,
            err,
            backoff
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(BacktestError::Cancelled),
            _ = tokio::time::sleep(backoff) => {}
        }
        attempt += 1;
    }
}

/// Try `primary`; on a retryable failure try `secondary`.
///
/// If both fail the secondary's error, the last one seen, is returned.
/// Non-retryable primary errors are returned as-is.
pub async fn with_fallback<T, P, S, SFut>(primary: P, secondary: S) -> Result<T>
where
    P: Future<Output = Result<T>>,
    S: FnOnce() -> SFut,
    SFut: Future<Output = Result<T>>,
{
    let primary_err = match primary.await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if !primary_err.is_retryable() {
        return Err(primary_err);
    }

    warn!("Primary source failed: {}, trying fallback", primary_err);
    secondary().await.map_err(|secondary_err| {
        warn!("Fallback source failed: {}", secondary_err);
        secondary_err
    })
}
