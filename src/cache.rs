//! Short-lived cache for rendered artifacts.
//!
//! Entries expire by wall-clock TTL. Expired entries are treated as misses
//! and overwritten on the next write; nothing sweeps them in the background.

use crate::types::WeightedAsset;
use crate::window::LookbackWindow;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Key/value store for rendered bytes.
pub trait ArtifactCache: Send + Sync {
    /// A copy of a live entry, or `None` if absent or expired.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Insert or replace an entry, resetting its TTL.
    fn set(&self, key: &str, value: Vec<u8>);
}

struct Entry {
    value: Vec<u8>,
    stored_at: Instant,
}

/// In-memory TTL cache guarded by a single lock.
pub struct TtlCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ArtifactCache for TtlCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }
}

/// Cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl ArtifactCache for NoopCache {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _value: Vec<u8>) {}
}

/// `portfolio-{SYM1,SYM2}-{range}-{days}`
pub fn equal_weight_key(symbols: &[String], window: &LookbackWindow) -> String {
    format!(
        "portfolio-{}-{}-{}",
        symbols.join(","),
        window.range,
        window.target_days
    )
}

/// `wport-{SYM1,SYM2}-{w1,w2}-{range}-{days}`.
///
/// Weights use the shortest exact float form, so `0.6` and `0.60` share an
/// entry but `0.6001` and `0.6004` do not.
pub fn weighted_key(assets: &[WeightedAsset], window: &LookbackWindow) -> String {
    let symbols: Vec<&str> = assets.iter().map(|a| a.symbol.as_str()).collect();
    let weights: Vec<String> = assets.iter().map(|a| a.weight.to_string()).collect();
    format!(
        "wport-{}-{}-{}-{}",
        symbols.join(","),
        weights.join(","),
        window.range,
        window.target_days
    )
}
