//! Cache adapter trait and statistics.
//!
//! This module defines the capability every cache backend must provide to
//! sit in front of strata's read paths.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use strata_core::StrataResult;

/// Cache adapter trait for pluggable cache implementations.
///
/// This trait abstracts over the in-process expiring map and external
/// network caches. Implementations must be thread-safe and support
/// concurrent access.
///
/// # Misses and failures
///
/// A miss is `Ok(None)`, never an error. Backend failures are returned as
/// errors and must not be disguised as misses.
///
/// # Expiry
///
/// A `ttl` of zero stores the entry without expiry. Expired entries only
/// need to disappear from reads; no background sweep is required.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Prepare the backend for use.
    async fn init(&self) -> StrataResult<()>;

    /// Whether a live entry exists for `key`.
    async fn has(&self, key: &str) -> StrataResult<bool>;

    /// Get a live entry.
    async fn get(&self, key: &str) -> StrataResult<Option<Value>>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> StrataResult<()>;

    /// Remove an entry. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StrataResult<()>;

    /// Release the backend.
    async fn close(&self) -> StrataResult<()>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently held, expired-but-unread ones included.
    pub entry_count: u64,
    /// Number of entries dropped because they expired.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
