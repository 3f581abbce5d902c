//! In-process cache adapter.
//!
//! A map of expiring entries. Expiry is lazy: an entry past its deadline is
//! dropped the next time it is read. Nothing bounds the map beyond that.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use strata_core::{StorageError, StrataResult};

use super::traits::{CacheAdapter, CacheStats};

/// A cached value and its deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    /// `None` means the entry never expires.
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    pub fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: (!ttl.is_zero()).then(|| Instant::now() + ttl),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// In-process [`CacheAdapter`].
#[derive(Debug, Default)]
pub struct MemoryCacheAdapter {
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl MemoryCacheAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StrataResult<CacheStats> {
        let entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: entries.len() as u64,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }

    /// Live entry for `key`, dropping it first if it has expired.
    fn lookup(&self, key: &str) -> StrataResult<Option<Value>> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        let expired = match entries.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Some(entry) => entry.is_expired(Instant::now()),
        };
        if expired {
            entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(entries.get(key).map(|e| e.value.clone()))
    }
}

#[async_trait]
impl CacheAdapter for MemoryCacheAdapter {
    async fn init(&self) -> StrataResult<()> {
        Ok(())
    }

    async fn has(&self, key: &str) -> StrataResult<bool> {
        Ok(self.lookup(key)?.is_some())
    }

    async fn get(&self, key: &str) -> StrataResult<Option<Value>> {
        self.lookup(key)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> StrataResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StrataResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }

    async fn close(&self) -> StrataResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCacheAdapter::new();
        cache.set("k", json!({"a": 1}), Duration::from_secs(60)).await.unwrap();

        assert!(cache.has("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(json!({"a": 1})));

        cache.delete("k").await.unwrap();
        assert!(!cache.has("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_entries_expire_lazily() {
        let cache = MemoryCacheAdapter::new();
        cache.set("k", json!(1), Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.stats().unwrap().entry_count, 1);

        tokio::time::sleep(Duration::from_millis(60)).await;

        // Still held until something reads it.
        assert_eq!(cache.stats().unwrap().entry_count, 1);
        assert_eq!(cache.get("k").await.unwrap(), None);

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let cache = MemoryCacheAdapter::new();
        cache.set("k", json!("v"), Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some(json!("v")));
    }

    #[tokio::test]
    async fn test_cached_null_is_a_hit() {
        let cache = MemoryCacheAdapter::new();
        cache.set("k", Value::Null, Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(Value::Null));
        assert_eq!(cache.stats().unwrap().hits, 1);
    }

    #[tokio::test]
    async fn test_close_clears_entries() {
        let cache = MemoryCacheAdapter::new();
        cache.set("k", json!(1), Duration::from_secs(5)).await.unwrap();
        cache.close().await.unwrap();
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }
}
