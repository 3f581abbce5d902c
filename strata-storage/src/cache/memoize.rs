//! Memoization over a [`CacheAdapter`].
//!
//! [`Cache`] is the handle the database context hands out: an adapter, a key
//! prefix and a default TTL that can change at runtime. [`Memoized`] wraps one
//! owner/method pair and runs a computation only when its key is absent.
//! Concurrent misses on the same key each compute.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_core::{CacheConfig, CacheError, StrataResult};

use super::key::{derive_key, hash_args, CacheKeyArg};
use super::traits::CacheAdapter;

/// How long a memoized result is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtlPolicy {
    /// The cache's default TTL at the time the value is stored.
    #[default]
    Default,
    Fixed(Duration),
}

/// Custom rendering of a call's arguments, placed between the parens of the key.
pub type KeyFn = Arc<dyn Fn(&[&dyn CacheKeyArg]) -> String + Send + Sync>;

/// Shared cache handle.
#[derive(Clone)]
pub struct Cache {
    adapter: Arc<dyn CacheAdapter>,
    prefix: Arc<str>,
    default_ttl_nanos: Arc<AtomicU64>,
}

/// Nanoseconds of `ttl`, saturating. Keeps sub-second TTLs from collapsing to
/// zero, which would read as "no expiry".
fn ttl_nanos(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("prefix", &self.prefix)
            .field("default_ttl", &self.default_ttl())
            .finish_non_exhaustive()
    }
}

impl Cache {
    pub fn new(adapter: Arc<dyn CacheAdapter>, prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            adapter,
            prefix: Arc::from(prefix.into()),
            default_ttl_nanos: Arc::new(AtomicU64::new(ttl_nanos(default_ttl))),
        }
    }

    pub fn from_config(adapter: Arc<dyn CacheAdapter>, config: &CacheConfig) -> Self {
        Self::new(adapter, config.prefix.clone(), Duration::from_secs(config.default_ttl))
    }

    pub fn adapter(&self) -> &Arc<dyn CacheAdapter> {
        &self.adapter
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_nanos(self.default_ttl_nanos.load(Ordering::Relaxed))
    }

    /// Change the default TTL. Memoizers with [`TtlPolicy::Default`] pick it
    /// up on their next store, clones of this handle included.
    pub fn set_default_ttl(&self, ttl: Duration) {
        self.default_ttl_nanos.store(ttl_nanos(ttl), Ordering::Relaxed);
    }

    pub fn key(&self, owner: &str, method: &str, args: &[&dyn CacheKeyArg]) -> String {
        derive_key(&self.prefix, owner, method, args)
    }

    /// Drop the memoized result of `owner.method(args)`.
    pub async fn invalidate(
        &self,
        owner: &str,
        method: &str,
        args: &[&dyn CacheKeyArg],
    ) -> StrataResult<()> {
        let key = self.key(owner, method, args);
        tracing::debug!(key = %key, "Cache invalidate");
        self.adapter.delete(&key).await
    }

    pub fn memoize(&self, owner: impl Into<String>, method: impl Into<String>, ttl: TtlPolicy) -> Memoized {
        Memoized {
            cache: self.clone(),
            owner: owner.into(),
            method: method.into(),
            ttl,
            key_fn: None,
        }
    }

    fn resolve_ttl(&self, policy: TtlPolicy) -> Duration {
        match policy {
            TtlPolicy::Default => self.default_ttl(),
            TtlPolicy::Fixed(ttl) => ttl,
        }
    }
}

/// A memoized method: one owner/method pair bound to a cache.
#[derive(Clone)]
pub struct Memoized {
    cache: Cache,
    owner: String,
    method: String,
    ttl: TtlPolicy,
    key_fn: Option<KeyFn>,
}

impl Memoized {
    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    pub fn key(&self, args: &[&dyn CacheKeyArg]) -> String {
        let rendered = match &self.key_fn {
            Some(f) => f(args),
            None => hash_args(args),
        };
        format!("{}.{}.{}({})", self.cache.prefix, self.owner, self.method, rendered)
    }

    /// Cached result for `args`, or the result of `compute` stored under the
    /// TTL in effect right now.
    pub async fn call<T, F, Fut>(&self, args: &[&dyn CacheKeyArg], compute: F) -> StrataResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = StrataResult<T>>,
    {
        let key = self.key(args);
        if let Some(cached) = self.cache.adapter.get(&key).await? {
            tracing::debug!(key = %key, "Cache hit");
            return serde_json::from_value(cached).map_err(|e| {
                CacheError::Serialization {
                    key: key.clone(),
                    reason: e.to_string(),
                }
                .into()
            });
        }

        tracing::debug!(key = %key, "Cache miss");
        let result = compute().await?;
        let value = serde_json::to_value(&result).map_err(|e| CacheError::Serialization {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        let ttl = self.cache.resolve_ttl(self.ttl);
        self.cache.adapter.set(&key, value, ttl).await?;
        Ok(result)
    }

    pub async fn invalidate(&self, args: &[&dyn CacheKeyArg]) -> StrataResult<()> {
        let key = self.key(args);
        tracing::debug!(key = %key, "Cache invalidate");
        self.cache.adapter.delete(&key).await
    }
}
