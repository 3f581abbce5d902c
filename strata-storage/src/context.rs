//! Database context
//!
//! Owns the configuration, opens every partition and the cache once, and
//! hands out the router and cache handle while it is ready. Everything that
//! touches storage goes through a context rather than process-wide state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use strata_core::{
    CacheKind, ConfigError, ContextError, DatabaseConfig, StorageError, StrataError, StrataResult,
    META_PARTITION,
};

use crate::cache::{Cache, CacheAdapter, MemoryCacheAdapter, RemoteCacheAdapter, RemoteCacheConnector};
use crate::partition::Partition;
use crate::router::ShardRouter;
use crate::store::StoreConnector;

// ============================================================================
// LIFECYCLE STATE
// ============================================================================

/// Lifecycle of a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

impl ContextState {
    fn as_u8(self) -> u8 {
        match self {
            ContextState::Uninitialized => 0,
            ContextState::Initializing => 1,
            ContextState::Ready => 2,
            ContextState::Closed => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => ContextState::Uninitialized,
            1 => ContextState::Initializing,
            2 => ContextState::Ready,
            _ => ContextState::Closed,
        }
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContextState::Uninitialized => "uninitialized",
            ContextState::Initializing => "initializing",
            ContextState::Ready => "ready",
            ContextState::Closed => "closed",
        };
        f.write_str(s)
    }
}

// ============================================================================
// CONNECTORS
// ============================================================================

/// Factories the context uses to open its collaborators.
#[derive(Clone)]
pub struct Connectors {
    pub store: Arc<dyn StoreConnector>,
    /// Required when the cache is configured as `memcached`.
    pub remote_cache: Option<Arc<dyn RemoteCacheConnector>>,
}

impl Connectors {
    pub fn new(store: Arc<dyn StoreConnector>) -> Self {
        Self {
            store,
            remote_cache: None,
        }
    }

    pub fn with_remote_cache(mut self, connector: Arc<dyn RemoteCacheConnector>) -> Self {
        self.remote_cache = Some(connector);
        self
    }
}

// ============================================================================
// DATABASE
// ============================================================================

#[derive(Default)]
struct Opened {
    router: Option<Arc<ShardRouter>>,
    cache: Option<Cache>,
}

/// A database context: configuration plus the handles opened from it.
pub struct Database {
    config: DatabaseConfig,
    connectors: Connectors,
    state: AtomicU8,
    opened: RwLock<Opened>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("state", &self.state())
            .field("shards", &self.config.shards.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Database {
    pub fn new(config: DatabaseConfig, connectors: Connectors) -> Self {
        Self {
            config,
            connectors,
            state: AtomicU8::new(ContextState::Uninitialized.as_u8()),
            opened: RwLock::new(Opened::default()),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn state(&self) -> ContextState {
        ContextState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: ContextState, to: ContextState, action: &str) -> StrataResult<()> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|current| {
                ContextError::InvalidTransition {
                    action: action.to_string(),
                    state: ContextState::from_u8(current).to_string(),
                }
                .into()
            })
    }

    /// Validate the configuration and open every partition and the cache.
    ///
    /// A failed init closes whatever it had opened and leaves the context
    /// `Uninitialized` so it can be retried.
    pub async fn init(&self) -> StrataResult<()> {
        self.transition(ContextState::Uninitialized, ContextState::Initializing, "init")?;
        tracing::info!(shards = self.config.shards.len(), "Initializing database context");

        let result = match self.open().await {
            Ok(opened) => self.install(opened).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                self.state.store(ContextState::Ready.as_u8(), Ordering::Release);
                tracing::info!("Database context ready");
                Ok(())
            }
            Err(e) => {
                self.state
                    .store(ContextState::Uninitialized.as_u8(), Ordering::Release);
                tracing::warn!(error = %e, "Database context failed to initialize");
                Err(e)
            }
        }
    }

    async fn install(&self, opened: Opened) -> StrataResult<()> {
        let rejected = match self.opened.write() {
            Ok(mut slot) => {
                *slot = opened;
                None
            }
            Err(_) => Some(opened),
        };
        match rejected {
            None => Ok(()),
            Some(opened) => {
                // The lock error wins over any close failure.
                let _ = release(opened).await;
                Err(StorageError::LockPoisoned.into())
            }
        }
    }

    async fn open(&self) -> StrataResult<Opened> {
        self.config.validate()?;

        let meta_store = self
            .connectors
            .store
            .connect(META_PARTITION, &self.config.meta)
            .await?;
        let meta = Partition::new(META_PARTITION, meta_store, self.config.meta.open);

        // Anything opened before a failure is closed again; the open error wins.
        let mut shards = Vec::with_capacity(self.config.shards.len());
        for (id, shard) in &self.config.shards {
            match self.connectors.store.connect(id, shard).await {
                Ok(store) => {
                    tracing::debug!(shard_id = %id, writable = shard.open, "Opened shard");
                    shards.push(Partition::new(id.clone(), store, shard.open));
                }
                Err(e) => {
                    let _ = close_partitions(std::iter::once(&meta).chain(&shards)).await;
                    return Err(e);
                }
            }
        }

        let cache = match self.open_cache().await {
            Ok(cache) => cache,
            Err(e) => {
                let _ = close_partitions(std::iter::once(&meta).chain(&shards)).await;
                return Err(e);
            }
        };

        Ok(Opened {
            router: Some(Arc::new(ShardRouter::new(meta, shards))),
            cache,
        })
    }

    async fn open_cache(&self) -> StrataResult<Option<Cache>> {
        let Some(cache_config) = &self.config.cache else {
            return Ok(None);
        };
        let adapter: Arc<dyn CacheAdapter> = match cache_config.kind {
            CacheKind::Simple => Arc::new(MemoryCacheAdapter::new()),
            CacheKind::Memcached => {
                let connector = self.connectors.remote_cache.as_ref().ok_or_else(|| {
                    StrataError::Config(ConfigError::InvalidValue {
                        field: "cache.type".to_string(),
                        value: "memcached".to_string(),
                        reason: "no remote cache connector supplied".to_string(),
                    })
                })?;
                Arc::new(RemoteCacheAdapter::new(connector.client(cache_config)?))
            }
        };
        adapter.init().await?;
        Ok(Some(Cache::from_config(adapter, cache_config)))
    }

    /// Close every partition and the cache. Only a ready context can close.
    ///
    /// Every handle is closed even when one fails; the first failure is
    /// returned.
    pub async fn close(&self) -> StrataResult<()> {
        self.transition(ContextState::Ready, ContextState::Closed, "close")?;

        let opened = {
            let mut slot = self.opened.write().map_err(|_| StorageError::LockPoisoned)?;
            std::mem::take(&mut *slot)
        };
        let result = release(opened).await;
        tracing::info!("Database context closed");
        result
    }

    fn ensure_ready(&self) -> StrataResult<()> {
        let state = self.state();
        if state != ContextState::Ready {
            return Err(ContextError::NotReady {
                state: state.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn router(&self) -> StrataResult<Arc<ShardRouter>> {
        self.ensure_ready()?;
        let opened = self.opened.read().map_err(|_| StorageError::LockPoisoned)?;
        opened.router.clone().ok_or_else(|| {
            ContextError::NotReady {
                state: self.state().to_string(),
            }
            .into()
        })
    }

    pub fn cache(&self) -> StrataResult<Cache> {
        self.ensure_ready()?;
        let opened = self.opened.read().map_err(|_| StorageError::LockPoisoned)?;
        opened.cache.clone().ok_or_else(|| ContextError::NoCache.into())
    }
}

async fn close_partitions<'a>(partitions: impl Iterator<Item = &'a Partition>) -> StrataResult<()> {
    let mut first_error = None;
    for partition in partitions {
        if let Err(e) = partition.store().close().await {
            tracing::warn!(partition = %partition.id(), error = %e, "Failed to close partition");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

async fn release(opened: Opened) -> StrataResult<()> {
    let mut result = match &opened.router {
        Some(router) => close_partitions(router.partitions().map(|p| &**p)).await,
        None => Ok(()),
    };
    if let Some(cache) = opened.cache {
        if let Err(e) = cache.adapter().close().await {
            tracing::warn!(error = %e, "Failed to close cache");
            result = result.and(Err(e));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RemoteCacheClient;
    use std::time::Duration;
    use crate::memory::MemoryConnector;
    use async_trait::async_trait;
    use strata_core::{CacheConfig, CacheError, ShardConfig, ShardError};

    fn config() -> DatabaseConfig {
        DatabaseConfig::new(ShardConfig::new("mem://meta", "app"))
            .with_shard("s1", ShardConfig::new("mem://s1", "app"))
            .with_shard("archive", ShardConfig::new("mem://archive", "app").read_only())
            .with_cache(CacheConfig::simple(60))
    }

    fn connectors() -> Connectors {
        Connectors::new(Arc::new(MemoryConnector::new()))
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let db = Database::new(config(), connectors());
        assert_eq!(db.state(), ContextState::Uninitialized);
        assert!(matches!(
            db.router(),
            Err(StrataError::Context(ContextError::NotReady { .. }))
        ));

        db.init().await.unwrap();
        assert_eq!(db.state(), ContextState::Ready);

        let router = db.router().unwrap();
        assert_eq!(router.shard_ids(), vec!["archive", "s1"]);
        assert!(!router.shard("archive").unwrap().is_writable());
        assert_eq!(db.cache().unwrap().default_ttl(), Duration::from_secs(60));

        db.close().await.unwrap();
        assert_eq!(db.state(), ContextState::Closed);
        assert_eq!(
            db.cache().unwrap_err(),
            StrataError::Context(ContextError::NotReady {
                state: "closed".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_double_init_rejected() {
        let db = Database::new(config(), connectors());
        db.init().await.unwrap();
        assert_eq!(
            db.init().await.unwrap_err(),
            StrataError::Context(ContextError::InvalidTransition {
                action: "init".to_string(),
                state: "ready".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_close_before_init_rejected() {
        let db = Database::new(config(), connectors());
        assert!(matches!(
            db.close().await,
            Err(StrataError::Context(ContextError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_leaves_context_uninitialized() {
        let bad = DatabaseConfig::new(ShardConfig::new("", "app"));
        let db = Database::new(bad, connectors());
        assert!(matches!(
            db.init().await,
            Err(StrataError::Config(ConfigError::MissingRequired { .. }))
        ));
        assert_eq!(db.state(), ContextState::Uninitialized);
    }

    #[tokio::test]
    async fn test_no_cache_configured() {
        let db = Database::new(
            DatabaseConfig::new(ShardConfig::new("mem://meta", "app")),
            connectors(),
        );
        db.init().await.unwrap();
        assert_eq!(
            db.cache().unwrap_err(),
            StrataError::Context(ContextError::NoCache)
        );
        assert!(matches!(
            db.router().unwrap().pick_writable_shard(),
            Err(StrataError::Shard(ShardError::NoWritableShard))
        ));
    }

    #[tokio::test]
    async fn test_memcached_requires_connector() {
        let cfg = DatabaseConfig::new(ShardConfig::new("mem://meta", "app"))
            .with_cache(CacheConfig::memcached(vec!["127.0.0.1:11211".to_string()], 30));
        let db = Database::new(cfg, connectors());
        assert!(matches!(
            db.init().await,
            Err(StrataError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    struct DownClient;

    #[async_trait]
    impl RemoteCacheClient for DownClient {
        async fn connect(&self) -> StrataResult<()> {
            Err(CacheError::Backend {
                reason: "connection refused".to_string(),
            }
            .into())
        }
        async fn get(&self, _key: &str) -> StrataResult<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _expiry: u32) -> StrataResult<()> {
            Ok(())
        }
        async fn delete(&self, _key: &str) -> StrataResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> StrataResult<()> {
            Ok(())
        }
    }

    struct DownConnector;

    impl RemoteCacheConnector for DownConnector {
        fn client(&self, _config: &CacheConfig) -> StrataResult<Arc<dyn RemoteCacheClient>> {
            Ok(Arc::new(DownClient))
        }
    }

    #[tokio::test]
    async fn test_cache_connect_failure_propagates() {
        let cfg = DatabaseConfig::new(ShardConfig::new("mem://meta", "app"))
            .with_cache(CacheConfig::memcached(vec!["127.0.0.1:11211".to_string()], 30));
        let stores = Arc::new(MemoryConnector::new());
        let db = Database::new(
            cfg,
            Connectors::new(stores.clone()).with_remote_cache(Arc::new(DownConnector)),
        );
        assert_eq!(
            db.init().await.unwrap_err(),
            StrataError::Cache(CacheError::Backend {
                reason: "connection refused".to_string()
            })
        );
        assert_eq!(db.state(), ContextState::Uninitialized);
        assert_eq!(stores.store("meta").unwrap().close_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_shard_connect_closes_opened_stores() {
        let stores = Arc::new(MemoryConnector::new());
        stores.refuse("s1").unwrap();
        let db = Database::new(config(), Connectors::new(stores.clone()));

        assert!(matches!(
            db.init().await,
            Err(StrataError::Storage(StorageError::Driver { .. }))
        ));
        assert_eq!(db.state(), ContextState::Uninitialized);
        assert_eq!(stores.store("meta").unwrap().close_count(), 1);
        assert_eq!(stores.store("archive").unwrap().close_count(), 1);
        assert!(stores.store("s1").is_none());

        // A retry hits the same refusal and releases its handles again.
        assert!(db.init().await.is_err());
        assert_eq!(stores.store("meta").unwrap().close_count(), 2);
        assert_eq!(db.state(), ContextState::Uninitialized);
    }

    #[tokio::test]
    async fn test_close_reaches_every_handle_after_a_failure() {
        let stores = Arc::new(MemoryConnector::new());
        let db = Database::new(config(), Connectors::new(stores.clone()));
        db.init().await.unwrap();
        let cache = db.cache().unwrap();
        cache
            .adapter()
            .set("k", serde_json::json!(1), Duration::ZERO)
            .await
            .unwrap();

        stores.store("meta").unwrap().set_unavailable(true);
        assert!(matches!(
            db.close().await,
            Err(StrataError::Storage(StorageError::Driver { .. }))
        ));
        assert_eq!(db.state(), ContextState::Closed);
        for partition in ["meta", "archive", "s1"] {
            assert_eq!(stores.store(partition).unwrap().close_count(), 1, "{partition}");
        }
        // The memory cache empties on close.
        assert!(!cache.adapter().has("k").await.unwrap());
    }
}
