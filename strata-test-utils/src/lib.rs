//! strata Test Utilities
//!
//! Shared test infrastructure for the strata workspace:
//! - Fixture classes (User, the Shape family, sharded Event) and a ready
//!   in-memory database context
//! - A mock remote cache client
//! - Proptest generators
//! - Assertions on error families

pub use strata_core::{
    Document, FieldDescriptor, ObjectId, SchemaRegistry, ShardError, StrataError, StrataResult,
    SubmodelError, ValidationError,
};
pub use strata_storage::{MemoryConnector, MemoryStore};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use strata_core::{CacheConfig, CacheError, StorageError};
use strata_storage::{RemoteCacheClient, RemoteCacheConnector};

// ============================================================================
// TRACING
// ============================================================================

/// Install a test subscriber once per process. Honors `RUST_LOG`.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK REMOTE CACHE
// ============================================================================

/// In-memory stand-in for a memcached server.
///
/// Records the raw bytes and expiry of every entry and can be switched into
/// a failing mode to exercise error propagation.
#[derive(Debug, Default)]
pub struct MockRemoteCache {
    entries: Mutex<HashMap<String, (Vec<u8>, u32)>>,
    connected: AtomicBool,
    failing: AtomicBool,
    sets: AtomicUsize,
}

impl MockRemoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Stored expiry for `key`, in server units.
    pub fn expiry(&self, key: &str) -> Option<u32> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).map(|(_, expiry)| *expiry))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn check(&self) -> StrataResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Backend {
                reason: "mock cache unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCacheClient for MockRemoteCache {
    async fn connect(&self) -> StrataResult<()> {
        self.check()?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> StrataResult<Option<Vec<u8>>> {
        self.check()?;
        let entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(key).map(|(bytes, _)| bytes.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, expiry: u32) -> StrataResult<()> {
        self.check()?;
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.to_string(), (value, expiry));
        self.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StrataResult<()> {
        self.check()?;
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }

    async fn disconnect(&self) -> StrataResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one shared [`MockRemoteCache`] for every configuration.
#[derive(Debug, Default, Clone)]
pub struct MockRemoteConnector {
    client: Arc<MockRemoteCache>,
}

impl MockRemoteConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_handle(&self) -> Arc<MockRemoteCache> {
        self.client.clone()
    }
}

impl RemoteCacheConnector for MockRemoteConnector {
    fn client(&self, config: &CacheConfig) -> StrataResult<Arc<dyn RemoteCacheClient>> {
        if config.backends.is_empty() {
            return Err(CacheError::Backend {
                reason: "no backends configured".to_string(),
            }
            .into());
        }
        let client: Arc<dyn RemoteCacheClient> = self.client.clone();
        Ok(client)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for strata values.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;
    use uuid::Uuid;

    /// Generate a random ObjectId.
    pub fn arb_object_id() -> impl Strategy<Value = ObjectId> {
        any::<[u8; 16]>().prop_map(|bytes| ObjectId::from_uuid(Uuid::from_bytes(bytes)))
    }

    /// Usernames with optional surrounding whitespace.
    pub fn arb_padded_username() -> impl Strategy<Value = String> {
        ("[ \t]{0,3}", "[a-z][a-z0-9_]{0,11}", "[ \t]{0,3}")
            .prop_map(|(lead, name, trail)| format!("{lead}{name}{trail}"))
    }

    /// Scalar JSON values.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        ]
    }

    /// Flat documents over a small key space.
    pub fn arb_document() -> impl Strategy<Value = Document> {
        proptest::collection::btree_map("[a-e]", arb_scalar(), 0..5)
            .prop_map(|m| m.into_iter().collect())
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Fixture classes and a ready database context.

    use super::*;
    use serde_json::Value;
    use strata_core::{DatabaseConfig, IndexSpec, ShardConfig};
    use strata_model::{ClassBuilder, ModelClass};
    use strata_storage::{Connectors, Database};

    /// Every fixture class, registered in a private schema registry.
    pub struct Classes {
        pub schemas: SchemaRegistry,
        /// `username` (required string), `email`, `password` (restricted
        /// and rejected), `age`, `tags` (defaults to `[]`).
        pub user: Arc<ModelClass>,
        /// Abstract root of the shape family, discriminated by `submodel`.
        pub shape: Arc<ModelClass>,
        pub circle: Arc<ModelClass>,
        pub square: Arc<ModelClass>,
        /// Shard-aware, `title` required and indexed.
        pub event: Arc<ModelClass>,
    }

    pub fn classes() -> StrataResult<Classes> {
        let schemas = SchemaRegistry::new();

        let user = ClassBuilder::new("User")
            .field("username", FieldDescriptor::string().required())?
            .field("email", FieldDescriptor::string())?
            .field("password", FieldDescriptor::string().restricted().rejected())?
            .field("age", FieldDescriptor::number())?
            .field("tags", FieldDescriptor::array().default_value(Value::Array(Vec::new())))?
            .index(IndexSpec::ascending("username").unique())
            .build(&schemas)?;

        let shape = ClassBuilder::new("Shape")
            .polymorphic("submodel")?
            .field("name", FieldDescriptor::string())?
            .build(&schemas)?;
        let circle = ClassBuilder::extend(&shape, "Circle")
            .submodel("circle")
            .field("radius", FieldDescriptor::number())?
            .build(&schemas)?;
        let square = ClassBuilder::extend(&shape, "Square")
            .submodel("square")
            .field("side", FieldDescriptor::number())?
            .build(&schemas)?;

        let event = ClassBuilder::sharded("Event")
            .field("title", FieldDescriptor::string().required())?
            .field("at", FieldDescriptor::datetime())?
            .index(IndexSpec::ascending("title"))
            .build(&schemas)?;

        Ok(Classes {
            schemas,
            user,
            shape,
            circle,
            square,
            event,
        })
    }

    /// Meta partition, writable shards `s1` and `s2`, read-only `archive`,
    /// and a simple cache with a 60 second default TTL.
    pub fn test_config() -> DatabaseConfig {
        DatabaseConfig::new(ShardConfig::new("mem://meta", "strata_test"))
            .with_shard("s1", ShardConfig::new("mem://s1", "strata_test"))
            .with_shard("s2", ShardConfig::new("mem://s2", "strata_test"))
            .with_shard(
                "archive",
                ShardConfig::new("mem://archive", "strata_test").read_only(),
            )
            .with_cache(CacheConfig::simple(60))
    }

    /// An initialised context over [`test_config`] and the connector that
    /// holds its stores.
    pub async fn test_database() -> StrataResult<(Arc<Database>, Arc<MemoryConnector>)> {
        let connector = Arc::new(MemoryConnector::new());
        let db = Arc::new(Database::new(
            test_config(),
            Connectors::new(connector.clone()),
        ));
        db.init().await?;
        Ok((db, connector))
    }

    /// Unwrap a JSON object literal into a document.
    #[track_caller]
    pub fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected a JSON object, got {other}"),
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on strata error families.

    use super::*;

    #[track_caller]
    pub fn assert_field_required<T: std::fmt::Debug>(result: &StrataResult<T>, field: &str) {
        match result {
            Err(StrataError::Validation(ValidationError::FieldRequired { field: f, .. }))
                if f == field => {}
            other => panic!("Expected FieldRequired on {field}, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_read_only<T: std::fmt::Debug>(result: &StrataResult<T>) {
        match result {
            Err(StrataError::Shard(ShardError::ShardIsReadOnly { .. })) => {}
            other => panic!("Expected ShardIsReadOnly, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_submodel_error<T: std::fmt::Debug>(result: &StrataResult<T>) {
        match result {
            Err(StrataError::Submodel(_)) => {}
            other => panic!("Expected a submodel error, got: {other:?}"),
        }
    }
}
