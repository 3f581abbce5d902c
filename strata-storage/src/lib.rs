//! strata Storage - Store Capability, Shard Routing and Cache
//!
//! Defines the document-store abstraction strata persists through, the
//! partition and router types that decide where a class lives, the database
//! context that opens them, and the cache layer with its memoizer.
//! [`MemoryStore`] is the in-process store used by tests and embedders.

pub mod cache;
pub mod context;
pub mod memory;
pub mod partition;
pub mod router;
pub mod store;

pub use cache::{
    derive_key, hash_args, Cache, CacheAdapter, CacheEntry, CacheKeyArg, CacheStats, KeyFn,
    MemoryCacheAdapter, Memoized, RemoteCacheAdapter, RemoteCacheClient, RemoteCacheConnector,
    TtlPolicy,
};
pub use context::{Connectors, ContextState, Database};
pub use memory::{MemoryConnector, MemoryStore};
pub use partition::Partition;
pub use router::ShardRouter;
pub use store::{
    compare_values, DocumentStore, Filter, FindOptions, ReturnDocument, StoreConnector, Update,
};
