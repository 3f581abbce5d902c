//! Cache layer and memoization.
//!
//! Adapters implement [`CacheAdapter`]: [`MemoryCacheAdapter`] keeps entries
//! in process with lazy expiry, [`RemoteCacheAdapter`] talks to an external
//! server through a [`RemoteCacheClient`]. On top sits [`Cache`], the handle
//! that memoizes async computations under deterministic keys.
//!
//! # Example
//!
//! ```ignore
//! let cache = db.cache()?;
//! let top = cache.memoize("Article", "topByAuthor", TtlPolicy::Default);
//!
//! let ids: Vec<String> = top
//!     .call(&[&author_id], || async { load_top(author_id).await })
//!     .await?;
//!
//! // After the author publishes again
//! top.invalidate(&[&author_id]).await?;
//! ```

pub mod key;
pub mod memoize;
pub mod memory;
pub mod remote;
pub mod traits;

pub use key::{derive_key, hash_args, CacheKeyArg};
pub use memoize::{Cache, KeyFn, Memoized, TtlPolicy};
pub use memory::{CacheEntry, MemoryCacheAdapter};
pub use remote::{
    expiry_for, RemoteCacheAdapter, RemoteCacheClient, RemoteCacheConnector, MAX_RELATIVE_TTL_SECS,
};
pub use traits::{CacheAdapter, CacheStats};
