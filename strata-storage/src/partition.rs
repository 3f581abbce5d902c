//! Storage partitions
//!
//! A [`Partition`] pairs a store handle with its writability. Every mutating
//! primitive checks writability before the store is touched, so a read-only
//! partition never sees a write request.

use std::fmt;
use std::sync::Arc;

use strata_core::{Document, IndexSpec, ShardError, StrataResult};

use crate::store::{DocumentStore, Filter, FindOptions, ReturnDocument, Update};

/// One storage partition: the meta partition or a named shard.
#[derive(Clone)]
pub struct Partition {
    id: String,
    store: Arc<dyn DocumentStore>,
    writable: bool,
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("id", &self.id)
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

impl Partition {
    pub fn new(id: impl Into<String>, store: Arc<dyn DocumentStore>, writable: bool) -> Self {
        Self {
            id: id.into(),
            store,
            writable,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Fail with `ShardIsReadOnly` unless the partition accepts writes.
    pub fn ensure_writable(&self) -> StrataResult<()> {
        if !self.writable {
            tracing::warn!(partition = %self.id, "Rejected write to read-only partition");
            return Err(ShardError::ShardIsReadOnly {
                shard_id: self.id.clone(),
            }
            .into());
        }
        Ok(())
    }

    // ========================================================================
    // READ PRIMITIVES
    // ========================================================================

    pub async fn find_one(&self, collection: &str, filter: &Filter) -> StrataResult<Option<Document>> {
        tracing::debug!(partition = %self.id, collection, "find_one");
        self.store.find_one(collection, filter).await
    }

    pub async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StrataResult<Vec<Document>> {
        tracing::debug!(partition = %self.id, collection, "find");
        self.store.find(collection, filter, options).await
    }

    pub async fn count(&self, collection: &str, filter: &Filter) -> StrataResult<u64> {
        self.store.count(collection, filter).await
    }

    // ========================================================================
    // MUTATING PRIMITIVES
    // ========================================================================

    pub async fn insert(&self, collection: &str, document: Document) -> StrataResult<()> {
        self.ensure_writable()?;
        tracing::debug!(partition = %self.id, collection, "insert");
        self.store.insert_one(collection, document).await
    }

    pub async fn replace(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> StrataResult<u64> {
        self.ensure_writable()?;
        tracing::debug!(partition = %self.id, collection, "replace");
        self.store.replace_one(collection, filter, document).await
    }

    pub async fn delete_one(&self, collection: &str, filter: &Filter) -> StrataResult<u64> {
        self.ensure_writable()?;
        tracing::debug!(partition = %self.id, collection, "delete_one");
        self.store.delete_one(collection, filter).await
    }

    pub async fn delete_many(&self, collection: &str, filter: &Filter) -> StrataResult<u64> {
        self.ensure_writable()?;
        tracing::debug!(partition = %self.id, collection, "delete_many");
        self.store.delete_many(collection, filter).await
    }

    pub async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StrataResult<u64> {
        self.ensure_writable()?;
        tracing::debug!(partition = %self.id, collection, "update_many");
        self.store.update_many(collection, filter, update).await
    }

    pub async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        returning: ReturnDocument,
    ) -> StrataResult<Option<Document>> {
        self.ensure_writable()?;
        tracing::debug!(partition = %self.id, collection, "find_one_and_update");
        self.store
            .find_one_and_update(collection, filter, update, returning)
            .await
    }

    pub async fn create_index(&self, collection: &str, spec: &IndexSpec) -> StrataResult<()> {
        self.ensure_writable()?;
        self.store.create_index(collection, spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;
    use strata_core::StrataError;

    #[tokio::test]
    async fn test_read_only_partition_rejects_writes_before_store() {
        let store = Arc::new(MemoryStore::new());
        let partition = Partition::new("archive", store.clone(), false);

        let err = partition.insert("c", Document::new()).await.unwrap_err();
        assert_eq!(
            err,
            StrataError::Shard(ShardError::ShardIsReadOnly {
                shard_id: "archive".to_string()
            })
        );
        assert!(partition.delete_many("c", &Filter::new()).await.is_err());
        assert!(partition
            .update_many("c", &Filter::new(), &Update::new().set("a", 1))
            .await
            .is_err());
        assert_eq!(store.write_count(), 0);

        // Reads still reach the store.
        assert!(partition.find_one("c", &Filter::new()).await.unwrap().is_none());
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_writable_partition_delegates() {
        let store = Arc::new(MemoryStore::new());
        let partition = Partition::new("meta", store.clone(), true);

        let mut doc = Document::new();
        doc.insert("_id".into(), json!("x"));
        partition.insert("c", doc).await.unwrap();

        assert_eq!(partition.count("c", &Filter::new()).await.unwrap(), 1);
        assert_eq!(store.write_count(), 1);
    }
}
