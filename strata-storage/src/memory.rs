//! In-memory document store
//!
//! Reference [`DocumentStore`] used by tests and embedded setups. Documents
//! are kept per collection in insertion order. The store can be switched
//! into an unavailable mode to exercise driver-failure paths, and counts the
//! calls it receives so callers can assert that a request never reached it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use strata_core::{
    Document, IndexSpec, ShardConfig, StorageError, StrataError, StrataResult, ID_FIELD,
};

use crate::store::{DocumentStore, Filter, FindOptions, ReturnDocument, StoreConnector, Update};

/// In-memory store for one partition.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    indexes: RwLock<HashMap<String, Vec<IndexSpec>>>,
    unavailable: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    closes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a driver error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of read calls received.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of mutating calls received.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of `close` calls received.
    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Index specs created on a collection, in creation order.
    pub fn indexes(&self, collection: &str) -> StrataResult<Vec<IndexSpec>> {
        let indexes = self.indexes.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(indexes.get(collection).cloned().unwrap_or_default())
    }

    /// Raw snapshot of a collection.
    pub fn documents(&self, collection: &str) -> StrataResult<Vec<Document>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    fn check_read(&self) -> StrataResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()
    }

    fn check_write(&self) -> StrataResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_available()
    }

    fn check_available(&self) -> StrataResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StrataError::Storage(StorageError::Driver {
                reason: "store unavailable".to_string(),
            }));
        }
        Ok(())
    }

    fn with_collection<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Vec<Document>) -> R,
    ) -> StrataResult<R> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(collections.entry(collection.to_string()).or_default()))
    }

    fn matching(&self, collection: &str, filter: &Filter) -> StrataResult<Vec<Document>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StrataResult<Option<Document>> {
        self.check_read()?;
        Ok(self.matching(collection, filter)?.into_iter().next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StrataResult<Vec<Document>> {
        self.check_read()?;
        Ok(options.apply(self.matching(collection, filter)?))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StrataResult<u64> {
        self.check_read()?;
        Ok(self.matching(collection, filter)?.len() as u64)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StrataResult<()> {
        self.check_write()?;
        let id = document.get(ID_FIELD).cloned();
        self.with_collection(collection, |docs| {
            if let Some(id) = &id {
                if docs.iter().any(|d| d.get(ID_FIELD) == Some(id)) {
                    return Err(StrataError::Storage(StorageError::InsertFailed {
                        collection: collection.to_string(),
                        reason: format!("duplicate {} {}", ID_FIELD, id),
                    }));
                }
            }
            docs.push(document);
            Ok(())
        })?
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> StrataResult<u64> {
        self.check_write()?;
        self.with_collection(collection, |docs| {
            match docs.iter_mut().find(|d| filter.matches(d)) {
                Some(existing) => {
                    *existing = document;
                    1
                }
                None => 0,
            }
        })
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StrataResult<u64> {
        self.check_write()?;
        self.with_collection(collection, |docs| {
            match docs.iter().position(|d| filter.matches(d)) {
                Some(pos) => {
                    docs.remove(pos);
                    1
                }
                None => 0,
            }
        })
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StrataResult<u64> {
        self.check_write()?;
        self.with_collection(collection, |docs| {
            let before = docs.len();
            docs.retain(|d| !filter.matches(d));
            (before - docs.len()) as u64
        })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StrataResult<u64> {
        self.check_write()?;
        self.with_collection(collection, |docs| {
            let mut modified = 0;
            for doc in docs.iter_mut().filter(|d| filter.matches(d)) {
                update.apply(doc);
                modified += 1;
            }
            modified
        })
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        returning: ReturnDocument,
    ) -> StrataResult<Option<Document>> {
        self.check_write()?;
        self.with_collection(collection, |docs| {
            docs.iter_mut().find(|d| filter.matches(d)).map(|doc| {
                let before = doc.clone();
                update.apply(doc);
                match returning {
                    ReturnDocument::Before => before,
                    ReturnDocument::After => doc.clone(),
                }
            })
        })
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> StrataResult<()> {
        self.check_write()?;
        let mut indexes = self.indexes.write().map_err(|_| StorageError::LockPoisoned)?;
        let specs = indexes.entry(collection.to_string()).or_default();
        if !specs.contains(spec) {
            specs.push(spec.clone());
        }
        Ok(())
    }

    async fn close(&self) -> StrataResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.check_available()
    }
}

/// Connector that hands out one [`MemoryStore`] per partition.
///
/// Stores are remembered by partition name, so tests can reach the store
/// behind a partition after the database context has been initialised.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    stores: RwLock<HashMap<String, Arc<MemoryStore>>>,
    refused: RwLock<HashSet<String>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `connect` for `partition` fail with a driver error.
    pub fn refuse(&self, partition: &str) -> StrataResult<()> {
        let mut refused = self.refused.write().map_err(|_| StorageError::LockPoisoned)?;
        refused.insert(partition.to_string());
        Ok(())
    }

    /// Store opened for `partition`, if any.
    pub fn store(&self, partition: &str) -> Option<Arc<MemoryStore>> {
        self.stores
            .read()
            .ok()
            .and_then(|stores| stores.get(partition).cloned())
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(
        &self,
        partition: &str,
        _config: &ShardConfig,
    ) -> StrataResult<Arc<dyn DocumentStore>> {
        {
            let refused = self.refused.read().map_err(|_| StorageError::LockPoisoned)?;
            if refused.contains(partition) {
                return Err(StorageError::Driver {
                    reason: format!("connection to {partition} refused"),
                }
                .into());
            }
        }
        let mut stores = self.stores.write().map_err(|_| StorageError::LockPoisoned)?;
        let store: Arc<dyn DocumentStore> = stores
            .entry(partition.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new()))
            .clone();
        Ok(store)
    }
}
