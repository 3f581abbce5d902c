//! Class-level operations
//!
//! A [`ModelHandle`] binds a class to a database context. It is the only way
//! to make or load instances, and it runs the queries that act on a whole
//! collection rather than on one instance.

use std::sync::Arc;

use futures_util::future::try_join_all;
use strata_core::{Document, ModelError, ObjectId, StrataResult};
use strata_storage::{Database, Filter, FindOptions, Partition, ReturnDocument, Update};

use crate::class::ModelClass;
use crate::instance::Model;
use crate::persistence::narrow_filter;

/// `db.model(&class)` on a shared database context.
pub trait ModelAccess {
    fn model(&self, class: &Arc<ModelClass>) -> ModelHandle;
}

impl ModelAccess for Arc<Database> {
    fn model(&self, class: &Arc<ModelClass>) -> ModelHandle {
        ModelHandle::new(self.clone(), class.clone())
    }
}

/// A class bound to a database context.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    db: Arc<Database>,
    class: Arc<ModelClass>,
}

impl ModelHandle {
    pub fn new(db: Arc<Database>, class: Arc<ModelClass>) -> Self {
        Self { db, class }
    }

    pub fn class(&self) -> &Arc<ModelClass> {
        &self.class
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn collection(&self) -> &str {
        self.class.schema().collection()
    }

    fn partition(&self, shard_id: Option<&str>) -> StrataResult<Arc<Partition>> {
        self.db
            .router()?
            .resolve_partition(self.class.schema(), shard_id)
    }

    fn load_all(&self, documents: Vec<Document>, shard_id: Option<&str>) -> StrataResult<Vec<Model>> {
        documents
            .iter()
            .map(|doc| Model::load(self.db.clone(), &self.class, doc, shard_id))
            .collect()
    }

    /// A new, unsaved instance.
    pub fn make(&self, data: Document) -> StrataResult<Model> {
        Model::make(self.db.clone(), self.class.clone(), data)
    }

    /// Load a stored document that was fetched some other way.
    pub fn load(&self, document: &Document, shard_id: Option<&str>) -> StrataResult<Model> {
        Model::load(self.db.clone(), &self.class, document, shard_id)
    }

    /// Load by identifier.
    ///
    /// The lookup is not narrowed to this class's discriminator, so a
    /// document of a sibling class surfaces as a wrong-submodel error rather
    /// than as a miss.
    pub async fn get(&self, id: ObjectId, shard_id: Option<&str>) -> StrataResult<Option<Model>> {
        let partition = self.partition(shard_id)?;
        partition
            .find_one(self.collection(), &Filter::by_id(id))
            .await?
            .map(|doc| Model::load(self.db.clone(), &self.class, &doc, shard_id))
            .transpose()
    }

    pub async fn find_one(&self, filter: &Filter, shard_id: Option<&str>) -> StrataResult<Option<Model>> {
        let partition = self.partition(shard_id)?;
        let filter = narrow_filter(&self.class, filter);
        partition
            .find_one(self.collection(), &filter)
            .await?
            .map(|doc| Model::load(self.db.clone(), &self.class, &doc, shard_id))
            .transpose()
    }

    pub async fn find(&self, filter: &Filter, shard_id: Option<&str>) -> StrataResult<Vec<Model>> {
        self.find_with(filter, &FindOptions::default(), shard_id).await
    }

    pub async fn find_with(
        &self,
        filter: &Filter,
        options: &FindOptions,
        shard_id: Option<&str>,
    ) -> StrataResult<Vec<Model>> {
        let partition = self.partition(shard_id)?;
        let filter = narrow_filter(&self.class, filter);
        let documents = partition.find(self.collection(), &filter, options).await?;
        self.load_all(documents, shard_id)
    }

    pub async fn count(&self, filter: &Filter, shard_id: Option<&str>) -> StrataResult<u64> {
        let partition = self.partition(shard_id)?;
        let filter = narrow_filter(&self.class, filter);
        partition.count(self.collection(), &filter).await
    }

    pub async fn exists(&self, filter: &Filter, shard_id: Option<&str>) -> StrataResult<bool> {
        Ok(self.count(filter, shard_id).await? > 0)
    }

    pub async fn delete_many(&self, filter: &Filter, shard_id: Option<&str>) -> StrataResult<u64> {
        let partition = self.partition(shard_id)?;
        let filter = narrow_filter(&self.class, filter);
        partition.delete_many(self.collection(), &filter).await
    }

    pub async fn update_many(
        &self,
        filter: &Filter,
        update: &Update,
        shard_id: Option<&str>,
    ) -> StrataResult<u64> {
        let partition = self.partition(shard_id)?;
        let filter = narrow_filter(&self.class, filter);
        partition.update_many(self.collection(), &filter, update).await
    }

    pub async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        returning: ReturnDocument,
        shard_id: Option<&str>,
    ) -> StrataResult<Option<Model>> {
        let partition = self.partition(shard_id)?;
        let filter = narrow_filter(&self.class, filter);
        partition
            .find_one_and_update(self.collection(), &filter, update, returning)
            .await?
            .map(|doc| Model::load(self.db.clone(), &self.class, &doc, shard_id))
            .transpose()
    }

    /// Create the class's declared indexes.
    ///
    /// Shard-aware classes get them on every writable shard; read-only shards
    /// are skipped.
    pub async fn ensure_indexes(&self) -> StrataResult<()> {
        let router = self.db.router()?;
        let targets: Vec<Arc<Partition>> = if self.class.schema().is_shard_aware() {
            router
                .writable_shard_ids()
                .iter()
                .map(|id| router.shard(id).cloned())
                .collect::<StrataResult<_>>()?
        } else {
            vec![router.meta().clone()]
        };
        for partition in targets {
            for spec in self.class.schema().indexes() {
                partition.create_index(self.collection(), spec).await?;
            }
        }
        Ok(())
    }

    /// Run `filter` against every shard concurrently, read-only ones included.
    ///
    /// Each result carries the shard it was found in. Results come back in
    /// shard id order; any failing shard fails the whole call.
    pub async fn find_across_shards(&self, filter: &Filter) -> StrataResult<Vec<Model>> {
        if !self.class.schema().is_shard_aware() {
            return Err(ModelError::WrongModelKind {
                class: self.class.name().to_string(),
                operation: "find_across_shards".to_string(),
                reason: "class is not shard-aware".to_string(),
            }
            .into());
        }
        let shard_ids = self.db.router()?.shard_ids();
        let per_shard =
            try_join_all(shard_ids.iter().map(|id| self.find(filter, Some(id.as_str())))).await?;
        Ok(per_shard.into_iter().flatten().collect())
    }
}
