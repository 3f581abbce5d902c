//! Model instances
//!
//! Instances are created only by a [`ModelHandle`](crate::ModelHandle): either
//! made from input data or loaded from a stored document. An instance with no
//! identifier is new; saving assigns one, destroying clears it again.

use std::fmt;
use std::sync::Arc;

use futures_util::future::try_join_all;
use serde_json::Value;
use strata_core::{
    validate_fields, Document, ModelError, ObjectId, StrataResult, SubmodelError, ID_FIELD,
    SHARD_ID_FIELD,
};
use strata_storage::{Cache, CacheKeyArg, Database, Filter, Partition, ReturnDocument, Update};

use crate::class::ModelClass;
use crate::persistence::{document_id, field_values, narrow_filter, resolve_class, to_document};

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Made, not yet validated.
    New,
    Valid,
    Invalid,
    Persisted,
    /// Deleted from the store. The in-memory values remain readable.
    Destroyed,
}

/// One instance of a [`ModelClass`].
pub struct Model {
    db: Arc<Database>,
    class: Arc<ModelClass>,
    id: Option<ObjectId>,
    shard_id: Option<String>,
    fields: Document,
    validated: Option<bool>,
    destroyed: bool,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("class", &self.class.name())
            .field("id", &self.id)
            .field("shard_id", &self.shard_id)
            .field("fields", &self.fields)
            .field("state", &self.state())
            .finish()
    }
}

impl Model {
    // ========================================================================
    // CONSTRUCTION
    // ========================================================================

    /// Make a new instance from `data`.
    ///
    /// Each declared field takes its non-null input value, else its default,
    /// else null. Undeclared keys and any `_id` are ignored.
    pub(crate) fn make(db: Arc<Database>, class: Arc<ModelClass>, mut data: Document) -> StrataResult<Self> {
        if class.is_abstract() {
            return Err(SubmodelError::AbstractClass {
                class: class.name().to_string(),
            }
            .into());
        }
        if let Some(field) = class.schema().submodel_field() {
            if data.contains_key(field) {
                return Err(SubmodelError::ExplicitDiscriminator {
                    class: class.name().to_string(),
                    field: field.to_string(),
                }
                .into());
            }
        }

        let shard_id = if class.schema().is_shard_aware() {
            match data.remove(SHARD_ID_FIELD) {
                Some(Value::String(s)) => Some(s),
                _ => None,
            }
        } else {
            None
        };

        let mut fields = Document::new();
        for descriptor in class.schema().fields() {
            let value = match data.remove(&descriptor.name) {
                Some(v) if !v.is_null() => v,
                _ => descriptor.initial_value(),
            };
            fields.insert(descriptor.name.clone(), value);
        }

        Ok(Self {
            db,
            class,
            id: None,
            shard_id,
            fields,
            validated: None,
            destroyed: false,
        })
    }

    /// Load a stored document through `class`, dispatching to the concrete
    /// family member it belongs to.
    pub(crate) fn load(
        db: Arc<Database>,
        class: &Arc<ModelClass>,
        document: &Document,
        shard_id: Option<&str>,
    ) -> StrataResult<Self> {
        let class = resolve_class(class, document)?;
        let id = document_id(&class, document)?;
        let fields = field_values(&class, document);
        let shard_id = class
            .schema()
            .is_shard_aware()
            .then(|| shard_id.map(str::to_string))
            .flatten();
        Ok(Self {
            db,
            class,
            id: Some(id),
            shard_id,
            fields,
            validated: Some(true),
            destroyed: false,
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn class(&self) -> &Arc<ModelClass> {
        &self.class
    }

    pub fn state(&self) -> ModelState {
        if self.id.is_some() {
            return ModelState::Persisted;
        }
        if self.destroyed {
            return ModelState::Destroyed;
        }
        match self.validated {
            None => ModelState::New,
            Some(true) => ModelState::Valid,
            Some(false) => ModelState::Invalid,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn shard_id(&self) -> Option<&str> {
        self.shard_id.as_deref()
    }

    pub fn submodel(&self) -> Option<&str> {
        self.class.submodel()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Document {
        &self.fields
    }

    /// Set one declared field in memory. Nothing is written until `save`.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> StrataResult<()> {
        if !self.class.schema().has_field(field) {
            return Err(ModelError::UnknownField {
                class: self.class.name().to_string(),
                field: field.to_string(),
            }
            .into());
        }
        self.fields.insert(field.to_string(), value.into());
        self.validated = None;
        Ok(())
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Check every declared field, trimming auto-trim strings in place.
    pub fn validate(&mut self) -> StrataResult<()> {
        let result = validate_fields(self.class.schema(), &mut self.fields);
        self.validated = Some(result.is_ok());
        result.map_err(Into::into)
    }

    fn partition(&self) -> StrataResult<Arc<Partition>> {
        self.db
            .router()?
            .resolve_partition(self.class.schema(), self.shard_id.as_deref())
    }

    fn require_id(&self, method: &str) -> StrataResult<ObjectId> {
        self.id.ok_or_else(|| {
            ModelError::NotPersisted {
                class: self.class.name().to_string(),
                method: method.to_string(),
            }
            .into()
        })
    }

    fn destroyed_error(&self, id: ObjectId) -> ModelError {
        ModelError::ModelDestroyed {
            class: self.class.name().to_string(),
            id: id.to_string(),
        }
    }

    /// Validate and write the instance.
    ///
    /// A new instance is inserted under a fresh identifier; a persisted one
    /// replaces its stored document.
    pub async fn save(&mut self) -> StrataResult<()> {
        self.validate()?;
        let partition = self.partition()?;
        let collection = self.class.schema().collection();

        match self.id {
            None => {
                let id = ObjectId::new();
                let document = to_document(&self.class, id, &self.fields);
                partition.insert(collection, document).await?;
                self.id = Some(id);
                self.destroyed = false;
                tracing::debug!(class = %self.class.name(), id = %id, partition = %partition.id(), "Inserted instance");
            }
            Some(id) => {
                let document = to_document(&self.class, id, &self.fields);
                let filter = narrow_filter(&self.class, &Filter::by_id(id));
                let matched = partition.replace(collection, &filter, document).await?;
                if matched == 0 {
                    return Err(self.destroyed_error(id).into());
                }
                tracing::debug!(class = %self.class.name(), id = %id, partition = %partition.id(), "Replaced instance");
            }
        }
        Ok(())
    }

    /// Apply `partial` to declared fields, then save.
    ///
    /// Rejected fields, undeclared keys and `_id` are skipped silently.
    pub async fn update(&mut self, partial: Document) -> StrataResult<()> {
        for (name, value) in partial {
            if name == ID_FIELD {
                continue;
            }
            match self.class.schema().field(&name) {
                Some(descriptor) if !descriptor.rejected => {
                    self.fields.insert(name, value);
                }
                _ => {}
            }
        }
        self.validated = None;
        self.save().await
    }

    /// Delete the stored document and clear the identifier. No-op when new.
    pub async fn destroy(&mut self) -> StrataResult<()> {
        let Some(id) = self.id else {
            return Ok(());
        };
        let partition = self.partition()?;
        let filter = narrow_filter(&self.class, &Filter::by_id(id));
        partition
            .delete_one(self.class.schema().collection(), &filter)
            .await?;
        self.id = None;
        self.destroyed = true;
        tracing::debug!(class = %self.class.name(), id = %id, "Destroyed instance");
        Ok(())
    }

    /// Overwrite every field with the stored values.
    pub async fn reload(&mut self) -> StrataResult<()> {
        let id = self.require_id("reload")?;
        let partition = self.partition()?;
        let filter = narrow_filter(&self.class, &Filter::by_id(id));
        let Some(document) = partition
            .find_one(self.class.schema().collection(), &filter)
            .await?
        else {
            tracing::warn!(class = %self.class.name(), id = %id, "Reload of a deleted instance");
            return Err(self.destroyed_error(id).into());
        };
        self.fields = field_values(&self.class, &document);
        self.validated = Some(true);
        Ok(())
    }

    /// Apply `update` in the store if the instance still matches `when`,
    /// refreshing the in-memory fields from the result.
    ///
    /// Returns whether a document matched.
    pub async fn db_update(&mut self, update: &Update, when: Option<&Filter>) -> StrataResult<bool> {
        let id = self.require_id("db_update")?;
        let partition = self.partition()?;
        let mut filter = narrow_filter(&self.class, &Filter::by_id(id));
        if let Some(when) = when {
            filter = when.clone().and(&filter);
        }
        let updated = partition
            .find_one_and_update(
                self.class.schema().collection(),
                &filter,
                update,
                ReturnDocument::After,
            )
            .await?;
        match updated {
            Some(document) => {
                self.fields = field_values(&self.class, &document);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ========================================================================
    // SERIALIZATION
    // ========================================================================

    fn wants(fields: Option<&[&str]>, name: &str) -> bool {
        fields.map_or(true, |names| names.contains(&name))
    }

    /// Plain map of the requested fields, or all declared fields.
    ///
    /// Restricted fields are left out unless `include_restricted` is set.
    /// The identifier and discriminator appear when the instance has them.
    pub fn to_object(&self, fields: Option<&[&str]>, include_restricted: bool) -> Document {
        let mut out = Document::new();
        if let Some(id) = self.id {
            if Self::wants(fields, ID_FIELD) {
                out.insert(ID_FIELD.to_string(), id.to_value());
            }
        }
        for descriptor in self.class.schema().fields() {
            if !Self::wants(fields, &descriptor.name) {
                continue;
            }
            if descriptor.restricted && !include_restricted {
                continue;
            }
            if let Some(value) = self.fields.get(&descriptor.name) {
                out.insert(descriptor.name.clone(), value.clone());
            }
        }
        if let (Some(field), Some(tag)) = (self.class.schema().submodel_field(), self.class.submodel()) {
            if Self::wants(fields, field) {
                out.insert(field.to_string(), Value::from(tag));
            }
        }
        out
    }

    /// [`to_object`](Self::to_object) plus the class's computed properties,
    /// resolved concurrently.
    pub async fn to_object_async(
        &self,
        fields: Option<&[&str]>,
        include_restricted: bool,
    ) -> StrataResult<Document> {
        let mut out = self.to_object(fields, include_restricted);
        let pending = self
            .class
            .computed()
            .iter()
            .filter(|(name, _)| Self::wants(fields, name))
            .map(|(name, compute)| {
                let fut = compute(self);
                async move { fut.await.map(|value| (name.clone(), value)) }
            });
        for (name, value) in try_join_all(pending).await? {
            out.insert(name, value);
        }
        Ok(out)
    }

    /// Drop the memoized result of `method(args)` on this instance's class.
    pub async fn invalidate(
        &self,
        cache: &Cache,
        method: &str,
        args: &[&dyn CacheKeyArg],
    ) -> StrataResult<()> {
        cache.invalidate(self.class.name(), method, args).await
    }
}
