//! Model classes
//!
//! A [`ModelClass`] is the runtime handle of one defined class: its immutable
//! schema, its submodel tag when it is a concrete member of a polymorphic
//! family, and its async computed properties. Classes are defined once with
//! [`ClassBuilder`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use serde_json::Value;
use strata_core::{
    ClassSchema, FieldDescriptor, IndexSpec, SchemaBuilder, SchemaError, SchemaRegistry,
    StorageError, StrataResult, SubmodelError,
};

use crate::instance::Model;

/// An async property computed from an instance when it is serialized.
pub type ComputedFn = Arc<dyn Fn(&Model) -> BoxFuture<'static, StrataResult<Value>> + Send + Sync>;

/// Submodel tag → concrete class, shared by every class of one family.
struct SubmodelTable {
    root: String,
    members: RwLock<HashMap<String, Arc<ModelClass>>>,
}

impl SubmodelTable {
    fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            members: RwLock::new(HashMap::new()),
        }
    }
}

/// A defined class.
pub struct ModelClass {
    schema: Arc<ClassSchema>,
    submodel: Option<String>,
    family: Option<Arc<SubmodelTable>>,
    computed: Vec<(String, ComputedFn)>,
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClass")
            .field("name", &self.schema.class_name())
            .field("collection", &self.schema.collection())
            .field("submodel", &self.submodel)
            .field(
                "computed",
                &self.computed.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ModelClass {
    pub fn name(&self) -> &str {
        self.schema.class_name()
    }

    pub fn schema(&self) -> &Arc<ClassSchema> {
        &self.schema
    }

    /// This class's own discriminator, if it is a concrete family member.
    pub fn submodel(&self) -> Option<&str> {
        self.submodel.as_deref()
    }

    pub fn is_polymorphic(&self) -> bool {
        self.schema.is_polymorphic()
    }

    /// A polymorphic class without a discriminator of its own.
    pub fn is_abstract(&self) -> bool {
        self.schema.is_polymorphic() && self.submodel.is_none()
    }

    pub fn computed(&self) -> &[(String, ComputedFn)] {
        &self.computed
    }

    /// Concrete class registered for `tag` in this class's family.
    pub fn resolve_submodel(&self, tag: &str) -> StrataResult<Option<Arc<ModelClass>>> {
        let Some(family) = &self.family else {
            return Err(SubmodelError::NotPolymorphic {
                class: self.name().to_string(),
            }
            .into());
        };
        let members = family
            .members
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(members.get(tag).cloned())
    }

    /// Registered discriminators of this class's family, sorted.
    pub fn submodel_tags(&self) -> StrataResult<Vec<String>> {
        let Some(family) = &self.family else {
            return Ok(Vec::new());
        };
        let members = family
            .members
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut tags: Vec<String> = members.keys().cloned().collect();
        tags.sort();
        Ok(tags)
    }
}

/// Defines a class: fields, collection, polymorphism and computed properties.
///
/// ```ignore
/// let schemas = SchemaRegistry::new();
/// let shape = ClassBuilder::new("Shape").polymorphic("submodel")?.build(&schemas)?;
/// let circle = ClassBuilder::extend(&shape, "Circle")
///     .submodel("circle")
///     .field("radius", FieldDescriptor::number().required())?
///     .build(&schemas)?;
/// ```
pub struct ClassBuilder {
    schema: SchemaBuilder,
    parent: Option<Arc<ModelClass>>,
    submodel: Option<String>,
    new_family: bool,
    computed: Vec<(String, ComputedFn)>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_schema(SchemaBuilder::new(name), None)
    }

    /// A class whose instances live in named shards.
    pub fn sharded(name: impl Into<String>) -> Self {
        Self::from_schema(SchemaBuilder::sharded(name), None)
    }

    /// A subclass of `parent`, inheriting its fields, computed properties
    /// and family.
    pub fn extend(parent: &Arc<ModelClass>, name: impl Into<String>) -> Self {
        let mut builder = Self::from_schema(
            SchemaBuilder::extend(parent.schema(), name),
            Some(parent.clone()),
        );
        builder.computed = parent.computed.clone();
        builder
    }

    fn from_schema(schema: SchemaBuilder, parent: Option<Arc<ModelClass>>) -> Self {
        Self {
            schema,
            parent,
            submodel: None,
            new_family: false,
            computed: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> StrataResult<Self> {
        self.schema.declare_field(name, descriptor)?;
        Ok(self)
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.schema = self.schema.collection(collection);
        self
    }

    /// Make this class the root of a polymorphic family discriminated by
    /// `submodel_field`.
    pub fn polymorphic(mut self, submodel_field: impl Into<String>) -> StrataResult<Self> {
        self.schema = self.schema.polymorphic(submodel_field)?;
        self.new_family = true;
        Ok(self)
    }

    /// Give this class its own discriminator, registering it in its family.
    pub fn submodel(mut self, tag: impl Into<String>) -> Self {
        self.submodel = Some(tag.into());
        self
    }

    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.schema = self.schema.index(spec);
        self
    }

    /// Declare an async computed property, replacing one of the same name.
    pub fn computed<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Model) -> BoxFuture<'static, StrataResult<Value>> + Send + Sync + 'static,
    {
        let name = name.into();
        let compute: ComputedFn = Arc::new(compute);
        match self.computed.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = compute,
            None => self.computed.push((name, compute)),
        }
        self
    }

    /// Finish the class and register its schema.
    pub fn build(self, schemas: &SchemaRegistry) -> StrataResult<Arc<ModelClass>> {
        let class_name = self.schema.class_name().to_string();

        let family = if self.new_family {
            Some(Arc::new(SubmodelTable::new(class_name.clone())))
        } else {
            self.parent.as_ref().and_then(|p| p.family.clone())
        };

        let submodel = match (&self.submodel, &self.parent) {
            (Some(tag), parent) => {
                if tag.is_empty() {
                    return Err(SchemaError::InvalidName {
                        kind: "submodel".to_string(),
                        name: tag.clone(),
                    }
                    .into());
                }
                let Some(family) = &family else {
                    return Err(SubmodelError::NotPolymorphic { class: class_name }.into());
                };
                if let Some(existing) = parent.as_ref().and_then(|p| p.submodel.clone()) {
                    return Err(SubmodelError::AlreadyConcrete {
                        class: parent.as_ref().map(|p| p.name().to_string()).unwrap_or_default(),
                        submodel: existing,
                    }
                    .into());
                }
                Some(tag.clone())
            }
            // Plain subclasses of a concrete member keep its discriminator.
            (None, Some(parent)) if !self.new_family => parent.submodel.clone(),
            (None, _) => None,
        };

        let class = match (self.submodel, family) {
            (Some(tag), Some(family)) => {
                // The tag check, schema registration and tag insert share one
                // family lock, so a rejected class leaves no trace anywhere.
                let mut members = family
                    .members
                    .write()
                    .map_err(|_| StorageError::LockPoisoned)?;
                if members.contains_key(&tag) {
                    return Err(SubmodelError::DuplicateRegistration {
                        class: family.root.clone(),
                        submodel: tag,
                    }
                    .into());
                }
                let class = Arc::new(ModelClass {
                    schema: schemas.register(self.schema.build())?,
                    submodel,
                    family: Some(family.clone()),
                    computed: self.computed,
                });
                members.insert(tag.clone(), class.clone());
                tracing::debug!(class = %class.name(), submodel = %tag, root = %family.root, "Registered submodel");
                class
            }
            (_, family) => Arc::new(ModelClass {
                schema: schemas.register(self.schema.build())?,
                submodel,
                family,
                computed: self.computed,
            }),
        };

        Ok(class)
    }
}
