//! Class schemas
//!
//! A [`ClassSchema`] is built once per class through a [`SchemaBuilder`] and
//! is immutable afterwards. Subclass builders start from a clone of the
//! parent's field table and extend it, so sibling subclasses never see each
//! other's declarations.

use crate::error::SchemaError;
use crate::field::FieldDescriptor;
use crate::identity::ID_FIELD;
use serde::{Deserialize, Serialize};

/// Reserved input key carrying the shard id of shard-aware instances.
pub const SHARD_ID_FIELD: &str = "shard_id";

/// Discriminator field used when a polymorphic class does not name one.
pub const DEFAULT_SUBMODEL_FIELD: &str = "submodel";

/// Index specification passed through to the document store untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// (field, direction) pairs; direction is 1 or -1.
    pub keys: Vec<(String, i32)>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            keys: vec![(field.into(), 1)],
            unique: false,
            name: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Immutable schema of one class.
#[derive(Debug, Clone)]
pub struct ClassSchema {
    class_name: String,
    parent: Option<String>,
    collection: String,
    fields: Vec<FieldDescriptor>,
    submodel_field: Option<String>,
    indexes: Vec<IndexSpec>,
    shard_aware: bool,
}

impl ClassSchema {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Name of the class this schema was extended from.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Declared fields in declaration order, ancestors first.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Discriminator field, if the class belongs to a polymorphic family.
    pub fn submodel_field(&self) -> Option<&str> {
        self.submodel_field.as_deref()
    }

    pub fn is_polymorphic(&self) -> bool {
        self.submodel_field.is_some()
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn is_shard_aware(&self) -> bool {
        self.shard_aware
    }
}

/// Accumulates field declarations for one class.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema: ClassSchema,
}

impl SchemaBuilder {
    /// Start a schema stored in the meta partition.
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            schema: ClassSchema {
                collection: collection_name_for(&class_name),
                class_name,
                parent: None,
                fields: Vec::new(),
                submodel_field: None,
                indexes: Vec::new(),
                shard_aware: false,
            },
        }
    }

    /// Start a schema whose instances live in named shards.
    pub fn sharded(class_name: impl Into<String>) -> Self {
        let mut builder = Self::new(class_name);
        builder.schema.shard_aware = true;
        builder
    }

    /// Start a subclass schema from a clone of `parent`.
    ///
    /// Members of a polymorphic family share the parent's collection; plain
    /// subclasses get a collection derived from their own name.
    pub fn extend(parent: &ClassSchema, class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        let collection = if parent.is_polymorphic() {
            parent.collection.clone()
        } else {
            collection_name_for(&class_name)
        };
        Self {
            schema: ClassSchema {
                class_name,
                parent: Some(parent.class_name.clone()),
                collection,
                fields: parent.fields.clone(),
                submodel_field: parent.submodel_field.clone(),
                indexes: parent.indexes.clone(),
                shard_aware: parent.shard_aware,
            },
        }
    }

    pub fn class_name(&self) -> &str {
        &self.schema.class_name
    }

    /// Declare a field, replacing any earlier declaration of the same name.
    pub fn declare_field(
        &mut self,
        name: impl Into<String>,
        mut descriptor: FieldDescriptor,
    ) -> Result<(), SchemaError> {
        let name = name.into();
        if name.is_empty() || name == ID_FIELD || name.starts_with('$') {
            return Err(SchemaError::InvalidName {
                kind: "field".to_string(),
                name,
            });
        }
        if self.schema.shard_aware && name == SHARD_ID_FIELD {
            return Err(SchemaError::ReservedField {
                class: self.schema.class_name.clone(),
                field: name,
            });
        }
        if self.schema.submodel_field.as_deref() == Some(name.as_str()) {
            return Err(SchemaError::ReservedField {
                class: self.schema.class_name.clone(),
                field: name,
            });
        }

        descriptor.name = name;
        match self
            .schema
            .fields
            .iter_mut()
            .find(|f| f.name == descriptor.name)
        {
            Some(existing) => *existing = descriptor,
            None => self.schema.fields.push(descriptor),
        }
        Ok(())
    }

    /// Chaining form of [`declare_field`](Self::declare_field).
    pub fn field(
        mut self,
        name: impl Into<String>,
        descriptor: FieldDescriptor,
    ) -> Result<Self, SchemaError> {
        self.declare_field(name, descriptor)?;
        Ok(self)
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.schema.collection = collection.into();
        self
    }

    /// Mark the class as the root of a polymorphic family.
    pub fn polymorphic(mut self, submodel_field: impl Into<String>) -> Result<Self, SchemaError> {
        let field = submodel_field.into();
        if field.is_empty() || field == ID_FIELD || self.schema.has_field(&field) {
            return Err(SchemaError::InvalidName {
                kind: "submodel field".to_string(),
                name: field,
            });
        }
        self.schema.submodel_field = Some(field);
        Ok(self)
    }

    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.schema.indexes.push(spec);
        self
    }

    pub fn build(self) -> ClassSchema {
        self.schema
    }
}

/// Derive a collection name from a class name: `UserProfile` → `user_profile`.
pub fn collection_name_for(class_name: &str) -> String {
    let mut out = String::with_capacity(class_name.len() + 4);
    let mut prev_lower = false;
    for c in class_name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
