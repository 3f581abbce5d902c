//! Process-wide schema registry
//!
//! Written only while classes are being defined, read for the rest of the
//! process lifetime. Schemas are handed out as `Arc`s and never mutated.

use crate::error::{SchemaError, StorageError, StrataResult};
use crate::schema::ClassSchema;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

static GLOBAL: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::new);

/// Registry of class schemas keyed by class name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<ClassSchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static SchemaRegistry {
        &GLOBAL
    }

    /// Register a finished schema. Each class name may be registered once.
    pub fn register(&self, schema: ClassSchema) -> StrataResult<Arc<ClassSchema>> {
        let mut schemas = self
            .schemas
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if schemas.contains_key(schema.class_name()) {
            return Err(SchemaError::DuplicateClass {
                class: schema.class_name().to_string(),
            }
            .into());
        }
        let schema = Arc::new(schema);
        schemas.insert(schema.class_name().to_string(), schema.clone());
        Ok(schema)
    }

    /// Schema of a registered class, including everything inherited.
    pub fn schema_of(&self, class_name: &str) -> StrataResult<Option<Arc<ClassSchema>>> {
        let schemas = self
            .schemas
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(schemas.get(class_name).cloned())
    }

    pub fn class_names(&self) -> StrataResult<Vec<String>> {
        let schemas = self
            .schemas
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut names: Vec<String> = schemas.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
