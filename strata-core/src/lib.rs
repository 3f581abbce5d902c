//! strata Core - Schemas, Validation and Configuration
//!
//! Pure data structures shared by every other strata crate: field
//! descriptors, immutable class schemas and their registry, the field
//! validator, document identifiers, configuration and the error taxonomy.
//! Nothing in this crate performs I/O.

pub mod config;
pub mod error;
pub mod field;
pub mod identity;
pub mod registry;
pub mod schema;
pub mod validate;

/// A stored document or a plain field map.
pub type Document = serde_json::Map<String, serde_json::Value>;

pub use config::{
    CacheConfig, CacheKind, DatabaseConfig, ShardConfig, DEFAULT_CACHE_PREFIX, META_PARTITION,
};
pub use error::{
    CacheError, ConfigError, ContextError, ModelError, SchemaError, ShardError, StorageError,
    StrataError, StrataResult, SubmodelError, ValidationError,
};
pub use field::{value_type_name, DefaultGenerator, DefaultValue, FieldDescriptor, SemanticType};
pub use identity::{ObjectId, ID_FIELD};
pub use registry::SchemaRegistry;
pub use schema::{
    collection_name_for, ClassSchema, IndexSpec, SchemaBuilder, DEFAULT_SUBMODEL_FIELD,
    SHARD_ID_FIELD,
};
pub use validate::{validate_field, validate_fields};
