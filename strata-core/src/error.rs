//! Error types for strata operations

use thiserror::Error;

/// Field validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Field required: {class}.{field}")]
    FieldRequired { class: String, field: String },

    #[error("Type mismatch on {class}.{field}: expected {expected}, got {actual}")]
    TypeMismatch {
        class: String,
        field: String,
        expected: String,
        actual: String,
    },
}

/// Schema declaration errors, raised while a class is being defined.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Field '{field}' is reserved on shard-aware class {class}")]
    ReservedField { class: String, field: String },

    #[error("Invalid name for {kind}: '{name}'")]
    InvalidName { kind: String, name: String },

    #[error("Class already registered: {class}")]
    DuplicateClass { class: String },
}

/// Model lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("{method} requires a persisted {class} instance")]
    NotPersisted { class: String, method: String },

    #[error("{class} with id {id} no longer exists")]
    ModelDestroyed { class: String, id: String },

    #[error("{operation} is not supported by {class}: {reason}")]
    WrongModelKind {
        class: String,
        operation: String,
        reason: String,
    },

    #[error("Unknown field {class}.{field}")]
    UnknownField { class: String, field: String },
}

/// Shard routing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShardError {
    #[error("Shard-aware class {class} requires a shard id")]
    MissingShardId { class: String },

    #[error("Unknown shard: {shard_id}")]
    UnknownShard { shard_id: String },

    #[error("Shard {shard_id} is read-only")]
    ShardIsReadOnly { shard_id: String },

    #[error("No writable shard available")]
    NoWritableShard,
}

/// Polymorphic (single-table inheritance) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmodelError {
    #[error("Cannot make a new instance of abstract class {class}")]
    AbstractClass { class: String },

    #[error("Cannot set {field} explicitly when making a new {class}")]
    ExplicitDiscriminator { class: String, field: String },

    #[error("Document for {class} has submodel '{found}', expected '{expected}'")]
    WrongSubmodel {
        class: String,
        expected: String,
        found: String,
    },

    #[error("Document for {class} is missing its {field} field")]
    MissingSubmodel { class: String, field: String },

    #[error("No submodel '{submodel}' registered under {class}")]
    UnknownSubmodel { class: String, submodel: String },

    #[error("Submodel '{submodel}' is already registered under {class}")]
    DuplicateRegistration { class: String, submodel: String },

    #[error("Class {class} already has its own submodel '{submodel}'")]
    AlreadyConcrete { class: String, submodel: String },

    #[error("Class {class} is not polymorphic")]
    NotPolymorphic { class: String },
}

/// Document store errors surfaced by store collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Insert failed in {collection}: {reason}")]
    InsertFailed { collection: String, reason: String },

    #[error("Malformed document in {collection}: {reason}")]
    MalformedDocument { collection: String, reason: String },

    #[error("Driver error: {reason}")]
    Driver { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend error: {reason}")]
    Backend { reason: String },

    #[error("Cache serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Database context lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Database context is {state}, expected Ready")]
    NotReady { state: String },

    #[error("Cannot {action} a database context that is {state}")]
    InvalidTransition { action: String, state: String },

    #[error("No cache configured")]
    NoCache,
}

/// Master error type for all strata errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrataError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Shard error: {0}")]
    Shard(#[from] ShardError),

    #[error("Submodel error: {0}")]
    Submodel(#[from] SubmodelError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),
}

/// Result type alias for strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

// =============================================================================
// TESTS
// =============================================================================
