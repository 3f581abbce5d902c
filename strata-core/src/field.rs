//! Field descriptors
//!
//! A [`FieldDescriptor`] carries everything the validator and the instance
//! factory need to know about one declared field: its semantic type, the
//! required/restricted/rejected/auto-trim flags, and an optional default.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Semantic type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Any,
    Number,
    String,
    Boolean,
    Array,
    Object,
    /// RFC 3339 timestamp stored as a string.
    Datetime,
    /// Hyphenated UUID stored as a string.
    Identifier,
}

impl SemanticType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            SemanticType::Any => "any",
            SemanticType::Number => "number",
            SemanticType::String => "string",
            SemanticType::Boolean => "boolean",
            SemanticType::Array => "array",
            SemanticType::Object => "object",
            SemanticType::Datetime => "datetime",
            SemanticType::Identifier => "identifier",
        }
    }

    /// Whether a non-null value conforms to this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            SemanticType::Any => true,
            SemanticType::Number => value.is_number(),
            SemanticType::String => value.is_string(),
            SemanticType::Boolean => value.is_boolean(),
            SemanticType::Array => value.is_array(),
            SemanticType::Object => value.is_object(),
            SemanticType::Datetime => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            SemanticType::Identifier => value
                .as_str()
                .is_some_and(|s| Uuid::parse_str(s).is_ok()),
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Name of the JSON type actually found in a value.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Generator invoked once per new instance.
pub type DefaultGenerator = Arc<dyn Fn() -> Value + Send + Sync>;

/// Default applied by the instance factory when input omits a field.
#[derive(Clone)]
pub enum DefaultValue {
    /// Cloned into every new instance, so containers are never shared.
    Value(Value),
    Generator(DefaultGenerator),
}

impl DefaultValue {
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Generator(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultValue::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

/// Declared metadata for a single field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name; filled in when the field is declared on a class.
    pub name: String,
    pub semantic_type: SemanticType,
    /// Null (or empty after trimming) is rejected.
    pub required: bool,
    /// Omitted from default serialization.
    pub restricted: bool,
    /// Settable only at creation; ignored by partial updates.
    pub rejected: bool,
    /// Trim string values before the required check.
    pub auto_trim: bool,
    pub default: Option<DefaultValue>,
}

impl FieldDescriptor {
    /// Create a descriptor of the given type with all flags cleared.
    ///
    /// String fields are the exception: they trim by default.
    pub fn new(semantic_type: SemanticType) -> Self {
        Self {
            name: String::new(),
            semantic_type,
            required: false,
            restricted: false,
            rejected: false,
            auto_trim: semantic_type == SemanticType::String,
            default: None,
        }
    }

    pub fn any() -> Self {
        Self::new(SemanticType::Any)
    }

    pub fn number() -> Self {
        Self::new(SemanticType::Number)
    }

    pub fn string() -> Self {
        Self::new(SemanticType::String)
    }

    pub fn boolean() -> Self {
        Self::new(SemanticType::Boolean)
    }

    pub fn array() -> Self {
        Self::new(SemanticType::Array)
    }

    pub fn object() -> Self {
        Self::new(SemanticType::Object)
    }

    pub fn datetime() -> Self {
        Self::new(SemanticType::Datetime)
    }

    pub fn identifier() -> Self {
        Self::new(SemanticType::Identifier)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn restricted(mut self) -> Self {
        self.restricted = true;
        self
    }

    pub fn rejected(mut self) -> Self {
        self.rejected = true;
        self
    }

    /// Keep surrounding whitespace on string values.
    pub fn no_trim(mut self) -> Self {
        self.auto_trim = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Generator(Arc::new(generator)));
        self
    }

    /// Value a new instance starts with when input omits this field.
    pub fn initial_value(&self) -> Value {
        self.default
            .as_ref()
            .map(DefaultValue::produce)
            .unwrap_or(Value::Null)
    }
}
