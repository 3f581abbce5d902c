//! Identity types for persisted documents

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Name of the identifier field in every persisted document.
pub const ID_FIELD: &str = "_id";

/// Document identifier using UUIDv7 for timestamp-sortable IDs.
///
/// Stored in documents as its hyphenated string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generate a new identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse an identifier out of a stored `_id` value.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().and_then(|s| s.parse().ok())
    }

    pub fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ObjectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_value_roundtrip() {
        let id = ObjectId::new();
        let value = id.to_value();
        assert_eq!(ObjectId::from_value(&value), Some(id));
    }

    #[test]
    fn test_object_id_rejects_non_string() {
        assert_eq!(ObjectId::from_value(&Value::from(42)), None);
        assert_eq!(ObjectId::from_value(&Value::from("not-a-uuid")), None);
    }
}
