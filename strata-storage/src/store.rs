//! Document-store capability
//!
//! The driver itself is an external collaborator. This module defines the
//! narrow surface strata needs from it: per-collection find/insert/replace/
//! delete/update primitives over JSON documents, and a connector that opens
//! one store per configured partition.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::{Document, IndexSpec, ObjectId, ShardConfig, StrataResult, ID_FIELD};

/// Equality filter on top-level document fields.
///
/// A `null` criterion also matches documents that lack the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Document);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: ObjectId) -> Self {
        Self::new().eq(ID_FIELD, id.to_value())
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Add every criterion of `other`, overriding same-named ones.
    pub fn and(mut self, other: &Filter) -> Self {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.0
            .iter()
            .all(|(k, v)| document.get(k).unwrap_or(&Value::Null) == v)
    }
}

impl From<Document> for Filter {
    fn from(document: Document) -> Self {
        Self(document)
    }
}

/// Field-level update: `$set`, `$unset` and `$inc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    #[serde(rename = "$set", default, skip_serializing_if = "Document::is_empty")]
    pub set: Document,
    #[serde(rename = "$unset", default, skip_serializing_if = "Vec::is_empty")]
    pub unset: Vec<String>,
    #[serde(rename = "$inc", default, skip_serializing_if = "Document::is_empty")]
    pub inc: Document,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    pub fn inc(mut self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.inc.insert(field.into(), by.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.inc.is_empty()
    }

    /// Apply the update to a document in place.
    ///
    /// `$inc` on a missing or non-numeric field starts from zero.
    pub fn apply(&self, document: &mut Document) {
        for (k, v) in &self.set {
            document.insert(k.clone(), v.clone());
        }
        for k in &self.unset {
            document.remove(k);
        }
        for (k, by) in &self.inc {
            let current = document.get(k).cloned().unwrap_or(Value::Null);
            document.insert(k.clone(), add_numbers(&current, by));
        }
    }
}

fn add_numbers(current: &Value, by: &Value) -> Value {
    match (current.as_i64(), by.as_i64()) {
        (Some(a), Some(b)) => Value::from(a.saturating_add(b)),
        (None, Some(b)) if current.is_null() || !current.is_number() => Value::from(b),
        _ => {
            let a = current.as_f64().unwrap_or(0.0);
            let b = by.as_f64().unwrap_or(0.0);
            serde_json::Number::from_f64(a + b)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
    }
}

/// Options for multi-document reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub limit: Option<usize>,
    pub skip: usize,
    /// (field, direction) pairs; direction 1 ascending, -1 descending.
    pub sort: Vec<(String, i32)>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: i32) -> Self {
        self.sort.push((field.into(), direction));
        self
    }

    /// Order, skip and truncate an already-filtered result set.
    pub fn apply(&self, mut documents: Vec<Document>) -> Vec<Document> {
        if !self.sort.is_empty() {
            documents.sort_by(|a, b| {
                for (field, direction) in &self.sort {
                    let ord = compare_values(
                        a.get(field).unwrap_or(&Value::Null),
                        b.get(field).unwrap_or(&Value::Null),
                    );
                    let ord = if *direction < 0 { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        let iter = documents.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// Total order over JSON values used for sorting:
/// null < boolean < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Which version of the document `find_one_and_update` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    Before,
    #[default]
    After,
}

/// Document-store handle for one partition.
///
/// Implementations must be thread-safe. Errors are returned unchanged to
/// the caller; strata never retries a store call.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get the first document matching `filter`.
    async fn find_one(&self, collection: &str, filter: &Filter) -> StrataResult<Option<Document>>;

    /// Get all documents matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StrataResult<Vec<Document>>;

    /// Count documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Filter) -> StrataResult<u64>;

    /// Insert a new document. Fails if its `_id` already exists.
    async fn insert_one(&self, collection: &str, document: Document) -> StrataResult<()>;

    /// Replace the first matching document. Returns the matched count.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> StrataResult<u64>;

    /// Delete the first matching document. Returns the deleted count.
    async fn delete_one(&self, collection: &str, filter: &Filter) -> StrataResult<u64>;

    /// Delete every matching document. Returns the deleted count.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> StrataResult<u64>;

    /// Update every matching document. Returns the modified count.
    async fn update_many(&self, collection: &str, filter: &Filter, update: &Update)
        -> StrataResult<u64>;

    /// Atomically update the first matching document and return it.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        returning: ReturnDocument,
    ) -> StrataResult<Option<Document>>;

    /// Create an index. The spec is passed through uninterpreted.
    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> StrataResult<()>;

    /// Release the connection.
    async fn close(&self) -> StrataResult<()> {
        Ok(())
    }
}

/// Opens a [`DocumentStore`] for a configured partition.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(
        &self,
        partition: &str,
        config: &ShardConfig,
    ) -> StrataResult<Arc<dyn DocumentStore>>;
}
