//! Persistence adapter
//!
//! Translates between instances and stored documents, and shapes the filters
//! a class sends to its partition. Stored documents look like
//! `{ _id, <declared fields>, <submodel field>? }`; the shard id is never
//! written.

use std::sync::Arc;

use serde_json::Value;
use strata_core::{Document, ObjectId, StorageError, StrataResult, SubmodelError, ID_FIELD};
use strata_storage::Filter;

use crate::class::ModelClass;

/// Narrow `filter` to `class`'s discriminator when it is a concrete member
/// of a polymorphic family. Queries through an abstract root are unchanged.
pub fn narrow_filter(class: &ModelClass, filter: &Filter) -> Filter {
    match (class.schema().submodel_field(), class.submodel()) {
        (Some(field), Some(tag)) => filter.clone().eq(field, tag),
        _ => filter.clone(),
    }
}

/// The stored form of an instance's state.
pub fn to_document(class: &ModelClass, id: ObjectId, fields: &Document) -> Document {
    let mut document = Document::new();
    document.insert(ID_FIELD.to_string(), id.to_value());
    for name in class.schema().field_names() {
        let value = fields.get(name).cloned().unwrap_or(Value::Null);
        document.insert(name.to_string(), value);
    }
    if let (Some(field), Some(tag)) = (class.schema().submodel_field(), class.submodel()) {
        document.insert(field.to_string(), Value::from(tag));
    }
    document
}

/// Declared field values of `document` as seen by `class`.
pub fn field_values(class: &ModelClass, document: &Document) -> Document {
    class
        .schema()
        .field_names()
        .map(|name| {
            (
                name.to_string(),
                document.get(name).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

/// Pick the class a stored document belongs to, loading through `class`.
///
/// Non-polymorphic classes load every document as themselves. An abstract
/// root dispatches on the stored discriminator; a concrete member insists the
/// stored discriminator is its own.
pub fn resolve_class(class: &Arc<ModelClass>, document: &Document) -> StrataResult<Arc<ModelClass>> {
    let Some(field) = class.schema().submodel_field() else {
        return Ok(class.clone());
    };

    let stored = match document.get(field) {
        Some(Value::String(tag)) => tag.as_str(),
        _ => {
            return Err(SubmodelError::MissingSubmodel {
                class: class.name().to_string(),
                field: field.to_string(),
            }
            .into())
        }
    };

    match class.submodel() {
        Some(own) if own == stored => Ok(class.clone()),
        Some(own) => Err(SubmodelError::WrongSubmodel {
            class: class.name().to_string(),
            expected: own.to_string(),
            found: stored.to_string(),
        }
        .into()),
        None => class.resolve_submodel(stored)?.ok_or_else(|| {
            SubmodelError::UnknownSubmodel {
                class: class.name().to_string(),
                submodel: stored.to_string(),
            }
            .into()
        }),
    }
}

/// Identifier of a stored document.
pub fn document_id(class: &ModelClass, document: &Document) -> StrataResult<ObjectId> {
    document
        .get(ID_FIELD)
        .and_then(ObjectId::from_value)
        .ok_or_else(|| {
            StorageError::MalformedDocument {
                collection: class.schema().collection().to_string(),
                reason: format!("missing or invalid {ID_FIELD}"),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassBuilder;
    use serde_json::json;
    use strata_core::{FieldDescriptor, SchemaRegistry, StrataError};

    struct Family {
        shape: Arc<ModelClass>,
        circle: Arc<ModelClass>,
        square: Arc<ModelClass>,
    }

    fn family() -> Family {
        let schemas = SchemaRegistry::new();
        let shape = ClassBuilder::new("Shape")
            .polymorphic("submodel")
            .unwrap()
            .field("name", FieldDescriptor::string())
            .unwrap()
            .build(&schemas)
            .unwrap();
        let circle = ClassBuilder::extend(&shape, "Circle")
            .submodel("circle")
            .build(&schemas)
            .unwrap();
        let square = ClassBuilder::extend(&shape, "Square")
            .submodel("square")
            .build(&schemas)
            .unwrap();
        Family {
            shape,
            circle,
            square,
        }
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_narrowing() {
        let f = family();
        let base = Filter::new().eq("name", "x");
        assert_eq!(narrow_filter(&f.shape, &base), base);
        assert_eq!(
            narrow_filter(&f.circle, &base).get("submodel"),
            Some(&json!("circle"))
        );
    }

    #[test]
    fn test_document_carries_discriminator_and_id() {
        let f = family();
        let id = ObjectId::new();
        let mut fields = Document::new();
        fields.insert("name".into(), json!("c"));
        let stored = to_document(&f.circle, id, &fields);
        assert_eq!(stored.get("_id"), Some(&id.to_value()));
        assert_eq!(stored.get("submodel"), Some(&json!("circle")));
        assert_eq!(stored.get("name"), Some(&json!("c")));
        assert!(!stored.contains_key("shard_id"));
        assert_eq!(document_id(&f.circle, &stored).unwrap(), id);
    }

    #[test]
    fn test_dispatch() {
        let f = family();
        let circle_doc = doc(json!({"_id": ObjectId::new().to_string(), "submodel": "circle"}));

        assert_eq!(resolve_class(&f.shape, &circle_doc).unwrap().name(), "Circle");
        assert_eq!(resolve_class(&f.circle, &circle_doc).unwrap().name(), "Circle");
        assert_eq!(
            resolve_class(&f.square, &circle_doc).unwrap_err(),
            StrataError::Submodel(SubmodelError::WrongSubmodel {
                class: "Square".to_string(),
                expected: "square".to_string(),
                found: "circle".to_string()
            })
        );

        let bare = doc(json!({"_id": ObjectId::new().to_string()}));
        assert!(matches!(
            resolve_class(&f.shape, &bare),
            Err(StrataError::Submodel(SubmodelError::MissingSubmodel { .. }))
        ));

        let unknown = doc(json!({"submodel": "hexagon"}));
        assert!(matches!(
            resolve_class(&f.shape, &unknown),
            Err(StrataError::Submodel(SubmodelError::UnknownSubmodel { .. }))
        ));
    }

    #[test]
    fn test_malformed_id() {
        let f = family();
        let stored = doc(json!({"_id": 42}));
        assert!(matches!(
            document_id(&f.shape, &stored),
            Err(StrataError::Storage(StorageError::MalformedDocument { .. }))
        ));
    }
}
