//! Field validation
//!
//! Validation is pure apart from one documented side effect: string values
//! on auto-trim fields are trimmed in place before the required check.

use crate::error::ValidationError;
use crate::field::{value_type_name, FieldDescriptor};
use crate::schema::ClassSchema;
use crate::Document;
use serde_json::Value;

/// Check one value against its descriptor.
pub fn validate_field(
    class: &str,
    descriptor: &FieldDescriptor,
    value: &mut Value,
) -> Result<(), ValidationError> {
    if descriptor.auto_trim {
        if let Value::String(s) = value {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                *s = trimmed.to_string();
            }
        }
    }

    let missing = match value {
        Value::Null => true,
        Value::String(s) => descriptor.required && s.is_empty(),
        _ => false,
    };
    if missing {
        if descriptor.required {
            return Err(ValidationError::FieldRequired {
                class: class.to_string(),
                field: descriptor.name.clone(),
            });
        }
        return Ok(());
    }

    if !descriptor.semantic_type.accepts(value) {
        return Err(ValidationError::TypeMismatch {
            class: class.to_string(),
            field: descriptor.name.clone(),
            expected: descriptor.semantic_type.type_name().to_string(),
            actual: value_type_name(value).to_string(),
        });
    }
    Ok(())
}

/// Validate every declared field of `values`, in declaration order.
///
/// Fields absent from `values` are treated as null.
pub fn validate_fields(schema: &ClassSchema, values: &mut Document) -> Result<(), ValidationError> {
    for descriptor in schema.fields() {
        let value = values
            .entry(descriptor.name.clone())
            .or_insert(Value::Null);
        validate_field(schema.class_name(), descriptor, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;
    use proptest::prelude::*;
    use serde_json::json;

    fn user_schema() -> ClassSchema {
        SchemaBuilder::new("User")
            .field("username", FieldDescriptor::string().required())
            .unwrap()
            .field("age", FieldDescriptor::number())
            .unwrap()
            .field("motto", FieldDescriptor::string().no_trim())
            .unwrap()
            .build()
    }

    #[test]
    fn test_required_null_rejected() {
        let schema = user_schema();
        let mut values = Document::new();
        let err = validate_fields(&schema, &mut values).unwrap_err();
        assert_eq!(
            err,
            ValidationError::FieldRequired {
                class: "User".to_string(),
                field: "username".to_string(),
            }
        );
    }

    #[test]
    fn test_whitespace_only_counts_as_empty() {
        let schema = user_schema();
        let mut values = Document::new();
        values.insert("username".into(), json!("   "));
        let err = validate_fields(&schema, &mut values).unwrap_err();
        assert!(matches!(err, ValidationError::FieldRequired { .. }));
    }

    #[test]
    fn test_trim_mutates_in_place() {
        let schema = user_schema();
        let mut values = Document::new();
        values.insert("username".into(), json!(" bob "));
        values.insert("motto".into(), json!("  keep  "));

        validate_fields(&schema, &mut values).unwrap();
        assert_eq!(values["username"], json!("bob"));
        assert_eq!(values["motto"], json!("  keep  "));
    }

    #[test]
    fn test_type_mismatch_reported() {
        let schema = user_schema();
        let mut values = Document::new();
        values.insert("username".into(), json!("bob"));
        values.insert("age".into(), json!("forty"));

        let err = validate_fields(&schema, &mut values).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TypeMismatch {
                class: "User".to_string(),
                field: "age".to_string(),
                expected: "number".to_string(),
                actual: "string".to_string(),
            }
        );
    }

    #[test]
    fn test_null_allowed_on_optional_fields() {
        let schema = user_schema();
        let mut values = Document::new();
        values.insert("username".into(), json!("bob"));
        values.insert("age".into(), Value::Null);
        assert!(validate_fields(&schema, &mut values).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Validation is idempotent: a second pass sees the same values.
        #[test]
        fn prop_validation_idempotent(name in "[ a-z]{0,12}", age in proptest::option::of(0i64..120)) {
            let schema = user_schema();
            let mut values = Document::new();
            values.insert("username".into(), json!(name));
            if let Some(age) = age {
                values.insert("age".into(), json!(age));
            }

            let first = validate_fields(&schema, &mut values);
            let snapshot = values.clone();
            let second = validate_fields(&schema, &mut values);

            prop_assert_eq!(first, second);
            prop_assert_eq!(snapshot, values);
        }
    }
}
