//! Structural validation of tool arguments
//!
//! A gate, not a transform: on success the input is handed back untouched.

use serde_json::Value;

use crate::error::{Result, ServerError};

/// Expected JSON type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate that `data` is an object carrying every required field with the
/// declared types.
///
/// All missing fields are reported together. Type checks apply only to fields
/// that are present.
pub fn validate<'a>(
    data: &'a Value,
    required_fields: &[&str],
    field_types: Option<&[(&str, FieldType)]>,
) -> Result<&'a Value> {
    let object = data
        .as_object()
        .ok_or_else(|| ServerError::validation("Input must be a JSON object"))?;

    let missing: Vec<&str> = required_fields
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(ServerError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        ))
        .with_detail("missing_fields", missing));
    }

    for (field, expected) in field_types.unwrap_or_default() {
        if let Some(value) = object.get(*field) {
            if !expected.matches(value) {
                return Err(ServerError::validation(format!(
                    "Field '{}' must be of type {}",
                    field, expected
                ))
                .with_detail("field", *field)
                .with_detail("expected_type", expected.as_str()));
            }
        }
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_valid_input_is_returned_unchanged() {
        let data = json!({"nip": "7342867148", "extra": 1});
        let out = validate(&data, &["nip"], Some(&[("nip", FieldType::String)])).unwrap();
        assert_eq!(out, &data);
    }

    #[test]
    fn test_non_object_is_rejected() {
        let err = validate(&json!(["nip"]), &[], None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert!(err.message().contains("object"));
    }

    #[test]
    fn test_lists_every_missing_field() {
        let err = validate(&json!({"x": 1}), &["regon", "report_name"], None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert!(err.message().contains("regon"));
        assert!(err.message().contains("report_name"));
        assert_eq!(
            err.details().get("missing_fields"),
            Some(&json!(["regon", "report_name"]))
        );
    }

    #[test]
    fn test_wrong_type_names_field_and_type() {
        let err = validate(
            &json!({"nips": "7342867148"}),
            &["nips"],
            Some(&[("nips", FieldType::Array)]),
        )
        .unwrap_err();
        assert_eq!(err.message(), "Field 'nips' must be of type array");
    }

    #[test]
    fn test_absent_optional_field_skips_type_check() {
        let data = json!({});
        assert!(validate(&data, &[], Some(&[("limit", FieldType::Integer)])).is_ok());
    }

    #[test]
    fn test_integer_vs_number() {
        assert!(FieldType::Integer.matches(&json!(3)));
        assert!(!FieldType::Integer.matches(&json!(3.5)));
        assert!(FieldType::Number.matches(&json!(3.5)));
    }
}
