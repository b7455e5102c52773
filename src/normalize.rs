//! Value normalization for typed index fields.

use serde_json::Value;

use crate::models::DataType;

/// Convert a raw JSON value into the representation a field of `data_type`
/// expects on the wire.
///
/// - `null` stays `null`; callers drop the field.
/// - `Edm.String`: strings unchanged, objects and arrays become compact JSON
///   text (non-ASCII kept as-is), other scalars their JSON text.
/// - Anything else passes through for the service to validate.
pub fn normalize_value(value: &Value, data_type: &DataType) -> Value {
    match (value, data_type) {
        (Value::Null, _) => Value::Null,
        (Value::String(_), DataType::String) => value.clone(),
        (Value::Object(_) | Value::Array(_), DataType::String) => {
            Value::String(value.to_string())
        }
        (Value::Bool(b), DataType::String) => Value::String(b.to_string()),
        (Value::Number(n), DataType::String) => Value::String(n.to_string()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_passes_through() {
        assert_eq!(normalize_value(&Value::Null, &DataType::String), Value::Null);
        assert_eq!(normalize_value(&Value::Null, &DataType::Double), Value::Null);
    }

    #[test]
    fn test_string_unchanged() {
        assert_eq!(normalize_value(&json!("x"), &DataType::String), json!("x"));
    }

    #[test]
    fn test_object_becomes_json_text() {
        let out = normalize_value(&json!({"a": 1}), &DataType::String);
        let text = out.as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, json!({"a": 1}));
        assert!(!text.contains(' '));
    }

    #[test]
    fn test_non_ascii_preserved() {
        let out = normalize_value(&json!(["café", "東京"]), &DataType::String);
        assert_eq!(out, json!("[\"café\",\"東京\"]"));
    }

    #[test]
    fn test_scalars_stringified() {
        assert_eq!(normalize_value(&json!(42), &DataType::String), json!("42"));
        assert_eq!(normalize_value(&json!(0.5), &DataType::String), json!("0.5"));
        assert_eq!(normalize_value(&json!(true), &DataType::String), json!("true"));
    }

    #[test]
    fn test_other_types_untouched() {
        assert_eq!(normalize_value(&json!("0.5"), &DataType::Double), json!("0.5"));
        assert_eq!(normalize_value(&json!({"a": 1}), &DataType::ComplexType), json!({"a": 1}));
        assert_eq!(
            normalize_value(&json!(["a"]), &DataType::Collection(Box::new(DataType::String))),
            json!(["a"])
        );
    }
}
