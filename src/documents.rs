//! Turning input records into upload-ready documents.

use serde_json::{Map, Value};

use crate::error::{PrepError, Result};
use crate::models::{DataType, Document, Embedding};
use crate::normalize::normalize_value;
use crate::schema::Schema;

/// Key field used when the schema has none.
pub const DEFAULT_KEY_FIELD: &str = "id";

/// Placeholder key for the record at `row_index`.
pub fn row_key(row_index: usize) -> String {
    format!("row-{}", row_index)
}

/// Build one document per record.
///
/// Only fields declared in `schema` are projected, through
/// [`normalize_value`]; values that normalize to `null` are left out. Each
/// document then gets:
/// - the key field, set to `row-<index>` if the record had none,
/// - the content field, set to `""` if the record had none,
/// - the embedding, written last under `embedding_field`.
///
/// A record value under `embedding_field` is never projected.
///
/// `records` and `embeddings` must have the same length.
pub fn build_documents(
    records: &[Map<String, Value>],
    schema: &Schema,
    content_field: &str,
    embedding_field: &str,
    embeddings: &[Vec<f32>],
) -> Result<Vec<Document>> {
    if records.len() != embeddings.len() {
        return Err(PrepError::Embedding(format!(
            "got {} embeddings for {} records",
            embeddings.len(),
            records.len()
        )));
    }

    let key_field = schema
        .key_field()
        .map(|f| f.name.as_str())
        .unwrap_or(DEFAULT_KEY_FIELD);

    let documents = records
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(row_index, (record, embedding))| {
            let mut fields = Map::new();
            for field in &schema.fields {
                if field.name == embedding_field {
                    continue;
                }
                if let Some(raw) = record.get(&field.name) {
                    let value = normalize_value(raw, &field.data_type);
                    if !value.is_null() {
                        fields.insert(field.name.clone(), value);
                    }
                }
            }

            let key = match fields.get(key_field) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    let key = row_key(row_index);
                    fields.insert(key_field.to_string(), Value::String(key.clone()));
                    key
                }
            };

            fields
                .entry(content_field.to_string())
                .or_insert_with(|| Value::String(String::new()));

            Document {
                key,
                fields,
                embedding: Some(Embedding {
                    field: embedding_field.to_string(),
                    values: embedding.clone(),
                }),
            }
        })
        .collect();

    Ok(documents)
}

/// Text to embed for each record: the normalized content value, or `""`.
pub fn content_texts(records: &[Map<String, Value>], schema: &Schema, content_field: &str) -> Vec<String> {
    let data_type = schema
        .field(content_field)
        .map(|f| f.data_type.clone())
        .unwrap_or(DataType::String);

    records
        .iter()
        .map(|record| {
            let raw = record.get(content_field).unwrap_or(&Value::Null);
            match normalize_value(raw, &data_type) {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_value(&json!({"fields": [
            {"name": "id", "type": "Edm.String", "key": true},
            {"name": "content", "type": "Edm.String"},
            {"name": "tags", "type": "Edm.String"},
            {"name": "availability", "type": "Edm.Double"}
        ]}))
        .unwrap()
    }

    fn records(values: Vec<Value>) -> Vec<Map<String, Value>> {
        values
            .into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_defaults_for_missing_key_and_content() {
        let recs = records(vec![json!({}), json!({}), json!({}), json!({"other": 1})]);
        let embeddings = vec![vec![0.5f32]; 4];
        let docs = build_documents(&recs, &schema(), "content", "embedding", &embeddings).unwrap();
        let doc = &docs[3];
        assert_eq!(doc.key, "row-3");
        assert_eq!(doc.fields["id"], json!("row-3"));
        assert_eq!(doc.fields["content"], json!(""));
        assert!(!doc.fields.contains_key("other"));
    }

    #[test]
    fn test_projection_and_normalization() {
        let recs = records(vec![json!({
            "id": 7,
            "content": "hello",
            "tags": ["a", "b"],
            "availability": 0.5,
            "ignored": true
        })]);
        let docs =
            build_documents(&recs, &schema(), "content", "embedding", &[vec![1.0, 2.0]]).unwrap();
        let doc = &docs[0];
        assert_eq!(doc.key, "7");
        assert_eq!(doc.fields["id"], json!("7"));
        assert_eq!(doc.fields["tags"], json!("[\"a\",\"b\"]"));
        assert_eq!(doc.fields["availability"], json!(0.5));
        assert_eq!(doc.embedding.as_ref().unwrap().values, vec![1.0, 2.0]);
        assert!(!doc.fields.contains_key("embedding"));
        assert!(!doc.fields.contains_key("ignored"));
    }

    #[test]
    fn test_null_values_dropped() {
        let recs = records(vec![json!({"id": "1", "availability": null, "content": null})]);
        let docs = build_documents(&recs, &schema(), "content", "embedding", &[vec![]]).unwrap();
        assert!(!docs[0].fields.contains_key("availability"));
        assert_eq!(docs[0].fields["content"], json!(""));
    }

    #[test]
    fn test_embedding_set_last_and_raw() {
        let recs = records(vec![json!({"id": "1", "content": "x", "availability": 1})]);
        let docs = build_documents(&recs, &schema(), "content", "embedding", &[vec![0.1]]).unwrap();
        let wire = serde_json::to_string(&docs[0]).unwrap();
        assert!(wire.ends_with(r#","embedding":[0.1]}"#), "{}", wire);
    }

    #[test]
    fn test_embedding_field_in_record_is_replaced() {
        let recs = records(vec![json!({"id": "1", "embedding": "not a vector"})]);
        let with_embedding = Schema::from_value(&json!({"fields": [
            {"name": "id", "type": "Edm.String", "key": true},
            {"name": "embedding", "type": "Edm.String"}
        ]}))
        .unwrap();
        let docs =
            build_documents(&recs, &with_embedding, "content", "embedding", &[vec![1.0]]).unwrap();
        assert!(!docs[0].fields.contains_key("embedding"));
        let embedding = docs[0].embedding.as_ref().unwrap();
        assert_eq!(embedding.field, "embedding");
        assert_eq!(embedding.values, vec![1.0]);
    }

    #[test]
    fn test_length_mismatch() {
        let recs = records(vec![json!({}), json!({})]);
        let err = build_documents(&recs, &schema(), "content", "embedding", &[vec![1.0]]).unwrap_err();
        assert!(matches!(err, PrepError::Embedding(_)));
    }

    #[test]
    fn test_content_texts() {
        let recs = records(vec![
            json!({"content": "hello"}),
            json!({}),
            json!({"content": {"k": "v"}}),
        ]);
        assert_eq!(
            content_texts(&recs, &schema(), "content"),
            vec!["hello".to_string(), String::new(), "{\"k\":\"v\"}".to_string()]
        );
    }
}
