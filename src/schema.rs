//! Schema loading.
//!
//! A schema document is a JSON object with an optional `name` and a `fields`
//! array. Each field entry needs `name` and `type`; the attribute flags
//! (`key`, `searchable`, `filterable`, `sortable`, `facetable`) default to
//! `false`.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{PrepError, Result};
use crate::models::{DataType, SearchField};

/// One declared field of the desired index.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub data_type: DataType,
    pub key: bool,
    pub searchable: bool,
    pub filterable: bool,
    pub sortable: bool,
    pub facetable: bool,
}

impl FieldDescriptor {
    pub fn to_search_field(&self) -> SearchField {
        let mut field = SearchField::new(self.name.clone(), self.data_type.clone());
        field.key = Some(self.key);
        field.searchable = Some(self.searchable);
        field.filterable = Some(self.filterable);
        field.sortable = Some(self.sortable);
        field.facetable = Some(self.facetable);
        field
    }
}

/// A parsed schema document. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: Option<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Read and parse a schema file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PrepError::io(format!("failed to read schema file {}", path.display()), e)
        })?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| PrepError::Schema(format!("{}: {}", path.display(), e)))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| PrepError::Schema("schema file must contain a JSON object".into()))?;

        let entries = obj
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| PrepError::Schema("schema file must include a fields array".into()))?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(String::from);

        let mut fields = Vec::with_capacity(entries.len());
        let mut seen = HashSet::new();
        for entry in entries {
            let field = parse_field(entry)?;
            if !seen.insert(field.name.clone()) {
                return Err(PrepError::Schema(format!(
                    "field '{}' is declared more than once",
                    field.name
                )));
            }
            fields.push(field);
        }

        let keys = fields.iter().filter(|f| f.key).count();
        if keys != 1 {
            return Err(PrepError::Schema(format!(
                "schema must declare exactly one key field, found {}",
                keys
            )));
        }

        Ok(Self { name, fields })
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn key_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.key)
    }

    /// Name → declared type lookup.
    pub fn field_types(&self) -> HashMap<String, DataType> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.data_type.clone()))
            .collect()
    }

    /// The same schema minus the named field.
    pub fn without_field(&self, name: &str) -> Schema {
        Schema {
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .filter(|f| f.name != name)
                .cloned()
                .collect(),
        }
    }

    pub fn search_fields(&self) -> Vec<SearchField> {
        self.fields.iter().map(FieldDescriptor::to_search_field).collect()
    }
}

fn parse_field(entry: &Value) -> Result<FieldDescriptor> {
    let missing = || PrepError::Schema("each field definition must include name and type".into());

    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(missing)?;
    let data_type = entry
        .get("type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(missing)?;

    Ok(FieldDescriptor {
        name: name.to_string(),
        data_type: DataType::parse(data_type),
        key: flag(entry, name, "key")?,
        searchable: flag(entry, name, "searchable")?,
        filterable: flag(entry, name, "filterable")?,
        sortable: flag(entry, name, "sortable")?,
        facetable: flag(entry, name, "facetable")?,
    })
}

fn flag(entry: &Value, field: &str, attr: &str) -> Result<bool> {
    match entry.get(attr) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(PrepError::Schema(format!(
            "field '{}': '{}' must be a boolean, got {}",
            field, attr, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "name": "products",
            "fields": [
                {"name": "id", "type": "Edm.String", "key": true},
                {"name": "content", "type": "Edm.String", "searchable": true},
                {"name": "availability", "type": "Edm.Double", "filterable": true}
            ]
        })
    }

    #[test]
    fn test_parse_fields_in_order() {
        let schema = Schema::from_value(&sample()).unwrap();
        assert_eq!(schema.name.as_deref(), Some("products"));
        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "content", "availability"]);
        assert_eq!(schema.key_field().unwrap().name, "id");
        assert_eq!(schema.field_types()["availability"], DataType::Double);
    }

    #[test]
    fn test_flags_default_false() {
        let schema = Schema::from_value(&sample()).unwrap();
        let content = schema.field("content").unwrap();
        assert!(content.searchable);
        assert!(!content.key);
        assert!(!content.filterable);
        assert!(!content.sortable);
        assert!(!content.facetable);
    }

    #[test]
    fn test_not_an_object() {
        let err = Schema::from_value(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, PrepError::Schema(_)));
    }

    #[test]
    fn test_missing_fields_array() {
        let err = Schema::from_value(&json!({"name": "x"})).unwrap_err();
        assert!(err.to_string().contains("fields array"));
        let err = Schema::from_value(&json!({"fields": {}})).unwrap_err();
        assert!(matches!(err, PrepError::Schema(_)));
    }

    #[test]
    fn test_field_missing_name_or_type() {
        let err = Schema::from_value(&json!({"fields": [{"name": "id"}]})).unwrap_err();
        assert!(err.to_string().contains("name and type"));
        let err =
            Schema::from_value(&json!({"fields": [{"type": "Edm.String"}]})).unwrap_err();
        assert!(matches!(err, PrepError::Schema(_)));
    }

    #[test]
    fn test_duplicate_and_key_count() {
        let dup = json!({"fields": [
            {"name": "id", "type": "Edm.String", "key": true},
            {"name": "id", "type": "Edm.String"}
        ]});
        assert!(Schema::from_value(&dup).is_err());

        let no_key = json!({"fields": [{"name": "id", "type": "Edm.String"}]});
        assert!(Schema::from_value(&no_key).is_err());
    }

    #[test]
    fn test_without_field() {
        let schema = Schema::from_value(&sample()).unwrap();
        let trimmed = schema.without_field("availability");
        assert_eq!(trimmed.fields.len(), 2);
        assert!(!trimmed.contains("availability"));
        assert_eq!(schema.fields.len(), 3);
    }

    #[test]
    fn test_to_search_field() {
        let schema = Schema::from_value(&sample()).unwrap();
        let fields = schema.search_fields();
        assert_eq!(fields[0].key, Some(true));
        assert_eq!(fields[1].searchable, Some(true));
        assert_eq!(fields[2].data_type, DataType::Double);
        assert!(fields[0].stored.is_none());
    }
}
