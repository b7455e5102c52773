//! Wire types for the remote search service.
//!
//! These mirror the JSON shapes of the index REST API. Every struct that can
//! come back from the service keeps unknown properties in an `extra` map so a
//! fetched definition can be written back without losing settings this crate
//! does not model.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Declared type of an index field.
///
/// Parsed from the service's `Edm.*` names. Unknown names are kept verbatim
/// in [`DataType::Other`] so parsing never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    String,
    Int32,
    Int64,
    Double,
    Boolean,
    DateTimeOffset,
    GeographyPoint,
    Single,
    ComplexType,
    Collection(Box<DataType>),
    Other(String),
}

impl DataType {
    pub fn parse(name: &str) -> Self {
        if let Some(inner) = name
            .strip_prefix("Collection(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return DataType::Collection(Box::new(DataType::parse(inner)));
        }
        match name {
            "Edm.String" => DataType::String,
            "Edm.Int32" => DataType::Int32,
            "Edm.Int64" => DataType::Int64,
            "Edm.Double" => DataType::Double,
            "Edm.Boolean" => DataType::Boolean,
            "Edm.DateTimeOffset" => DataType::DateTimeOffset,
            "Edm.GeographyPoint" => DataType::GeographyPoint,
            "Edm.Single" => DataType::Single,
            "Edm.ComplexType" => DataType::ComplexType,
            other => DataType::Other(other.to_string()),
        }
    }

    /// Type used for embedding fields: `Collection(Edm.Single)`.
    pub fn vector() -> Self {
        DataType::Collection(Box::new(DataType::Single))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => f.write_str("Edm.String"),
            DataType::Int32 => f.write_str("Edm.Int32"),
            DataType::Int64 => f.write_str("Edm.Int64"),
            DataType::Double => f.write_str("Edm.Double"),
            DataType::Boolean => f.write_str("Edm.Boolean"),
            DataType::DateTimeOffset => f.write_str("Edm.DateTimeOffset"),
            DataType::GeographyPoint => f.write_str("Edm.GeographyPoint"),
            DataType::Single => f.write_str("Edm.Single"),
            DataType::ComplexType => f.write_str("Edm.ComplexType"),
            DataType::Collection(inner) => write!(f, "Collection({})", inner),
            DataType::Other(name) => f.write_str(name),
        }
    }
}

impl From<String> for DataType {
    fn from(name: String) -> Self {
        DataType::parse(&name)
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        data_type.to_string()
    }
}

/// Anything merged by name during reconciliation.
pub trait Named {
    fn name(&self) -> &str;
}

macro_rules! impl_named {
    ($($ty:ty),* $(,)?) => {
        $(impl Named for $ty {
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

impl_named!(
    SearchField,
    ScoringProfile,
    VectorSearchProfile,
    VectorSearchAlgorithm,
    VectorSearchCompression,
    VectorSearchVectorizer,
);

/// Treats an explicit JSON `null` list the same as a missing one.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A field as the index API sees it.
///
/// Attribute flags are optional because the service omits or nulls them for
/// some field kinds; `None` is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchField {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrievable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub searchable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filterable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sortable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facetable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search_profile: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchField {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            key: None,
            retrievable: None,
            stored: None,
            searchable: None,
            filterable: None,
            sortable: None,
            facetable: None,
            dimensions: None,
            vector_search_profile: None,
            extra: Map::new(),
        }
    }

    /// Hidden fields are not returned in search results.
    pub fn is_hidden(&self) -> bool {
        self.retrievable == Some(false)
    }
}

/// Full definition of a remote index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fields: Vec<SearchField>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub scoring_profiles: Vec<ScoringProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search: Option<VectorSearch>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IndexDefinition {
    pub fn field(&self, name: &str) -> Option<&SearchField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Vector search settings; every list is merged by member name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearch {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub profiles: Vec<VectorSearchProfile>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub algorithms: Vec<VectorSearchAlgorithm>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub compressions: Vec<VectorSearchCompression>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub vectorizers: Vec<VectorSearchVectorizer>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchProfile {
    pub name: String,
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectorizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchAlgorithm {
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hnsw_parameters: Option<HnswParameters>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HnswParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchCompression {
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation_dimension: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescoring_options: Option<RescoringOptions>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescoringOptions {
    #[serde(default)]
    pub enable_rescoring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_oversampling: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescore_storage_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchVectorizer {
    pub name: String,
    pub kind: String,
    #[serde(
        rename = "azureOpenAIParameters",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub azure_openai_parameters: Option<AzureOpenAIParameters>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureOpenAIParameters {
    pub resource_uri: String,
    pub deployment_id: String,
    pub model_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named relevance adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_aggregation: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub functions: Vec<ScoringFunction>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringFunction {
    #[serde(rename = "type")]
    pub kind: String,
    pub field_name: String,
    pub boost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpolation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<MagnitudeParameters>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MagnitudeParameters {
    pub boosting_range_start: f64,
    pub boosting_range_end: f64,
    #[serde(default)]
    pub constant_boost_beyond_range: bool,
}

/// One upload-ready document.
///
/// `key` is carried alongside for failure attribution and is not serialized;
/// `fields` already contains the key field. The embedding, when present, is
/// serialized after every other field as `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub fields: Map<String, Value>,
    pub embedding: Option<Embedding>,
}

/// A document's vector and the field it is written to.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub field: String,
    pub values: Vec<f32>,
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.fields.len() + usize::from(self.embedding.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        if let Some(embedding) = &self.embedding {
            map.serialize_entry(&embedding.field, &embedding.values)?;
        }
        map.end()
    }
}

/// Per-document outcome reported by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub key: String,
    #[serde(rename = "status")]
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
