//! Vector field and vector search settings for the embedding field.
//!
//! Every name produced here is derived from the embedding field or model name
//! so that repeated runs produce the same merge keys:
//!
//! | Item | Name |
//! |------|------|
//! | profile | `<field>-profile` |
//! | compression | `<field>-compression` |
//! | vectorizer | `<model>-vectorizer` |
//! | algorithm | `hnsw_config` |

use log::debug;
use serde_json::Map;

use crate::embedding::EmbeddingService;
use crate::error::{PrepError, Result};
use crate::models::{
    AzureOpenAIParameters, DataType, HnswParameters, RescoringOptions, SearchField,
    VectorSearch, VectorSearchAlgorithm, VectorSearchCompression, VectorSearchProfile,
    VectorSearchVectorizer,
};

pub const HNSW_ALGORITHM_NAME: &str = "hnsw_config";
pub const TRUNCATION_DIMENSION: usize = 1024;
pub const DEFAULT_OVERSAMPLING: f64 = 10.0;

/// Desired vector configuration for one embedding field.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorConfig {
    pub field: SearchField,
    pub profile: VectorSearchProfile,
    pub algorithm: VectorSearchAlgorithm,
    pub compression: VectorSearchCompression,
    /// Present only when the backend exposes both an endpoint and a
    /// deployment; otherwise queries must bring their own vectors.
    pub vectorizer: Option<VectorSearchVectorizer>,
}

impl VectorConfig {
    pub fn field_name(&self) -> &str {
        &self.field.name
    }

    pub fn dimensions(&self) -> usize {
        self.field.dimensions.unwrap_or_default()
    }

    /// The full desired vector search settings.
    pub fn vector_search(&self) -> VectorSearch {
        VectorSearch {
            profiles: vec![self.profile.clone()],
            algorithms: vec![self.algorithm.clone()],
            compressions: vec![self.compression.clone()],
            vectorizers: self.vectorizer.iter().cloned().collect(),
            extra: Map::new(),
        }
    }
}

pub fn profile_name(field_name: &str) -> String {
    format!("{}-profile", field_name)
}

pub fn compression_name(field_name: &str) -> String {
    format!("{}-compression", field_name)
}

pub fn vectorizer_name(model_name: &str) -> String {
    format!("{}-vectorizer", model_name)
}

/// Build the vector configuration for `field_name`.
///
/// `dimensions` is the configured size and must match what the backend
/// declares.
pub fn build_vector_config(
    embedder: &dyn EmbeddingService,
    field_name: &str,
    dimensions: usize,
) -> Result<VectorConfig> {
    if dimensions == 0 {
        return Err(PrepError::Configuration(
            "embedding dimensions must be greater than zero".into(),
        ));
    }
    if dimensions != embedder.dims() {
        return Err(PrepError::Configuration(format!(
            "configured embedding dimensions {} do not match model '{}' output of {}",
            dimensions,
            embedder.model_name(),
            embedder.dims()
        )));
    }

    let mut field = SearchField::new(field_name, DataType::vector());
    field.retrievable = Some(false);
    field.stored = Some(false);
    field.searchable = Some(true);
    field.filterable = Some(false);
    field.sortable = Some(false);
    field.facetable = Some(false);
    field.dimensions = Some(dimensions);
    field.vector_search_profile = Some(profile_name(field_name));

    let vectorizer = match (embedder.endpoint(), embedder.deployment_name()) {
        (Some(endpoint), Some(deployment)) => Some(VectorSearchVectorizer {
            name: vectorizer_name(embedder.model_name()),
            kind: "azureOpenAI".to_string(),
            azure_openai_parameters: Some(AzureOpenAIParameters {
                resource_uri: endpoint.to_string(),
                deployment_id: deployment.to_string(),
                model_name: embedder.model_name().to_string(),
                extra: Map::new(),
            }),
            extra: Map::new(),
        }),
        _ => {
            debug!("No embedding endpoint/deployment; index will have no query-time vectorizer");
            None
        }
    };

    let algorithm = VectorSearchAlgorithm {
        name: HNSW_ALGORITHM_NAME.to_string(),
        kind: "hnsw".to_string(),
        hnsw_parameters: Some(HnswParameters {
            metric: Some("cosine".to_string()),
            extra: Map::new(),
        }),
        extra: Map::new(),
    };

    let compression = VectorSearchCompression {
        name: compression_name(field_name),
        kind: "binaryQuantization".to_string(),
        truncation_dimension: Some(TRUNCATION_DIMENSION),
        rescoring_options: Some(RescoringOptions {
            enable_rescoring: true,
            default_oversampling: Some(DEFAULT_OVERSAMPLING),
            rescore_storage_method: Some("preserveOriginals".to_string()),
        }),
        extra: Map::new(),
    };

    let profile = VectorSearchProfile {
        name: profile_name(field_name),
        algorithm: algorithm.name.clone(),
        vectorizer: vectorizer.as_ref().map(|v| v.name.clone()),
        compression: Some(compression.name.clone()),
        extra: Map::new(),
    };

    Ok(VectorConfig {
        field,
        profile,
        algorithm,
        compression,
        vectorizer,
    })
}
