//! Pipeline orchestration.
//!
//! One run, in order:
//!
//! ```text
//! load schema + records → vector/scoring config → ping service
//!     → reconcile index → embed content → build documents → upload
//! ```
//!
//! Every step must succeed before the next starts; the first failure ends
//! the run. Re-running after a failure is safe because reconciliation only
//! adds and uploads are keyed.

use log::info;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::documents::{build_documents, content_texts};
use crate::embedding::{self, check_dimensions, EmbeddingService};
use crate::error::{PrepError, Result};
use crate::reconcile::{drop_colliding_field, reconcile, DesiredIndex, ReconcileOutcome};
use crate::schema::Schema;
use crate::scoring::scoring_profile_for;
use crate::search_client::SearchClient;
use crate::traits::{ConnectivityProbe, DocumentStore, IndexClient};
use crate::upload::{upload_documents, UploadSummary};
use crate::vector::build_vector_config;

pub const DEFAULT_EMBEDDING_FIELD: &str = "embedding";
pub const DEFAULT_CONTENT_FIELD: &str = "content";

/// Per-invocation choices, normally from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub data_path: PathBuf,
    pub schema_path: PathBuf,
    pub index_name: Option<String>,
    pub search_service: Option<String>,
    pub content_field: String,
    pub embedding_field: Option<String>,
    pub search_key: Option<String>,
    pub disable_batch_vectors: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./new-data/index.json"),
            schema_path: PathBuf::from("./new-data/index-schema.json"),
            index_name: None,
            search_service: None,
            content_field: DEFAULT_CONTENT_FIELD.to_string(),
            embedding_field: None,
            search_key: None,
            disable_batch_vectors: false,
        }
    }
}

impl RunOptions {
    /// Fold the CLI overrides into `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(service) = &self.search_service {
            config.search.service = Some(service.clone());
            config.search.endpoint = None;
        }
        if let Some(key) = crate::config::clean_key(self.search_key.clone()) {
            config.search.api_key = Some(key);
        }
        if let Some(field) = &self.embedding_field {
            config.search.embedding_field = Some(field.clone());
        }
        if self.disable_batch_vectors {
            config.embedding.disable_batch = true;
        }
    }
}

/// Everything a run needs that does not touch the network.
#[derive(Debug, Clone)]
pub struct Job {
    pub schema: Schema,
    pub records: Vec<Map<String, Value>>,
    pub index_name: String,
    pub content_field: String,
    pub embedding_field: String,
    pub dimensions: usize,
    pub upload_batch_size: usize,
}

impl Job {
    /// Resolve names and check the inputs against each other.
    ///
    /// The index name comes from `--index`, then the schema's `name`, then
    /// configuration.
    pub fn prepare(
        config: &Config,
        opts: &RunOptions,
        schema: Schema,
        records: Vec<Map<String, Value>>,
    ) -> Result<Self> {
        let index_name = opts
            .index_name
            .clone()
            .or_else(|| schema.name.clone())
            .or_else(|| config.search.index.clone())
            .ok_or_else(|| {
                PrepError::Configuration(
                    "index name must be provided via --index, schema name, or AZURE_SEARCH_INDEX"
                        .into(),
                )
            })?;

        let content_field = opts.content_field.clone();
        if !schema.contains(&content_field) {
            return Err(PrepError::Configuration(format!(
                "content field '{}' not found in schema fields",
                content_field
            )));
        }

        let embedding_field = config
            .search
            .embedding_field
            .clone()
            .unwrap_or_else(|| DEFAULT_EMBEDDING_FIELD.to_string());
        if embedding_field == content_field {
            return Err(PrepError::Configuration(format!(
                "content field and embedding field are both '{}'",
                content_field
            )));
        }
        if let Some(key) = schema.key_field().filter(|k| k.name == embedding_field) {
            return Err(PrepError::Configuration(format!(
                "embedding field '{}' is the schema's key field",
                key.name
            )));
        }

        Ok(Self {
            schema,
            records,
            index_name,
            content_field,
            embedding_field,
            dimensions: config.embedding.dims,
            upload_batch_size: config.upload.batch_size,
        })
    }
}

/// Read the data document: a JSON array of objects.
pub fn load_records(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PrepError::io(format!("failed to read data file {}", path.display()), e))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| PrepError::InvalidData(format!("{}: {}", path.display(), e)))?;
    records_from_value(value)
}

pub fn records_from_value(value: Value) -> Result<Vec<Map<String, Value>>> {
    let Value::Array(rows) = value else {
        return Err(PrepError::InvalidData(
            "data file must contain a JSON array".into(),
        ));
    };
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Object(obj) => Ok(obj),
            _ => Err(PrepError::InvalidData(format!(
                "every JSON row must be an object (row {} is not)",
                i
            ))),
        })
        .collect()
}

/// The collaborators one run talks to.
pub struct Services<'a> {
    pub index: &'a dyn IndexClient,
    pub store: &'a dyn DocumentStore,
    pub probe: &'a dyn ConnectivityProbe,
    pub embedder: &'a dyn EmbeddingService,
    /// Service name or URL for messages.
    pub service_label: &'a str,
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub index_name: String,
    pub outcome: ReconcileOutcome,
    pub upload: UploadSummary,
}

/// Run every networked step of `job` against `services`.
pub async fn execute(services: &Services<'_>, job: &Job) -> Result<RunSummary> {
    let schema = drop_colliding_field(&job.schema, &job.embedding_field);

    let vector = build_vector_config(services.embedder, &job.embedding_field, job.dimensions)?;
    let scoring_profile = scoring_profile_for(&schema);
    if let Some(profile) = &scoring_profile {
        info!("Adding scoring profile {}", profile.name);
    }

    info!("Checking connectivity to {}", services.service_label);
    if !services.probe.is_reachable().await {
        return Err(PrepError::Connectivity(services.service_label.to_string()));
    }

    let desired = DesiredIndex::new(job.index_name.clone(), &schema, vector, scoring_profile);
    let outcome = reconcile(services.index, &desired).await?;

    let mut summary = RunSummary {
        index_name: job.index_name.clone(),
        outcome,
        upload: UploadSummary::default(),
    };

    if job.records.is_empty() {
        info!("No records found to upload");
        return Ok(summary);
    }

    let texts = content_texts(&job.records, &schema, &job.content_field);
    info!(
        "Computing embeddings for {} records with {}",
        texts.len(),
        services.embedder.model_name()
    );
    let embeddings = services.embedder.create_embeddings(&texts).await?;
    check_dimensions(&embeddings, job.dimensions)?;

    let documents = build_documents(
        &job.records,
        &schema,
        &job.content_field,
        &job.embedding_field,
        &embeddings,
    )?;

    summary.upload = upload_documents(services.store, &documents, job.upload_batch_size).await?;
    Ok(summary)
}

/// Remote handles for one run.
///
/// Acquired once at the top of [`run`] and dropped on every exit path,
/// which releases the underlying HTTP connection pools.
pub struct RunContext {
    search: SearchClient,
    embedder: Box<dyn EmbeddingService>,
    service_label: String,
}

impl RunContext {
    pub fn open(config: &Config, index_name: &str) -> Result<Self> {
        let search = SearchClient::new(&config.search, index_name)?;
        let embedder = embedding::create_provider(&config.embedding)?;
        let service_label = config
            .search
            .service
            .clone()
            .unwrap_or_else(|| search.base_url().to_string());
        Ok(Self {
            search,
            embedder,
            service_label,
        })
    }

    pub fn services(&self) -> Services<'_> {
        Services {
            index: &self.search,
            store: &self.search,
            probe: &self.search,
            embedder: self.embedder.as_ref(),
            service_label: &self.service_label,
        }
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        log::debug!("Releasing search and embedding clients");
    }
}

/// Full run: apply CLI overrides, load inputs, open clients, execute.
pub async fn run(mut config: Config, opts: &RunOptions) -> Result<RunSummary> {
    opts.apply_to(&mut config);
    config.validate()?;

    info!("Loading schema from {}", opts.schema_path.display());
    let schema = Schema::load(&opts.schema_path)?;
    info!("Loading records from {}", opts.data_path.display());
    let records = load_records(&opts.data_path)?;

    let job = Job::prepare(&config, opts, schema, records)?;
    let context = RunContext::open(&config, &job.index_name)?;
    let summary = execute(&context.services(), &job).await?;

    info!(
        "Index {} {:?}; uploaded {} documents in {} batches",
        summary.index_name, summary.outcome, summary.upload.documents, summary.upload.batches
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_value(&json!({"name": "from-schema", "fields": [
            {"name": "id", "type": "Edm.String", "key": true},
            {"name": "content", "type": "Edm.String"}
        ]}))
        .unwrap()
    }

    #[test]
    fn test_index_name_precedence() {
        let mut config = Config::default();
        config.search.index = Some("from-env".to_string());
        let mut opts = RunOptions::default();

        let job = Job::prepare(&config, &opts, schema(), vec![]).unwrap();
        assert_eq!(job.index_name, "from-schema");

        opts.index_name = Some("from-cli".to_string());
        let job = Job::prepare(&config, &opts, schema(), vec![]).unwrap();
        assert_eq!(job.index_name, "from-cli");

        let mut unnamed = schema();
        unnamed.name = None;
        opts.index_name = None;
        let job = Job::prepare(&config, &opts, unnamed.clone(), vec![]).unwrap();
        assert_eq!(job.index_name, "from-env");

        config.search.index = None;
        assert!(matches!(
            Job::prepare(&config, &opts, unnamed, vec![]),
            Err(PrepError::Configuration(_))
        ));
    }

    #[test]
    fn test_content_field_must_exist() {
        let opts = RunOptions {
            content_field: "body".to_string(),
            ..RunOptions::default()
        };
        let err = Job::prepare(&Config::default(), &opts, schema(), vec![]).unwrap_err();
        assert!(err.to_string().contains("'body'"));
    }

    #[test]
    fn test_embedding_field_resolution() {
        let mut config = Config::default();
        let job = Job::prepare(&config, &RunOptions::default(), schema(), vec![]).unwrap();
        assert_eq!(job.embedding_field, "embedding");

        let opts = RunOptions {
            embedding_field: Some("vec".to_string()),
            ..RunOptions::default()
        };
        opts.apply_to(&mut config);
        let job = Job::prepare(&config, &opts, schema(), vec![]).unwrap();
        assert_eq!(job.embedding_field, "vec");
    }

    #[test]
    fn test_embedding_field_cannot_be_key() {
        let mut config = Config::default();
        config.search.embedding_field = Some("id".to_string());
        let err = Job::prepare(&config, &RunOptions::default(), schema(), vec![]).unwrap_err();
        assert!(matches!(err, PrepError::Configuration(_)));
        assert!(err.to_string().contains("key field"));
    }

    #[test]
    fn test_embedding_field_may_replace_other_schema_field() {
        let schema = Schema::from_value(&json!({"fields": [
            {"name": "id", "type": "Edm.String", "key": true},
            {"name": "content", "type": "Edm.String"},
            {"name": "embedding", "type": "Edm.String"}
        ]}))
        .unwrap();
        let mut config = Config::default();
        config.search.index = Some("idx".to_string());
        let job = Job::prepare(&config, &RunOptions::default(), schema, vec![]).unwrap();
        assert_eq!(job.embedding_field, "embedding");
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config.search.endpoint = Some("http://localhost:1".to_string());
        let opts = RunOptions {
            search_service: Some("svc".to_string()),
            search_key: Some("  ".to_string()),
            disable_batch_vectors: true,
            ..RunOptions::default()
        };
        opts.apply_to(&mut config);
        assert_eq!(config.search.service.as_deref(), Some("svc"));
        assert!(config.search.endpoint.is_none());
        assert!(config.search.api_key.is_none());
        assert!(config.embedding.disable_batch);
    }

    #[test]
    fn test_records_from_value() {
        assert_eq!(records_from_value(json!([{"a": 1}, {}])).unwrap().len(), 2);
        assert!(matches!(
            records_from_value(json!({"a": 1})),
            Err(PrepError::InvalidData(_))
        ));
        assert!(records_from_value(json!([{"a": 1}, 3])).is_err());
    }
}
