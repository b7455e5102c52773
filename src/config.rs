//! Configuration loading.
//!
//! Settings come from three layers, later layers winning:
//! 1. an optional TOML file (`--config`),
//! 2. environment variables (the `AZURE_*` / `OPENAI_*` names used by azd
//!    provisioned environments),
//! 3. CLI flags, applied by the pipeline.

use serde::Deserialize;
use std::path::Path;

use crate::error::{PrepError, Result};

/// Largest batch the document store accepts in one request.
pub const MAX_UPLOAD_BATCH: usize = 1000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Service name; the endpoint is `https://<service>.search.windows.net`.
    #[serde(default)]
    pub service: Option<String>,
    /// Full endpoint override, mainly for local emulators and tests.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub embedding_field: Option<String>,
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            service: None,
            endpoint: None,
            index: None,
            api_key: None,
            access_token: None,
            api_version: default_api_version(),
            embedding_field: None,
            ping_timeout_secs: default_ping_timeout_secs(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SearchConfig {
    /// Base URL of the search service, without a trailing slash.
    pub fn base_url(&self) -> Option<String> {
        if let Some(endpoint) = &self.endpoint {
            return Some(endpoint.trim_end_matches('/').to_string());
        }
        self.service
            .as_ref()
            .map(|s| format!("https://{}.search.windows.net", s))
    }
}

fn default_api_version() -> String {
    "2025-09-01".to_string()
}
fn default_ping_timeout_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    60
}

/// Which OpenAI flavour computes embeddings.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIHost {
    #[default]
    Azure,
    OpenAI,
}

impl OpenAIHost {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "azure" | "azure_custom" => Ok(OpenAIHost::Azure),
            "openai" => Ok(OpenAIHost::OpenAI),
            other => Err(PrepError::Configuration(format!(
                "unknown OPENAI_HOST '{}': must be azure or openai",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub host: OpenAIHost,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub azure_service: Option<String>,
    #[serde(default)]
    pub azure_custom_url: Option<String>,
    #[serde(default)]
    pub azure_api_key: Option<String>,
    #[serde(default)]
    pub azure_access_token: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub openai_organization: Option<String>,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub disable_batch: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            host: OpenAIHost::default(),
            model: None,
            dims: default_dims(),
            deployment: None,
            azure_service: None,
            azure_custom_url: None,
            azure_api_key: None,
            azure_access_token: None,
            openai_api_key: None,
            openai_organization: None,
            openai_base_url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            disable_batch: false,
        }
    }
}

impl EmbeddingConfig {
    /// Azure OpenAI endpoint: the custom URL if set, else derived from the
    /// service name.
    pub fn azure_endpoint(&self) -> Option<String> {
        if let Some(url) = &self.azure_custom_url {
            return Some(url.trim_end_matches('/').to_string());
        }
        self.azure_service
            .as_ref()
            .map(|s| format!("https://{}.openai.azure.com", s))
    }
}

fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    16
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_upload_batch_size")]
    pub batch_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_upload_batch_size(),
        }
    }
}

fn default_upload_batch_size() -> usize {
    MAX_UPLOAD_BATCH
}

/// Trim a secret; blank values count as unset.
pub fn clean_key(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Overlay settings from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay settings from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| get(name).filter(|v| !v.is_empty());

        if let Some(v) = var("AZURE_SEARCH_SERVICE") {
            self.search.service = Some(v);
        }
        if let Some(v) = var("AZURE_SEARCH_INDEX") {
            self.search.index = Some(v);
        }
        if let Some(v) = clean_key(var("AZURE_SEARCH_KEY")) {
            self.search.api_key = Some(v);
        }
        if let Some(v) = clean_key(var("AZURE_SEARCH_ACCESS_TOKEN")) {
            self.search.access_token = Some(v);
        }
        if let Some(v) = var("AZURE_SEARCH_FIELD_NAME_EMBEDDING") {
            self.search.embedding_field = Some(v);
        }

        let emb = &mut self.embedding;
        if let Some(v) = var("OPENAI_HOST") {
            emb.host = OpenAIHost::parse(&v)?;
        }
        if let Some(v) = var("AZURE_OPENAI_SERVICE") {
            emb.azure_service = Some(v);
        }
        if let Some(v) = var("AZURE_OPENAI_CUSTOM_URL") {
            emb.azure_custom_url = Some(v);
        }
        if let Some(v) = clean_key(var("AZURE_OPENAI_API_KEY_OVERRIDE")) {
            emb.azure_api_key = Some(v);
        }
        if let Some(v) = clean_key(var("AZURE_OPENAI_ACCESS_TOKEN")) {
            emb.azure_access_token = Some(v);
        }
        if let Some(v) = clean_key(var("OPENAI_API_KEY")) {
            emb.openai_api_key = Some(v);
        }
        if let Some(v) = var("OPENAI_ORGANIZATION") {
            emb.openai_organization = Some(v);
        }
        if let Some(v) = var("AZURE_OPENAI_EMB_MODEL_NAME") {
            emb.model = Some(v);
        }
        if let Some(v) = var("AZURE_OPENAI_EMB_DEPLOYMENT") {
            emb.deployment = Some(v);
        }
        if let Some(v) = var("AZURE_OPENAI_EMB_DIMENSIONS") {
            emb.dims = v.trim().parse().map_err(|_| {
                PrepError::Configuration(format!(
                    "AZURE_OPENAI_EMB_DIMENSIONS must be an integer, got '{}'",
                    v
                ))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.dims == 0 {
            return Err(PrepError::Configuration(
                "embedding dimensions must be greater than zero".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(PrepError::Configuration(
                "embedding.batch_size must be > 0".into(),
            ));
        }
        if !(1..=MAX_UPLOAD_BATCH).contains(&self.upload.batch_size) {
            return Err(PrepError::Configuration(format!(
                "upload.batch_size must be between 1 and {}",
                MAX_UPLOAD_BATCH
            )));
        }
        if self.search.ping_timeout_secs == 0 {
            return Err(PrepError::Configuration(
                "search.ping_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a TOML configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PrepError::io(format!("failed to read config file {}", path.display()), e))?;

    let config: Config = toml::from_str(&content).map_err(|e| {
        PrepError::Configuration(format!("failed to parse {}: {}", path.display(), e))
    })?;

    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, otherwise start from defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}
