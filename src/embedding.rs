//! Embedding backends.
//!
//! Defines the [`EmbeddingService`] trait and two implementations:
//! - **[`OpenAIProvider`]** calls `POST https://api.openai.com/v1/embeddings`.
//! - **[`AzureOpenAIProvider`]** calls an Azure OpenAI deployment. Its
//!   endpoint and deployment name are also what the remote index needs to
//!   build a query-time vectorizer.
//!
//! # Provider Selection
//!
//! [`create_provider`] picks the backend from [`EmbeddingConfig::host`]:
//!
//! ```rust,no_run
//! # use prepindex::config::{EmbeddingConfig, OpenAIHost};
//! # use prepindex::embedding::create_provider;
//! let config = EmbeddingConfig {
//!     host: OpenAIHost::OpenAI,
//!     model: Some("text-embedding-3-small".to_string()),
//!     openai_api_key: Some("sk-...".to_string()),
//!     ..EmbeddingConfig::default()
//! };
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.dims(), 1536);
//! ```
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

use crate::config::{EmbeddingConfig, OpenAIHost};
use crate::error::{PrepError, Result};

const AZURE_OPENAI_API_VERSION: &str = "2024-06-01";
const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// An embedding backend.
///
/// `create_embeddings` returns one vector per input text, in input order.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Output dimensionality of every returned vector.
    fn dims(&self) -> usize;

    /// Remote endpoint usable for query-time vectorization, if any.
    fn endpoint(&self) -> Option<&str> {
        None
    }

    /// Deployment name paired with [`endpoint`](EmbeddingService::endpoint).
    fn deployment_name(&self) -> Option<&str> {
        None
    }

    async fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Fail unless every vector has exactly `dims` finite components.
///
/// JSON has no NaN or infinity, so such a vector could not be uploaded.
pub fn check_dimensions(vectors: &[Vec<f32>], dims: usize) -> Result<()> {
    for (i, v) in vectors.iter().enumerate() {
        if v.len() != dims {
            return Err(PrepError::Embedding(format!(
                "vector {} has {} dimensions, expected {}",
                i,
                v.len(),
                dims
            )));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(PrepError::Embedding(format!(
                "vector {} has a non-finite component",
                i
            )));
        }
    }
    Ok(())
}

// ============ Shared request plumbing ============

/// Batching and retry settings shared by both providers.
#[derive(Debug, Clone)]
struct RequestPolicy {
    batch_size: usize,
    max_retries: u32,
    timeout: Duration,
}

impl RequestPolicy {
    fn from_config(config: &EmbeddingConfig) -> Self {
        let batch_size = if config.disable_batch {
            1
        } else {
            config.batch_size.max(1)
        };
        Self {
            batch_size,
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Models that reject the `dimensions` request parameter.
fn supports_dimensions(model: &str) -> bool {
    model != "text-embedding-ada-002"
}

fn request_body(model: &str, dims: usize, texts: &[String]) -> Value {
    let mut body = serde_json::json!({
        "model": model,
        "input": texts,
    });
    if supports_dimensions(model) {
        body["dimensions"] = dims.into();
    }
    body
}

/// Send one request built by `build`, retrying transient failures.
async fn send_with_retry<F>(label: &str, max_retries: u32, build: F) -> Result<Value>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!("{} retry {} after {:?}", label, attempt, delay);
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| PrepError::Embedding(format!("{} response: {}", label, e)));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = PrepError::Embedding(format!("{} API error {}: {}", label, status, body_text));

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!("{} API error {}, retrying", label, status);
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                warn!("{} request failed: {}", label, e);
                last_err = Some(PrepError::Embedding(format!("{} request: {}", label, e)));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| PrepError::Embedding(format!("{} failed after retries", label))))
}

/// Parse an embeddings response, ordering vectors by their `index`.
fn parse_embeddings_response(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let invalid = |what: &str| PrepError::Embedding(format!("invalid embeddings response: {}", what));

    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("missing embedding"))?;
        let vec = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| invalid("non-numeric embedding value"))?;
        indexed.push((index, vec));
    }

    if indexed.len() != expected {
        return Err(invalid(&format!(
            "expected {} embeddings, got {}",
            expected,
            indexed.len()
        )));
    }

    indexed.sort_by_key(|(index, _)| *index);
    if let Some((position, (index, _))) = indexed
        .iter()
        .enumerate()
        .find(|(position, (index, _))| position != index)
    {
        return Err(invalid(&format!(
            "embedding index {} where {} was expected",
            index, position
        )));
    }
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

async fn embed_in_batches<F>(
    label: &str,
    policy: &RequestPolicy,
    texts: &[String],
    build: F,
) -> Result<Vec<Vec<f32>>>
where
    F: Fn(&[String]) -> RequestBuilder,
{
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(policy.batch_size) {
        debug!("{}: embedding batch of {} texts", label, batch.len());
        let json = send_with_retry(label, policy.max_retries, || build(batch)).await?;
        out.extend(parse_embeddings_response(&json, batch.len())?);
    }
    Ok(out)
}

fn http_client(policy: &RequestPolicy) -> Result<Client> {
    Client::builder()
        .timeout(policy.timeout)
        .build()
        .map_err(|e| PrepError::Configuration(format!("failed to build HTTP client: {}", e)))
}

fn required_model(config: &EmbeddingConfig) -> Result<String> {
    config
        .model
        .clone()
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| PrepError::Configuration("embedding model name is required".into()))
}

fn checked_dims(config: &EmbeddingConfig) -> Result<usize> {
    if config.dims == 0 {
        return Err(PrepError::Configuration(
            "embedding dimensions must be greater than zero".into(),
        ));
    }
    Ok(config.dims)
}

// ============ OpenAI Provider ============

/// Embedding provider for the public OpenAI API.
pub struct OpenAIProvider {
    client: Client,
    model: String,
    dims: usize,
    api_key: String,
    organization: Option<String>,
    url: String,
    policy: RequestPolicy,
}

impl OpenAIProvider {
    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the model, dimensions or API key
    /// is missing.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = required_model(config)?;
        let dims = checked_dims(config)?;
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| PrepError::Configuration("OPENAI_API_KEY is required when OPENAI_HOST is openai".into()))?;
        let policy = RequestPolicy::from_config(config);

        Ok(Self {
            client: http_client(&policy)?,
            model,
            dims,
            api_key,
            organization: config.openai_organization.clone(),
            url: config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| OPENAI_EMBEDDINGS_URL.to_string()),
            policy,
        })
    }
}

#[async_trait]
impl EmbeddingService for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embed_in_batches("OpenAI", &self.policy, texts, |batch| {
            let mut req = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&request_body(&self.model, self.dims, batch));
            if let Some(org) = &self.organization {
                req = req.header("OpenAI-Organization", org);
            }
            req
        })
        .await
    }
}

// ============ Azure OpenAI Provider ============

enum AzureAuth {
    ApiKey(String),
    Bearer(String),
}

/// Embedding provider for an Azure OpenAI deployment.
pub struct AzureOpenAIProvider {
    client: Client,
    model: String,
    dims: usize,
    endpoint: String,
    deployment: String,
    auth: AzureAuth,
    policy: RequestPolicy,
}

impl AzureOpenAIProvider {
    /// Create a provider from configuration.
    ///
    /// The endpoint is `azure_custom_url` when set, otherwise
    /// `https://<azure_service>.openai.azure.com`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = required_model(config)?;
        let dims = checked_dims(config)?;
        let endpoint = config.azure_endpoint().ok_or_else(|| {
            PrepError::Configuration(
                "AZURE_OPENAI_SERVICE or AZURE_OPENAI_CUSTOM_URL is required when OPENAI_HOST is azure".into(),
            )
        })?;
        let deployment = config
            .deployment
            .clone()
            .ok_or_else(|| PrepError::Configuration("AZURE_OPENAI_EMB_DEPLOYMENT is required when OPENAI_HOST is azure".into()))?;
        let auth = match (&config.azure_api_key, &config.azure_access_token) {
            (Some(key), _) => AzureAuth::ApiKey(key.clone()),
            (None, Some(token)) => AzureAuth::Bearer(token.clone()),
            (None, None) => {
                return Err(PrepError::Configuration(
                    "Azure OpenAI requires AZURE_OPENAI_API_KEY_OVERRIDE or AZURE_OPENAI_ACCESS_TOKEN".into(),
                ))
            }
        };
        let policy = RequestPolicy::from_config(config);

        Ok(Self {
            client: http_client(&policy)?,
            model,
            dims,
            endpoint,
            deployment,
            auth,
            policy,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.endpoint, self.deployment, AZURE_OPENAI_API_VERSION
        )
    }
}

#[async_trait]
impl EmbeddingService for AzureOpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn endpoint(&self) -> Option<&str> {
        Some(&self.endpoint)
    }

    fn deployment_name(&self) -> Option<&str> {
        Some(&self.deployment)
    }

    async fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.url();
        embed_in_batches("Azure OpenAI", &self.policy, texts, |batch| {
            let req = self
                .client
                .post(&url)
                .json(&request_body(&self.model, self.dims, batch));
            match &self.auth {
                AzureAuth::ApiKey(key) => req.header("api-key", key),
                AzureAuth::Bearer(token) => req.bearer_auth(token),
            }
        })
        .await
    }
}

/// Create the [`EmbeddingService`] selected by `config.host`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingService>> {
    match config.host {
        OpenAIHost::Azure => Ok(Box::new(AzureOpenAIProvider::new(config)?)),
        OpenAIHost::OpenAI => Ok(Box::new(OpenAIProvider::new(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn azure_config() -> EmbeddingConfig {
        EmbeddingConfig {
            host: OpenAIHost::Azure,
            model: Some("text-embedding-3-large".to_string()),
            dims: 3072,
            deployment: Some("emb".to_string()),
            azure_service: Some("myoai".to_string()),
            azure_api_key: Some("k".to_string()),
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_parse_response_orders_by_index() {
        let json = json!({"data": [
            {"index": 1, "embedding": [0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ]});
        let vecs = parse_embeddings_response(&json, 2).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_response_count_mismatch() {
        let json = json!({"data": [{"index": 0, "embedding": [1.0]}]});
        assert!(parse_embeddings_response(&json, 2).is_err());
        assert!(parse_embeddings_response(&json!({}), 0).is_err());
    }

    #[test]
    fn test_parse_response_rejects_bad_indices() {
        let duplicate = json!({"data": [
            {"index": 0, "embedding": [1.0]},
            {"index": 0, "embedding": [2.0]}
        ]});
        let err = parse_embeddings_response(&duplicate, 2).unwrap_err();
        assert!(matches!(err, PrepError::Embedding(_)));

        let out_of_range = json!({"data": [
            {"index": 5, "embedding": [1.0]},
            {"index": 7, "embedding": [2.0]}
        ]});
        assert!(parse_embeddings_response(&out_of_range, 2).is_err());
    }

    #[test]
    fn test_parse_response_without_indices_keeps_order() {
        let json = json!({"data": [{"embedding": [1.0]}, {"embedding": [2.0]}]});
        let vecs = parse_embeddings_response(&json, 2).unwrap();
        assert_eq!(vecs, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_request_body_dimensions() {
        let texts = vec!["a".to_string()];
        let body = request_body("text-embedding-3-small", 256, &texts);
        assert_eq!(body["dimensions"], json!(256));
        let body = request_body("text-embedding-ada-002", 1536, &texts);
        assert!(body.get("dimensions").is_none());
    }

    #[test]
    fn test_disable_batch_uses_single_text() {
        let mut config = azure_config();
        config.batch_size = 16;
        config.disable_batch = true;
        assert_eq!(RequestPolicy::from_config(&config).batch_size, 1);
    }

    #[test]
    fn test_azure_provider_identity() {
        let provider = AzureOpenAIProvider::new(&azure_config()).unwrap();
        assert_eq!(provider.endpoint(), Some("https://myoai.openai.azure.com"));
        assert_eq!(provider.deployment_name(), Some("emb"));
        assert_eq!(provider.dims(), 3072);
        assert!(provider.url().contains("/openai/deployments/emb/embeddings"));
    }

    #[test]
    fn test_azure_requires_credentials() {
        let mut config = azure_config();
        config.azure_api_key = None;
        assert!(matches!(
            AzureOpenAIProvider::new(&config),
            Err(PrepError::Configuration(_))
        ));
    }

    #[test]
    fn test_openai_has_no_vectorizer_identity() {
        let config = EmbeddingConfig {
            host: OpenAIHost::OpenAI,
            model: Some("text-embedding-3-small".to_string()),
            openai_api_key: Some("sk".to_string()),
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert!(provider.endpoint().is_none());
        assert!(provider.deployment_name().is_none());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let mut config = azure_config();
        config.dims = 0;
        assert!(matches!(
            create_provider(&config),
            Err(PrepError::Configuration(_))
        ));
    }

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions(&[vec![0.0; 3], vec![0.0; 3]], 3).is_ok());
        let err = check_dimensions(&[vec![0.0; 3], vec![0.0; 2]], 3).unwrap_err();
        assert!(err.to_string().contains("vector 1"));
    }

    #[test]
    fn test_check_dimensions_rejects_non_finite() {
        let err = check_dimensions(&[vec![0.0, f32::NAN]], 2).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
        assert!(check_dimensions(&[vec![f32::INFINITY, 0.0]], 2).is_err());
    }
}
