//! REST client for the remote search service.
//!
//! Implements the [`IndexClient`], [`DocumentStore`] and
//! [`ConnectivityProbe`] seams against the service's REST API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list index names | `GET /indexes?$select=name` |
//! | get index | `GET /indexes/<name>` |
//! | create index | `POST /indexes` |
//! | create or update index | `PUT /indexes/<name>` |
//! | upload documents | `POST /indexes/<name>/docs/index` |
//! | ping | `GET /ping` |

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::error::{PrepError, Result};
use crate::models::{Document, IndexDefinition, UploadResult};
use crate::traits::{ConnectivityProbe, DocumentStore, IndexClient};

/// How requests authenticate to the service.
#[derive(Clone)]
pub enum SearchCredential {
    ApiKey(String),
    BearerToken(String),
}

impl SearchCredential {
    /// API key wins over an access token when both are configured.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        match (&config.api_key, &config.access_token) {
            (Some(key), _) => Ok(SearchCredential::ApiKey(key.clone())),
            (None, Some(token)) => Ok(SearchCredential::BearerToken(token.clone())),
            (None, None) => Err(PrepError::Configuration(
                "search credentials missing: pass --searchkey or set AZURE_SEARCH_KEY or AZURE_SEARCH_ACCESS_TOKEN".into(),
            )),
        }
    }

    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            SearchCredential::ApiKey(key) => req.header("api-key", key),
            SearchCredential::BearerToken(token) => req.bearer_auth(token),
        }
    }
}

impl std::fmt::Debug for SearchCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchCredential::ApiKey(_) => f.write_str("ApiKey(***)"),
            SearchCredential::BearerToken(_) => f.write_str("BearerToken(***)"),
        }
    }
}

pub struct SearchClient {
    client: Client,
    probe_client: Client,
    base_url: String,
    index_name: String,
    api_version: String,
    credential: SearchCredential,
}

impl SearchClient {
    /// Build a client for `index_name` on the configured service.
    pub fn new(config: &SearchConfig, index_name: &str) -> Result<Self> {
        let base_url = config.base_url().ok_or_else(|| {
            PrepError::Configuration(
                "search service missing: pass --searchservice or set AZURE_SEARCH_SERVICE".into(),
            )
        })?;
        let credential = SearchCredential::from_config(config)?;

        let build = |timeout_secs: u64| {
            Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .map_err(|e| PrepError::Configuration(format!("failed to build HTTP client: {}", e)))
        };

        info!("Using search service at {}", base_url);
        Ok(Self {
            client: build(config.timeout_secs)?,
            probe_client: build(config.ping_timeout_secs)?,
            base_url,
            index_name: index_name.to_string(),
            api_version: config.api_version.clone(),
            credential,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let req = self
            .client
            .request(method, url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("Accept", "application/json");
        self.credential.apply(req)
    }

    /// Pass through successful responses, turn the rest into errors carrying
    /// the service's message.
    async fn check(response: Response, action: &str) -> anyhow::Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        error!("Search service {} failed ({}): {}", action, status, body);
        bail!("{} failed ({}): {}", action, status, body)
    }
}

#[async_trait]
impl IndexClient for SearchClient {
    async fn list_index_names(&self) -> anyhow::Result<Vec<String>> {
        let resp = self
            .request(Method::GET, "/indexes")
            .query(&[("$select", "name")])
            .send()
            .await
            .context("list indexes request")?;
        let json: Value = Self::check(resp, "list indexes").await?.json().await?;

        let names = json
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("list indexes response has no value array"))?
            .iter()
            .filter_map(|v| v.get("name").and_then(Value::as_str))
            .map(String::from)
            .collect::<Vec<_>>();
        debug!("Found {} indexes", names.len());
        Ok(names)
    }

    async fn get_index(&self, name: &str) -> anyhow::Result<IndexDefinition> {
        let resp = self
            .request(Method::GET, &format!("/indexes/{}", name))
            .send()
            .await
            .context("get index request")?;
        let mut json: Value = Self::check(resp, "get index").await?.json().await?;
        if let Some(obj) = json.as_object_mut() {
            obj.remove("@odata.context");
        }
        serde_json::from_value(json).context("parsing index definition")
    }

    async fn create_index(&self, index: &IndexDefinition) -> anyhow::Result<()> {
        let resp = self
            .request(Method::POST, "/indexes")
            .json(index)
            .send()
            .await
            .context("create index request")?;
        Self::check(resp, "create index").await?;
        Ok(())
    }

    async fn create_or_update_index(&self, index: &IndexDefinition) -> anyhow::Result<()> {
        let resp = self
            .request(Method::PUT, &format!("/indexes/{}", index.name))
            .json(index)
            .send()
            .await
            .context("update index request")?;
        Self::check(resp, "update index").await?;
        Ok(())
    }
}

/// Body of a `docs/index` request.
///
/// Serialized straight from the documents so embeddings keep `f32` text.
#[derive(Serialize)]
struct IndexBatch<'a> {
    value: Vec<IndexAction<'a>>,
}

#[derive(Serialize)]
struct IndexAction<'a> {
    #[serde(rename = "@search.action")]
    action: &'static str,
    #[serde(flatten)]
    document: &'a Document,
}

fn upload_payload(batch: &[Document]) -> IndexBatch<'_> {
    IndexBatch {
        value: batch
            .iter()
            .map(|document| IndexAction {
                action: "upload",
                document,
            })
            .collect(),
    }
}

#[async_trait]
impl DocumentStore for SearchClient {
    async fn upload_documents(&self, batch: &[Document]) -> anyhow::Result<Vec<UploadResult>> {
        let resp = self
            .request(
                Method::POST,
                &format!("/indexes/{}/docs/index", self.index_name),
            )
            .json(&upload_payload(batch))
            .send()
            .await
            .context("upload documents request")?;

        // 207 carries per-document results just like 200.
        let status = resp.status();
        let resp = if status == StatusCode::MULTI_STATUS {
            resp
        } else {
            Self::check(resp, "upload documents").await?
        };

        let json: Value = resp.json().await?;
        let results = json
            .get("value")
            .cloned()
            .ok_or_else(|| anyhow!("upload response has no value array"))?;
        serde_json::from_value(results).context("parsing upload results")
    }
}

#[async_trait]
impl ConnectivityProbe for SearchClient {
    async fn is_reachable(&self) -> bool {
        let url = format!("{}/ping", self.base_url);
        match self.probe_client.get(&url).send().await {
            Ok(resp) => {
                debug!("Search service ping returned {}", resp.status());
                resp.status() == StatusCode::OK
            }
            Err(e) => {
                debug!("Search service ping failed: {}", e);
                false
            }
        }
    }
}
