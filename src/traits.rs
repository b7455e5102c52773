//! Seams to the remote search service.
//!
//! The pipeline talks to the service only through these traits:
//!
//! ```text
//! ┌──────────────┐   list/get/create/update   ┌─────────────────┐
//! │  reconcile   │ ─────────────────────────▶ │  IndexClient    │
//! └──────────────┘                            └─────────────────┘
//! ┌──────────────┐   upload batch             ┌─────────────────┐
//! │  upload      │ ─────────────────────────▶ │  DocumentStore  │
//! └──────────────┘                            └─────────────────┘
//! ┌──────────────┐   ping                     ┌───────────────────┐
//! │  pipeline    │ ─────────────────────────▶ │ ConnectivityProbe │
//! └──────────────┘                            └───────────────────┘
//! ```
//!
//! [`SearchClient`](crate::search_client::SearchClient) implements all three
//! over REST; [`InMemorySearchService`](crate::memory::InMemorySearchService)
//! implements them in memory for tests.
//!
//! # Example
//!
//! ```rust
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use prepindex::models::{Document, UploadResult};
//! use prepindex::traits::DocumentStore;
//!
//! /// Accepts everything without storing it.
//! pub struct NullStore;
//!
//! #[async_trait]
//! impl DocumentStore for NullStore {
//!     async fn upload_documents(&self, batch: &[Document]) -> Result<Vec<UploadResult>> {
//!         Ok(batch
//!             .iter()
//!             .map(|d| UploadResult {
//!                 key: d.key.clone(),
//!                 succeeded: true,
//!                 status_code: Some(201),
//!                 error_message: None,
//!             })
//!             .collect())
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, IndexDefinition, UploadResult};

/// Index metadata operations.
///
/// Implementations should not retry on behalf of the caller beyond what
/// their transport already does; failures are fatal to reconciliation.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Names of every index on the service.
    async fn list_index_names(&self) -> Result<Vec<String>>;

    /// Fetch a full index definition.
    async fn get_index(&self, name: &str) -> Result<IndexDefinition>;

    /// Create a new index. Fails if one with the same name exists.
    async fn create_index(&self, index: &IndexDefinition) -> Result<()>;

    /// Create or replace an index definition.
    async fn create_or_update_index(&self, index: &IndexDefinition) -> Result<()>;
}

/// Document writes into the target index.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upload one batch, returning a per-document result.
    async fn upload_documents(&self, batch: &[Document]) -> Result<Vec<UploadResult>>;
}

/// Liveness check against the search service.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// `true` when the service answered in time. Transport errors and
    /// timeouts count as unreachable, never as errors.
    async fn is_reachable(&self) -> bool;
}
