//! Error taxonomy for a preparation run.
//!
//! Every variant is fatal for the run that produced it. Nothing is retried at
//! this layer; transports may retry internally before surfacing an error.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, PrepError>;

#[derive(Debug, Error)]
pub enum PrepError {
    /// The schema document is malformed or incomplete.
    #[error("invalid schema: {0}")]
    Schema(String),

    /// Unusable configuration: bad dimensionality, missing content field,
    /// missing service identity or credentials.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The search service did not answer the pre-flight probe.
    #[error("unable to connect to search service {0}")]
    Connectivity(String),

    /// Reading or writing index metadata failed.
    #[error("index reconciliation failed: {0}")]
    IndexReconciliation(String),

    /// The document store rejected one or more documents.
    #[error("failed to upload documents: {}", .keys.join(", "))]
    Upload { keys: Vec<String> },

    /// An upload request itself failed before per-document results came back.
    #[error("document upload request failed: {0}")]
    UploadRequest(String),

    /// The data document is not an array of JSON objects.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The embedding backend failed or returned unusable vectors.
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PrepError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PrepError::Io {
            context: context.into(),
            source,
        }
    }
}
