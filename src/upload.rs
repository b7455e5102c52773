//! Sequential batch upload.

use log::{debug, info};

use crate::config::MAX_UPLOAD_BATCH;
use crate::error::{PrepError, Result};
use crate::models::Document;
use crate::traits::DocumentStore;

/// Counts from a completed upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub documents: usize,
    pub batches: usize,
}

/// Upload `documents` in contiguous batches of at most `batch_size`.
///
/// Batches go out one at a time, in order. The first batch with any failed
/// document stops the upload with [`PrepError::Upload`] naming the failed
/// keys; earlier batches stay committed.
pub async fn upload_documents(
    store: &dyn DocumentStore,
    documents: &[Document],
    batch_size: usize,
) -> Result<UploadSummary> {
    let batch_size = batch_size.clamp(1, MAX_UPLOAD_BATCH);
    let total_batches = documents.len().div_ceil(batch_size);
    let mut summary = UploadSummary::default();

    for (i, batch) in documents.chunks(batch_size).enumerate() {
        debug!("Uploading batch {}/{} ({} documents)", i + 1, total_batches, batch.len());

        let results = store
            .upload_documents(batch)
            .await
            .map_err(|e| PrepError::UploadRequest(format!("batch {}: {:#}", i + 1, e)))?;

        let failed: Vec<String> = results
            .into_iter()
            .filter(|r| !r.succeeded)
            .map(|r| r.key)
            .collect();
        if !failed.is_empty() {
            return Err(PrepError::Upload { keys: failed });
        }

        summary.documents += batch.len();
        summary.batches += 1;
    }

    info!(
        "Uploaded {} documents in {} batches",
        summary.documents, summary.batches
    );
    Ok(summary)
}
