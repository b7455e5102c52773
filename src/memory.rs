//! In-memory search service for tests and dry runs.
//!
//! Implements [`IndexClient`], [`DocumentStore`] and [`ConnectivityProbe`]
//! over `RwLock`-guarded maps, and records every write so callers can assert
//! on call counts and batch sizes. Failures can be injected per key or for
//! all index calls.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Document, IndexDefinition, UploadResult};
use crate::traits::{ConnectivityProbe, DocumentStore, IndexClient};

/// In-memory stand-in for a remote search service holding one or more indexes.
pub struct InMemorySearchService {
    indexes: RwLock<BTreeMap<String, IndexDefinition>>,
    documents: RwLock<Vec<Document>>,
    upload_batches: RwLock<Vec<usize>>,
    index_writes: RwLock<usize>,
    rejected_keys: RwLock<HashSet<String>>,
    fail_index_calls: RwLock<bool>,
    reachable: RwLock<bool>,
}

impl InMemorySearchService {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(BTreeMap::new()),
            documents: RwLock::new(Vec::new()),
            upload_batches: RwLock::new(Vec::new()),
            index_writes: RwLock::new(0),
            rejected_keys: RwLock::new(HashSet::new()),
            fail_index_calls: RwLock::new(false),
            reachable: RwLock::new(true),
        }
    }

    /// Seed an index without counting it as a write.
    pub fn insert_index(&self, index: IndexDefinition) {
        self.indexes
            .write()
            .unwrap()
            .insert(index.name.clone(), index);
    }

    pub fn index(&self, name: &str) -> Option<IndexDefinition> {
        self.indexes.read().unwrap().get(name).cloned()
    }

    /// Number of successful create/update calls.
    pub fn index_writes(&self) -> usize {
        *self.index_writes.read().unwrap()
    }

    /// Stored documents in first-upload order.
    pub fn documents(&self) -> Vec<Document> {
        self.documents.read().unwrap().clone()
    }

    /// Size of every upload call, in call order.
    pub fn upload_batches(&self) -> Vec<usize> {
        self.upload_batches.read().unwrap().clone()
    }

    /// Report these keys as failed whenever they are uploaded.
    pub fn reject_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rejected_keys
            .write()
            .unwrap()
            .extend(keys.into_iter().map(Into::into));
    }

    pub fn fail_index_calls(&self, fail: bool) {
        *self.fail_index_calls.write().unwrap() = fail;
    }

    pub fn set_reachable(&self, reachable: bool) {
        *self.reachable.write().unwrap() = reachable;
    }

    fn check_index_calls(&self) -> Result<()> {
        if *self.fail_index_calls.read().unwrap() {
            bail!("injected index service failure");
        }
        Ok(())
    }
}

impl Default for InMemorySearchService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexClient for InMemorySearchService {
    async fn list_index_names(&self) -> Result<Vec<String>> {
        self.check_index_calls()?;
        Ok(self.indexes.read().unwrap().keys().cloned().collect())
    }

    async fn get_index(&self, name: &str) -> Result<IndexDefinition> {
        self.check_index_calls()?;
        match self.index(name) {
            Some(index) => Ok(index),
            None => bail!("index '{}' not found", name),
        }
    }

    async fn create_index(&self, index: &IndexDefinition) -> Result<()> {
        self.check_index_calls()?;
        let mut indexes = self.indexes.write().unwrap();
        if indexes.contains_key(&index.name) {
            bail!("index '{}' already exists", index.name);
        }
        indexes.insert(index.name.clone(), index.clone());
        *self.index_writes.write().unwrap() += 1;
        Ok(())
    }

    async fn create_or_update_index(&self, index: &IndexDefinition) -> Result<()> {
        self.check_index_calls()?;
        self.indexes
            .write()
            .unwrap()
            .insert(index.name.clone(), index.clone());
        *self.index_writes.write().unwrap() += 1;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemorySearchService {
    async fn upload_documents(&self, batch: &[Document]) -> Result<Vec<UploadResult>> {
        self.upload_batches.write().unwrap().push(batch.len());
        let rejected = self.rejected_keys.read().unwrap();
        let mut documents = self.documents.write().unwrap();

        let mut results = Vec::with_capacity(batch.len());
        for doc in batch {
            if rejected.contains(&doc.key) {
                results.push(UploadResult {
                    key: doc.key.clone(),
                    succeeded: false,
                    status_code: Some(400),
                    error_message: Some("rejected".to_string()),
                });
                continue;
            }

            match documents.iter_mut().find(|d| d.key == doc.key) {
                Some(slot) => *slot = doc.clone(),
                None => documents.push(doc.clone()),
            }
            results.push(UploadResult {
                key: doc.key.clone(),
                succeeded: true,
                status_code: Some(201),
                error_message: None,
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl ConnectivityProbe for InMemorySearchService {
    async fn is_reachable(&self) -> bool {
        *self.reachable.read().unwrap()
    }
}
