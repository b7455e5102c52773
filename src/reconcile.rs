//! Index reconciliation.
//!
//! Brings the remote index in line with the desired definition using only
//! additions. Nothing that already exists remotely is removed or replaced:
//! fields, scoring profiles and every vector search member are matched by
//! name, and an existing member always wins over a desired one with the same
//! name.
//!
//! Two reconciliations against the same index name must not run
//! concurrently; there is no version check between the fetch and the write.

use log::{debug, info, warn};
use serde_json::Map;

use crate::error::{PrepError, Result};
use crate::models::{IndexDefinition, Named, ScoringProfile, SearchField};
use crate::schema::Schema;
use crate::traits::IndexClient;
use crate::vector::VectorConfig;

/// Desired state of the target index.
#[derive(Debug, Clone)]
pub struct DesiredIndex {
    pub name: String,
    /// Non-vector fields, in schema order.
    pub fields: Vec<SearchField>,
    pub vector: VectorConfig,
    pub scoring_profile: Option<ScoringProfile>,
}

impl DesiredIndex {
    /// `schema` must already be free of the vector field's name; see
    /// [`drop_colliding_field`].
    pub fn new(
        name: impl Into<String>,
        schema: &Schema,
        vector: VectorConfig,
        scoring_profile: Option<ScoringProfile>,
    ) -> Self {
        debug_assert!(!schema.contains(vector.field_name()));
        Self {
            name: name.into(),
            fields: schema.search_fields(),
            vector,
            scoring_profile,
        }
    }

    /// Definition used when the index does not exist yet.
    pub fn to_index_definition(&self) -> IndexDefinition {
        let mut fields = self.fields.clone();
        fields.push(self.vector.field.clone());
        IndexDefinition {
            name: self.name.clone(),
            fields,
            scoring_profiles: self.scoring_profile.iter().cloned().collect(),
            vector_search: Some(self.vector.vector_search()),
            extra: Map::new(),
        }
    }
}

/// Remove a schema field that collides with the embedding field name.
///
/// The schema's own definition is discarded in favour of the vector field.
/// Data under that name in the input records will not be uploaded.
pub fn drop_colliding_field(schema: &Schema, embedding_field: &str) -> Schema {
    match schema.field(embedding_field) {
        Some(field) => {
            warn!(
                "Schema field '{}' ({}) has the embedding field name; replacing it with the vector field",
                field.name, field.data_type
            );
            schema.without_field(embedding_field)
        }
        None => schema.clone(),
    }
}

/// What [`reconcile`] did to the remote index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Append `desired` unless a member with the same name is present.
fn append_missing<T: Named + Clone>(existing: &mut Vec<T>, desired: &T) -> bool {
    if existing.iter().any(|e| e.name() == desired.name()) {
        return false;
    }
    existing.push(desired.clone());
    true
}

/// Additively merge `desired` into `existing`.
///
/// Returns the merged definition and whether anything was added. A vector
/// field added here is marked stored so its values stay retrievable.
pub fn merge_index(mut existing: IndexDefinition, desired: &DesiredIndex) -> (IndexDefinition, bool) {
    let mut changed = false;

    for field in &desired.fields {
        if append_missing(&mut existing.fields, field) {
            debug!("Adding field '{}'", field.name);
            changed = true;
        }
    }

    let mut vector_field = desired.vector.field.clone();
    vector_field.stored = Some(true);
    if append_missing(&mut existing.fields, &vector_field) {
        debug!("Adding vector field '{}'", vector_field.name);
        changed = true;
    }

    if let Some(profile) = &desired.scoring_profile {
        if append_missing(&mut existing.scoring_profiles, profile) {
            debug!("Adding scoring profile '{}'", profile.name);
            changed = true;
        }
    }

    match existing.vector_search.as_mut() {
        None => {
            debug!("Index has no vector search settings; adding them");
            existing.vector_search = Some(desired.vector.vector_search());
            changed = true;
        }
        Some(settings) => {
            let v = &desired.vector;
            changed |= append_missing(&mut settings.profiles, &v.profile);
            changed |= append_missing(&mut settings.algorithms, &v.algorithm);
            changed |= append_missing(&mut settings.compressions, &v.compression);
            if let Some(vectorizer) = &v.vectorizer {
                changed |= append_missing(&mut settings.vectorizers, vectorizer);
            }
        }
    }

    (existing, changed)
}

fn remote_err(action: &str, name: &str, err: anyhow::Error) -> PrepError {
    PrepError::IndexReconciliation(format!("{} '{}': {:#}", action, name, err))
}

/// Create the index, or add whatever the existing one is missing.
///
/// Performs one existence check, at most one fetch and at most one write.
pub async fn reconcile(client: &dyn IndexClient, desired: &DesiredIndex) -> Result<ReconcileOutcome> {
    let name = desired.name.as_str();

    let names = client
        .list_index_names()
        .await
        .map_err(|e| remote_err("listing indexes to find", name, e))?;

    if !names.iter().any(|n| n == name) {
        info!("Creating new search index {}", name);
        client
            .create_index(&desired.to_index_definition())
            .await
            .map_err(|e| remote_err("creating index", name, e))?;
        return Ok(ReconcileOutcome::Created);
    }

    info!("Search index {} already exists, checking for updates", name);
    let existing = client
        .get_index(name)
        .await
        .map_err(|e| remote_err("fetching index", name, e))?;

    let (merged, changed) = merge_index(existing, desired);
    if !changed {
        info!("Search index {} is up to date", name);
        return Ok(ReconcileOutcome::Unchanged);
    }

    client
        .create_or_update_index(&merged)
        .await
        .map_err(|e| remote_err("updating index", name, e))?;
    info!("Updated search index {}", name);
    Ok(ReconcileOutcome::Updated)
}
