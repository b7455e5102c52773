//! # prepindex
//!
//! Prepares a remote search index for a JSON data set and loads it.
//!
//! Given a schema document and a data document, a run makes sure the target
//! index exists with every schema field, a vector field for content
//! embeddings, and (when the schema has an `availability` field) an
//! availability scoring profile. It then embeds each record's content and
//! uploads the records in batches.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ schema.json  │──▶│  reconcile   │──▶│  search service  │
//! │ index.json   │   │ embed+upload │   │ indexes + docs   │
//! └──────────────┘   └──────┬───────┘   └──────────────────┘
//!                           │
//!                           ▼
//!                    ┌──────────────┐
//!                    │  embeddings  │
//!                    │ OpenAI/Azure │
//!                    └──────────────┘
//! ```
//!
//! Reconciliation is additive: fields, scoring profiles and vector search
//! entries already on the index are never removed or altered.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with environment overlay |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Index definition and document wire types |
//! | [`schema`] | Schema document loading and validation |
//! | [`normalize`] | Record value normalization |
//! | [`vector`] | Vector field and vector search configuration |
//! | [`scoring`] | Availability scoring profile |
//! | [`reconcile`] | Additive index reconciliation |
//! | [`documents`] | Record to document projection |
//! | [`upload`] | Sequential batch upload |
//! | [`embedding`] | Embedding providers |
//! | [`search_client`] | REST client for the search service |
//! | [`traits`] | Service seams |
//! | [`memory`] | In-memory search service |
//! | [`pipeline`] | End-to-end run |

pub mod config;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod schema;
pub mod scoring;
pub mod search_client;
pub mod traits;
pub mod upload;
pub mod vector;

pub use error::{PrepError, Result};
