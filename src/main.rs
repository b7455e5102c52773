//! # prepindex CLI
//!
//! Reconciles the target search index with a schema document, then embeds
//! and uploads the records of a data document.
//!
//! ## Usage
//!
//! ```bash
//! prepindex --searchservice my-search --index products \
//!     --schema ./new-data/index-schema.json --data ./new-data/index.json
//! ```
//!
//! Settings not given on the command line come from the `AZURE_*` and
//! `OPENAI_*` environment variables, then from `--config`
//! (`./config/prepindex.toml` by default; a missing file is fine).
//! See `config/prepindex.example.toml`.

use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

use prepindex::config;
use prepindex::pipeline::{self, RunOptions};

/// Prepare a search index and load JSON records into it.
#[derive(Parser)]
#[command(
    name = "prepindex",
    about = "Prepare a search index from a schema and upload JSON records with embeddings",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, default_value = "./config/prepindex.toml")]
    config: PathBuf,

    /// JSON array of records to upload.
    #[arg(long, default_value = "./new-data/index.json")]
    data: PathBuf,

    /// Schema document describing the index fields.
    #[arg(long, default_value = "./new-data/index-schema.json")]
    schema: PathBuf,

    /// Target index name. Overrides the schema's `name`.
    #[arg(long)]
    index: Option<String>,

    /// Search service name (`<name>.search.windows.net`).
    #[arg(long = "searchservice")]
    search_service: Option<String>,

    /// Record field whose text is embedded.
    #[arg(long = "contentfield", default_value = pipeline::DEFAULT_CONTENT_FIELD)]
    content_field: String,

    /// Name of the vector field. Defaults to `embedding`.
    #[arg(long = "embeddingfield")]
    embedding_field: Option<String>,

    /// Search service admin key. Blank values are ignored.
    #[arg(long = "searchkey")]
    search_key: Option<String>,

    /// Send one text per embedding request.
    #[arg(long = "disablebatchvectors")]
    disable_batch_vectors: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            data_path: self.data.clone(),
            schema_path: self.schema.clone(),
            index_name: self.index.clone(),
            search_service: self.search_service.clone(),
            content_field: self.content_field.clone(),
            embedding_field: self.embedding_field.clone(),
            search_key: self.search_key.clone(),
            disable_batch_vectors: self.disable_batch_vectors,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut cfg = config::load_config_or_default(&cli.config)?;
    cfg.apply_env()?;
    let summary = pipeline::run(cfg, &cli.run_options()).await?;
    println!(
        "Index {}: {:?}, {} documents uploaded in {} batches.",
        summary.index_name, summary.outcome, summary.upload.documents, summary.upload.batches
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(&cli).await
}
