//! Magpie CLI - operator interface to the knowledge store
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Test allows"
    )
)]

use clap::Parser as _;
use magpie_core::Result;
use magpie_knowledge::{EmbeddingProvider as _, OllamaEmbeddingClient, RetrievalService};

use cli::{Cli, Command};

mod cli;
mod handlers;

#[tokio::main]
async fn main() -> Result<()> {
    handlers::init_logging();

    let cli = Cli::parse();
    let config = handlers::resolve_config(&cli)?;
    let provider = OllamaEmbeddingClient::new(&config.embedding);

    // Only commands that embed need the model; stats reads the store as-is.
    if !matches!(cli.command, Command::Stats) {
        provider.ensure_model_available().await?;
    }
    let service = RetrievalService::open(&config, provider).await?;

    match cli.command {
        Command::Ingest {
            path,
            source,
            category,
            internal,
        } => handlers::handle_ingest(&service, &path, source, &category, internal).await?,
        Command::Search { query, limit, all } => {
            handlers::handle_search(&service, &query, limit, all).await?;
        }
        Command::Stats => handlers::handle_stats(&service).await,
    }

    Ok(())
}
