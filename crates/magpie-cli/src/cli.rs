//! Command-line argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Operator interface to a magpie knowledge store.
#[derive(Parser)]
#[command(name = "magpie")]
#[command(about = "Ingest documents and search them by semantic similarity")]
pub struct Cli {
    /// Path to a config file (defaults to ~/.magpie/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store directory, overriding the configured one
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Operations over the knowledge store.
#[derive(Subcommand)]
pub enum Command {
    /// Ingest a UTF-8 text file, or every .txt/.md file in a directory
    Ingest {
        /// File or directory to ingest
        path: PathBuf,

        /// Source label (defaults to the file name)
        #[arg(long)]
        source: Option<String>,

        /// Category label attached to every chunk
        #[arg(long, default_value = "general")]
        category: String,

        /// Mark the content internal (hidden from client-facing search)
        #[arg(long)]
        internal: bool,
    },

    /// Search the store for chunks similar to a query
    Search {
        /// Free-text query
        query: String,

        /// Maximum number of results
        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Include internal chunks in the results
        #[arg(long)]
        all: bool,
    },

    /// Show aggregate store statistics
    Stats,
}
