//! Core types for the magpie knowledge engine.
//!
//! This crate provides the error taxonomy, shared data types, and
//! configuration used across the ingestion and retrieval crates.
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

/// Configuration loading and defaults.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Data types for chunks, search hits, and ingest reporting.
pub mod types;

pub use config::{EmbeddingConfig, MagpieConfig};
pub use error::{Error, Result};
pub use types::{ChunkMetadata, IndexStats, IngestDocument, IngestReport, SearchHit};
