//! Knowledge ingestion and retrieval engine.
//!
//! Turns raw documents (plain text or extracted PDF pages) into overlapping
//! chunks, embeds them through an injected provider, and serves exact
//! cosine-similarity retrieval over a durable vector index.
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

/// Repeated-line removal for paginated documents.
pub mod boilerplate;
/// Recursive separator-preference text splitting.
pub mod chunker;
/// Embedding provider boundary and the Ollama-backed client.
pub mod embedding;
/// Exact cosine vector index with durable persistence.
pub mod index;
/// Retrieval orchestration over chunker, embedder, and index.
pub mod service;

pub use chunker::Chunker;
pub use embedding::{Embedding, EmbeddingProvider, OllamaEmbeddingClient};
pub use index::VectorIndex;
pub use service::RetrievalService;
