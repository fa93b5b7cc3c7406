use core::result::Result as CoreResult;
use std::io::Error as IoError;

use thiserror::Error;

/// Result type for knowledge engine operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur in the knowledge engine.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An embedding's length disagrees with the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was established with.
        expected: usize,
        /// Dimension of the rejected embedding.
        actual: usize,
    },

    /// The external embedding call failed or timed out.
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Saving or loading the index failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A document produced no usable text after cleaning.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The stored arrays disagree with each other.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Returns `true` for transient failures like embedding timeouts or a
    /// save that hit a full disk; the in-memory index stays authoritative
    /// until a retry succeeds.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embedding(_) | Self::Persistence(_))
    }
}
