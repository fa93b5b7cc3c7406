use std::collections::BTreeMap;

use bincode::{Decode, Encode};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Metadata attached to every stored chunk.
///
/// The engine inspects `source` and `visible_to_client`; everything else is
/// carried through to callers untouched. Open-ended fields (page numbers,
/// chunk counters, crawl dates) live in the ordered `extra` map so that
/// serialization stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct ChunkMetadata {
    /// Origin identifier (file name, site, feed).
    pub source: String,
    /// Caller-chosen grouping label.
    pub category: String,
    /// Whether client-facing retrieval may surface this chunk.
    pub visible_to_client: bool,
    /// RFC 3339 timestamp of ingestion.
    pub added_at: String,
    /// Passthrough fields the engine stores but never interprets.
    pub extra: BTreeMap<String, String>,
}

impl ChunkMetadata {
    /// Create metadata for a chunk, visible to clients by default.
    pub fn new<T: Into<String>>(source: T, category: T) -> Self {
        Self {
            source: source.into(),
            category: category.into(),
            visible_to_client: true,
            added_at: Utc::now().to_rfc3339(),
            extra: BTreeMap::new(),
        }
    }

    /// Set the client visibility flag.
    #[must_use]
    pub fn with_visibility(mut self, visible_to_client: bool) -> Self {
        self.visible_to_client = visible_to_client;
        self
    }

    /// Attach a passthrough field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A ranked retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Chunk identifier.
    pub id: String,
    /// Chunk content.
    pub text: String,
    /// Metadata stored with the chunk.
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub similarity: f32,
}

/// A document handed to the engine for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IngestDocument {
    /// A single body of text.
    Text {
        /// Raw document text.
        text: String,
        /// Origin identifier.
        source: String,
        /// Grouping label.
        category: String,
        /// Whether clients may see chunks of this document.
        visible_to_client: bool,
    },
    /// A paginated document, one string per extracted page.
    Pages {
        /// Raw page texts in document order.
        pages: Vec<String>,
        /// Origin identifier.
        source: String,
        /// Grouping label.
        category: String,
        /// Whether clients may see chunks of this document.
        visible_to_client: bool,
    },
}

impl IngestDocument {
    /// Build a plain-text document, visible to clients by default.
    pub fn text(
        text: impl Into<String>,
        source: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self::Text {
            text: text.into(),
            source: source.into(),
            category: category.into(),
            visible_to_client: true,
        }
    }

    /// Build a paginated document, visible to clients by default.
    pub fn pages(
        pages: Vec<String>,
        source: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self::Pages {
            pages,
            source: source.into(),
            category: category.into(),
            visible_to_client: true,
        }
    }

    /// Set the client visibility flag.
    #[must_use]
    pub fn with_visibility(mut self, visible: bool) -> Self {
        match &mut self {
            Self::Text {
                visible_to_client, ..
            }
            | Self::Pages {
                visible_to_client, ..
            } => *visible_to_client = visible,
        }
        self
    }

    /// Origin identifier of this document.
    pub fn source(&self) -> &str {
        match self {
            Self::Text { source, .. } | Self::Pages { source, .. } => source,
        }
    }

    /// Grouping label of this document.
    pub fn category(&self) -> &str {
        match self {
            Self::Text { category, .. } | Self::Pages { category, .. } => category,
        }
    }

    /// Whether clients may see chunks of this document.
    pub fn visible_to_client(&self) -> bool {
        match self {
            Self::Text {
                visible_to_client, ..
            }
            | Self::Pages {
                visible_to_client, ..
            } => *visible_to_client,
        }
    }
}

/// Outcome counts for a batch ingestion run.
///
/// `ingested` counts documents fully stored, `skipped` counts documents
/// rejected before embedding (nothing usable after cleaning), `failed`
/// counts documents that errored mid-pipeline. One document's failure
/// never aborts the rest of the batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Documents fully stored.
    pub ingested: usize,
    /// Documents with no usable text.
    pub skipped: usize,
    /// Documents that errored.
    pub failed: usize,
    /// Total chunks written across the batch.
    pub chunks: usize,
}

impl IngestReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.ingested += other.ingested;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.chunks += other.chunks;
    }

    /// Total documents seen by the batch.
    #[must_use]
    pub fn documents(&self) -> usize {
        self.ingested + self.skipped + self.failed
    }
}

/// Aggregate statistics persisted alongside the index artifact.
///
/// Rebuildable from the main artifact at any time; the sidecar exists so
/// operators can inspect a store without decoding the embedding matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of chunks in the index.
    pub total_chunks: usize,
    /// Chunk counts keyed by metadata source.
    pub sources: BTreeMap<String, usize>,
    /// RFC 3339 timestamp of the last save.
    pub last_updated: String,
    /// Artifact format version.
    pub version: u32,
}
