//! In-memory vector index with exact cosine search and durable persistence.
//!
//! Four parallel arrays (ids, texts, metadata, embeddings) describe the
//! stored chunks; row `i` of every array belongs to the same chunk. An
//! id-to-row map gives update-in-place semantics for re-ingested content.
//! Search is exact brute force over every row, O(rows x dimension) per
//! query. That is the intended scaling limit, not an oversight; swapping
//! in an approximate structure changes recall and must be a deliberate
//! decision.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use bincode::config::standard as bincode_config;
use bincode::{Decode, Encode, decode_from_slice, encode_to_vec};
use chrono::Utc;
use magpie_core::{ChunkMetadata, Error, IndexStats, Result, SearchHit};
use serde::{Deserialize, Serialize};
use tokio::fs as async_fs;
use tokio::task::spawn_blocking;
use tracing::info;

/// Main artifact file name inside the store directory.
const INDEX_FILE: &str = "index.bin";
/// Aggregate stats sidecar, rebuildable from the main artifact.
const STATS_FILE: &str = "stats.json";

/// Persisted form of the index: a version tag plus the parallel arrays.
#[derive(Debug, Serialize, Deserialize, Encode, Decode)]
struct IndexArtifact {
    /// Version identifier for artifact invalidation
    version: u32,
    /// Chunk identifiers, one per row
    ids: Vec<String>,
    /// Chunk texts, one per row
    texts: Vec<String>,
    /// Chunk metadata, one per row
    metadatas: Vec<ChunkMetadata>,
    /// Embedding matrix, one row per chunk
    embeddings: Vec<Vec<f32>>,
}

impl IndexArtifact {
    const VERSION: u32 = 1;

    fn is_valid(&self) -> bool {
        self.version == Self::VERSION
    }
}

/// Exact brute-force vector index over parallel arrays.
#[derive(Debug, Default)]
pub struct VectorIndex {
    ids: Vec<String>,
    texts: Vec<String>,
    metadatas: Vec<ChunkMetadata>,
    embeddings: Vec<Vec<f32>>,
    rows_by_id: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl VectorIndex {
    /// Fix the embedding dimension ahead of the first add.
    ///
    /// # Errors
    /// Returns an error if the index already established a different
    /// dimension.
    pub fn pin_dimension(&mut self, dimension: usize) -> Result<()> {
        match self.dimension {
            Some(existing) if existing != dimension => Err(Error::Config(format!(
                "store dimension {existing} conflicts with configured dimension {dimension}"
            ))),
            _ => {
                self.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    /// Add chunks to the index, updating rows whose id already exists.
    ///
    /// All four slices must be the same length. Every embedding is
    /// validated against the established dimension (fixed by the first
    /// successful add when not pinned) before any row is written, so a
    /// rejected batch leaves the index untouched.
    ///
    /// # Errors
    /// Returns [`Error::CorruptIndex`] for mismatched array lengths and
    /// [`Error::DimensionMismatch`] for a wrongly sized embedding.
    pub fn add(
        &mut self,
        ids: Vec<String>,
        texts: Vec<String>,
        metadatas: Vec<ChunkMetadata>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()> {
        if ids.len() != texts.len()
            || ids.len() != metadatas.len()
            || ids.len() != embeddings.len()
        {
            return Err(Error::CorruptIndex(format!(
                "add called with mismatched lengths: {} ids, {} texts, {} metadatas, {} embeddings",
                ids.len(),
                texts.len(),
                metadatas.len(),
                embeddings.len()
            )));
        }
        let Some(first) = embeddings.first() else {
            return Ok(());
        };

        let expected = self.dimension.unwrap_or(first.len());
        for embedding in &embeddings {
            if embedding.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        self.dimension = Some(expected);

        for (((id, text), metadata), embedding) in
            ids.into_iter().zip(texts).zip(metadatas).zip(embeddings)
        {
            if let Some(&row) = self.rows_by_id.get(&id) {
                self.texts[row] = text;
                self.metadatas[row] = metadata;
                self.embeddings[row] = embedding;
            } else {
                let row = self.ids.len();
                self.rows_by_id.insert(id.clone(), row);
                self.ids.push(id);
                self.texts.push(text);
                self.metadatas.push(metadata);
                self.embeddings.push(embedding);
            }
        }
        Ok(())
    }

    /// Search for the `top_k` chunks most similar to the query embedding.
    ///
    /// Results come back in descending cosine similarity; equal scores
    /// keep insertion order (the sort is stable). An empty index returns
    /// an empty vec rather than an error.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the query embedding does
    /// not match the established dimension.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if self.ids.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension
            && query_embedding.len() != expected
        {
            return Err(Error::DimensionMismatch {
                expected,
                actual: query_embedding.len(),
            });
        }

        let mut ranked: Vec<(usize, f32)> = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(row, embedding)| (row, cosine_similarity(query_embedding, embedding)))
            .collect();
        ranked.sort_by(|first, second| second.1.partial_cmp(&first.1).unwrap_or(Ordering::Equal));

        Ok(ranked
            .into_iter()
            .take(top_k)
            .map(|(row, similarity)| SearchHit {
                id: self.ids[row].clone(),
                text: self.texts[row].clone(),
                metadata: self.metadatas[row].clone(),
                similarity,
            })
            .collect())
    }

    /// Number of stored chunks
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the index holds no chunks
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Established embedding dimension, if any
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Aggregate statistics computed from the in-memory arrays.
    pub fn stats(&self) -> IndexStats {
        let mut sources: BTreeMap<String, usize> = BTreeMap::new();
        for metadata in &self.metadatas {
            *sources.entry(metadata.source.clone()).or_insert(0) += 1;
        }
        IndexStats {
            total_chunks: self.ids.len(),
            sources,
            last_updated: Utc::now().to_rfc3339(),
            version: IndexArtifact::VERSION,
        }
    }

    /// Persist the index as one artifact plus the stats sidecar.
    ///
    /// The artifact is written to a staging file and renamed over the
    /// target so readers never observe a torn write.
    ///
    /// # Errors
    /// Returns an error if the store directory cannot be created or any
    /// write fails. The in-memory index stays authoritative either way.
    pub async fn save(&self, store_dir: &Path) -> Result<()> {
        async_fs::create_dir_all(store_dir)
            .await
            .map_err(|error| {
                Error::Persistence(format!("Failed to create store directory: {error}"))
            })?;

        let artifact = self.to_artifact();
        let bytes = spawn_blocking(move || {
            encode_to_vec(&artifact, bincode_config())
                .map_err(|error| Error::Persistence(format!("Failed to serialize index: {error}")))
        })
        .await
        .map_err(|error| Error::Persistence(format!("Task join error: {error}")))??;

        let index_path = store_dir.join(INDEX_FILE);
        let staging_path = store_dir.join(format!("{INDEX_FILE}.tmp"));
        async_fs::write(&staging_path, &bytes)
            .await
            .map_err(|error| {
                Error::Persistence(format!(
                    "Failed to write {}: {error}",
                    staging_path.display()
                ))
            })?;
        async_fs::rename(&staging_path, &index_path)
            .await
            .map_err(|error| {
                Error::Persistence(format!(
                    "Failed to replace {}: {error}",
                    index_path.display()
                ))
            })?;

        let stats_json = serde_json::to_string_pretty(&self.stats())
            .map_err(|error| Error::Persistence(format!("Failed to serialize stats: {error}")))?;
        async_fs::write(store_dir.join(STATS_FILE), stats_json)
            .await
            .map_err(|error| {
                Error::Persistence(format!("Failed to write stats sidecar: {error}"))
            })?;

        info!(
            "Saved index with {} chunks ({} bytes)",
            self.ids.len(),
            bytes.len()
        );
        Ok(())
    }

    /// Load an index from the store directory.
    ///
    /// A store that was never saved yields an empty index; that is the
    /// normal first-run path, not an error.
    ///
    /// # Errors
    /// Returns an error if the artifact cannot be read, carries an
    /// unsupported version, or fails the parallel-array invariants.
    pub async fn load(store_dir: &Path) -> Result<Self> {
        let index_path = store_dir.join(INDEX_FILE);
        if !async_fs::try_exists(&index_path).await.unwrap_or(false) {
            return Ok(Self::default());
        }

        let data = async_fs::read(&index_path).await.map_err(|error| {
            Error::Persistence(format!("Failed to read {}: {error}", index_path.display()))
        })?;
        let artifact: IndexArtifact = spawn_blocking(move || {
            decode_from_slice(&data, bincode_config())
                .map_err(|error| {
                    Error::Persistence(format!("Failed to deserialize index: {error}"))
                })
                .map(|(artifact, _)| artifact)
        })
        .await
        .map_err(|error| Error::Persistence(format!("Task join error: {error}")))??;

        if !artifact.is_valid() {
            return Err(Error::Persistence(format!(
                "Unsupported index version {} (current is {})",
                artifact.version,
                IndexArtifact::VERSION
            )));
        }

        let index = Self::from_artifact(artifact)?;
        info!(
            "Loaded index with {} chunks from {}",
            index.len(),
            index_path.display()
        );
        Ok(index)
    }

    fn to_artifact(&self) -> IndexArtifact {
        IndexArtifact {
            version: IndexArtifact::VERSION,
            ids: self.ids.clone(),
            texts: self.texts.clone(),
            metadatas: self.metadatas.clone(),
            embeddings: self.embeddings.clone(),
        }
    }

    /// Rebuild in-memory state from a decoded artifact, enforcing the
    /// parallel-array and dimension invariants.
    fn from_artifact(artifact: IndexArtifact) -> Result<Self> {
        let IndexArtifact {
            ids,
            texts,
            metadatas,
            embeddings,
            ..
        } = artifact;

        if ids.len() != texts.len()
            || ids.len() != metadatas.len()
            || ids.len() != embeddings.len()
        {
            return Err(Error::CorruptIndex(format!(
                "parallel arrays disagree: {} ids, {} texts, {} metadatas, {} embeddings",
                ids.len(),
                texts.len(),
                metadatas.len(),
                embeddings.len()
            )));
        }

        let dimension = embeddings.first().map(Vec::len);
        if let Some(expected) = dimension {
            for embedding in &embeddings {
                if embedding.len() != expected {
                    return Err(Error::CorruptIndex(format!(
                        "stored dimensions disagree: expected {expected}, found {}",
                        embedding.len()
                    )));
                }
            }
        }

        let mut rows_by_id = HashMap::with_capacity(ids.len());
        for (row, id) in ids.iter().enumerate() {
            if rows_by_id.insert(id.clone(), row).is_some() {
                return Err(Error::CorruptIndex(format!("duplicate chunk id '{id}'")));
            }
        }

        Ok(Self {
            ids,
            texts,
            metadatas,
            embeddings,
            rows_by_id,
            dimension,
        })
    }
}

/// Calculate cosine similarity between two vectors
///
/// A zero vector has similarity 0 to everything rather than dividing by
/// zero; mismatched lengths also score 0.
fn cosine_similarity(vector_a: &[f32], vector_b: &[f32]) -> f32 {
    if vector_a.len() != vector_b.len() {
        return 0.0;
    }

    let dot_product: f32 = vector_a
        .iter()
        .zip(vector_b.iter())
        .map(|(left, right)| left * right)
        .sum();
    let magnitude_a = vector_a.iter().map(|value| value * value).sum::<f32>().sqrt();
    let magnitude_b = vector_b.iter().map(|value| value * value).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
