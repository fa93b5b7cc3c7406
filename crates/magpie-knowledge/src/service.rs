//! Retrieval orchestration over the chunker, embedder, and index.
//!
//! `RetrievalService` is the one entry point collaborators use: crawlers
//! and PDF extractors hand it documents, the chat layer hands it queries.
//! It owns the pipeline (boilerplate filter, whitespace cleanup, chunking,
//! batched embedding, index update, persistence) and the visibility policy
//! applied to search results.

use std::path::PathBuf;

use magpie_core::{
    ChunkMetadata, Error, IndexStats, IngestDocument, IngestReport, MagpieConfig, Result,
    SearchHit,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::boilerplate::{join_pages, strip_boilerplate};
use crate::chunker::{Chunker, normalize_whitespace};
use crate::embedding::EmbeddingProvider;
use crate::index::VectorIndex;

/// Candidate-pool inflation applied when visibility filtering is on.
///
/// Filtering after ranking can leave fewer than `k` results even when
/// enough visible chunks exist further down; fetching `k * 4` candidates
/// makes under-filling unlikely while keeping the brute-force scan cheap.
const OVERFETCH_FACTOR: usize = 4;

/// Knowledge ingestion and retrieval facade.
///
/// Explicitly constructed with its collaborators injected; there is no
/// process-wide state. The index sits behind a read-write lock so
/// searches run concurrently while ingestion holds the exclusive writer.
/// Embedding calls happen outside the lock, so a slow embedding backend
/// never blocks readers.
pub struct RetrievalService<E: EmbeddingProvider> {
    chunker: Chunker,
    provider: E,
    store_dir: PathBuf,
    index: RwLock<VectorIndex>,
}

impl<E: EmbeddingProvider> RetrievalService<E> {
    /// Open the store described by `config` with the given embedding
    /// provider, loading any previously saved index.
    ///
    /// A store directory that was never saved yields an empty index. A
    /// configured embedding dimension is pinned up front so the first add
    /// cannot establish a conflicting one.
    ///
    /// # Errors
    /// Returns an error for invalid chunker settings, an unreadable or
    /// corrupt store, or a dimension conflict between the configuration
    /// and the persisted index.
    pub async fn open(config: &MagpieConfig, provider: E) -> Result<Self> {
        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)?;
        let mut index = VectorIndex::load(&config.store_dir).await?;
        if let Some(dimension) = config.embedding.dimension {
            index.pin_dimension(dimension)?;
        }
        Ok(Self {
            chunker,
            provider,
            store_dir: config.store_dir.clone(),
            index: RwLock::new(index),
        })
    }

    /// Ingest one document: filter, chunk, embed, index, persist.
    ///
    /// Chunk ids are derived as `{source}#chunk{i}`, so re-ingesting the
    /// same source updates its chunks in place instead of duplicating
    /// them. Returns the number of chunks written. A save failure is
    /// logged but does not roll back the in-memory add; a later
    /// [`save`](Self::save) can retry.
    ///
    /// # Errors
    /// Returns [`Error::MalformedDocument`] when cleaning leaves no
    /// usable text, [`Error::Embedding`] when the embedding call fails or
    /// times out (the index is untouched), and [`Error::DimensionMismatch`]
    /// when the backend's vectors disagree with the established dimension.
    pub async fn ingest(&self, document: IngestDocument) -> Result<usize> {
        let source = document.source().to_owned();
        let written = self.ingest_in_memory(document).await?;

        if let Err(error) = self.save().await {
            warn!("Index save failed after ingesting '{source}': {error}");
        }
        Ok(written)
    }

    /// Ingest a batch of documents with per-document failure isolation.
    ///
    /// One document's failure never stops the rest of the batch: empty
    /// documents count as skipped, errored documents as failed, and the
    /// report accumulates across all of them. The index is saved once at
    /// the end rather than after every document.
    pub async fn ingest_batch(&self, documents: Vec<IngestDocument>) -> IngestReport {
        let mut report = IngestReport::default();

        for document in documents {
            let source = document.source().to_owned();
            let outcome = match self.ingest_in_memory(document).await {
                Ok(written) => IngestReport {
                    ingested: 1,
                    chunks: written,
                    ..IngestReport::default()
                },
                Err(Error::MalformedDocument(reason)) => {
                    warn!("Skipping '{source}': {reason}");
                    IngestReport {
                        skipped: 1,
                        ..IngestReport::default()
                    }
                }
                Err(error) => {
                    warn!("Failed to ingest '{source}': {error}");
                    IngestReport {
                        failed: 1,
                        ..IngestReport::default()
                    }
                }
            };
            report.merge(outcome);
        }

        if let Err(error) = self.save().await {
            warn!("Index save failed after batch ingest: {error}");
        }
        info!(
            "Batch ingest: {} documents in, {} chunks written, {} skipped, {} failed",
            report.documents(),
            report.chunks,
            report.skipped,
            report.failed
        );
        report
    }

    /// Run the ingestion pipeline up to and including the index add,
    /// without persisting.
    async fn ingest_in_memory(&self, document: IngestDocument) -> Result<usize> {
        let (text, source, category, visible_to_client) = match document {
            IngestDocument::Text {
                text,
                source,
                category,
                visible_to_client,
            } => (text, source, category, visible_to_client),
            IngestDocument::Pages {
                pages,
                source,
                category,
                visible_to_client,
            } => {
                let filtered = strip_boilerplate(&pages);
                (join_pages(&filtered), source, category, visible_to_client)
            }
        };

        let cleaned = normalize_whitespace(&text);
        let chunks = self.chunker.split(&cleaned);
        if chunks.is_empty() {
            return Err(Error::MalformedDocument(format!(
                "'{source}' has no usable text after cleaning"
            )));
        }

        let total_chunks = chunks.len();
        let ids: Vec<String> = (0..total_chunks)
            .map(|chunk_index| format!("{source}#chunk{chunk_index}"))
            .collect();
        let metadatas: Vec<ChunkMetadata> = (0..total_chunks)
            .map(|chunk_index| {
                ChunkMetadata::new(source.clone(), category.clone())
                    .with_visibility(visible_to_client)
                    .with_extra("chunk_index", chunk_index.to_string())
                    .with_extra("total_chunks", total_chunks.to_string())
            })
            .collect();

        // One batched call per document; errors here leave the index
        // untouched because the write lock is taken only afterwards.
        let embeddings = self.provider.embed_batch(chunks.clone()).await?;

        let mut index = self.index.write().await;
        index.add(ids, chunks, metadatas, embeddings)?;
        drop(index);

        info!("Ingested '{source}' as {total_chunks} chunks");
        Ok(total_chunks)
    }

    /// Search the store for the `top_k` chunks most similar to `query`.
    ///
    /// With `client_visible_only` the index is searched with an inflated
    /// candidate pool, hits flagged invisible are dropped, and the list is
    /// truncated back to `top_k`; similarity order is preserved
    /// throughout. An empty or small store returns a short or empty list,
    /// never an error.
    ///
    /// # Errors
    /// Returns [`Error::Embedding`] when the query cannot be embedded and
    /// [`Error::DimensionMismatch`] when the query embedding disagrees
    /// with the store.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        client_visible_only: bool,
    ) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.provider.embed(query).await?;

        let pool = if client_visible_only {
            top_k.saturating_mul(OVERFETCH_FACTOR)
        } else {
            top_k
        };
        let index = self.index.read().await;
        let hits = index.search(&query_embedding, pool)?;
        drop(index);

        if client_visible_only {
            Ok(hits
                .into_iter()
                .filter(|hit| hit.metadata.visible_to_client)
                .take(top_k)
                .collect())
        } else {
            Ok(hits)
        }
    }

    /// Aggregate statistics over the current in-memory index.
    pub async fn stats(&self) -> IndexStats {
        self.index.read().await.stats()
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Check whether the store holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    /// Persist the index artifact and stats sidecar to the store
    /// directory.
    ///
    /// Takes the write lock even though nothing is mutated: saves share a
    /// staging file in the store directory, so two writers racing on it
    /// could tear the artifact. Serializing saves with adds keeps the
    /// rename atomic.
    ///
    /// # Errors
    /// Returns [`Error::Persistence`] on I/O failure; the in-memory index
    /// stays authoritative and the call can be retried.
    pub async fn save(&self) -> Result<()> {
        self.index.write().await.save(&self.store_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedding, FakeEmbeddingClient};
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Embedding provider backed by a fixed text-to-vector table.
    ///
    /// Lets tests place chunks at known positions in a 2-d space; any
    /// text missing from the table fails the call, standing in for a
    /// backend outage.
    struct ScriptedEmbeddingClient {
        vectors: HashMap<String, Embedding>,
    }

    impl ScriptedEmbeddingClient {
        fn new(entries: &[(&str, [f32; 2])]) -> Self {
            Self {
                vectors: entries
                    .iter()
                    .map(|(text, vector)| ((*text).to_owned(), vector.to_vec()))
                    .collect(),
            }
        }
    }

    impl EmbeddingProvider for ScriptedEmbeddingClient {
        async fn ensure_model_available(&self) -> Result<()> {
            Ok(())
        }

        async fn embed(&self, text: &str) -> Result<Embedding> {
            self.vectors
                .get(text)
                .cloned()
                .ok_or_else(|| Error::Embedding(format!("no scripted vector for '{text}'")))
        }

        async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
            let mut embeddings = Vec::with_capacity(texts.len());
            for text in &texts {
                embeddings.push(self.embed(text).await?);
            }
            Ok(embeddings)
        }
    }

    fn store_config(temp: &TempDir) -> MagpieConfig {
        MagpieConfig {
            store_dir: temp.path().to_path_buf(),
            ..MagpieConfig::default()
        }
    }

    async fn fake_service(temp: &TempDir) -> RetrievalService<FakeEmbeddingClient> {
        RetrievalService::open(&store_config(temp), FakeEmbeddingClient)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_text_document() {
        let temp = TempDir::new().unwrap();
        let service = fake_service(&temp).await;

        let written = service
            .ingest(IngestDocument::text(
                "Opening hours are 9 to 5 on weekdays.",
                "faq.txt",
                "faq",
            ))
            .await
            .unwrap();

        assert_eq!(written, 1, "A short document becomes one chunk");
        let hits = service
            .search("Opening hours are 9 to 5 on weekdays.", 1, false)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "faq.txt#chunk0", "Ids derive from the source");
        assert_eq!(hits[0].metadata.category, "faq");
        assert_eq!(
            hits[0].metadata.extra.get("total_chunks").map(String::as_str),
            Some("1"),
            "Chunk counters travel in the extra map"
        );
    }

    #[tokio::test]
    async fn test_ingest_pages_strips_boilerplate() {
        let temp = TempDir::new().unwrap();
        let service = fake_service(&temp).await;

        let pages: Vec<String> = (0..5)
            .map(|page| format!("Unique content for page {page}.\nACME Brochure 2025"))
            .collect();
        service
            .ingest(IngestDocument::pages(pages, "brochure.pdf", "marketing"))
            .await
            .unwrap();

        let stats = service.stats().await;
        assert_eq!(stats.sources.get("brochure.pdf").copied(), Some(1));

        let hits = service.search("anything", 10, false).await.unwrap();
        assert!(
            hits.iter().all(|hit| !hit.text.contains("ACME Brochure 2025")),
            "The repeated footer never reaches the index"
        );
        assert!(
            hits.iter().any(|hit| hit.text.contains("Unique content for page 3.")),
            "Body text survives filtering"
        );
    }

    #[tokio::test]
    async fn test_reingest_updates_in_place() {
        let temp = TempDir::new().unwrap();
        let service = fake_service(&temp).await;

        service
            .ingest(IngestDocument::text("First version.", "doc.txt", "docs"))
            .await
            .unwrap();
        service
            .ingest(IngestDocument::text("Second version.", "doc.txt", "docs"))
            .await
            .unwrap();

        assert_eq!(service.len().await, 1, "Same source means same chunk ids");
        let hits = service.search("Second version.", 1, false).await.unwrap();
        assert_eq!(hits[0].text, "Second version.", "The update replaced the text");
    }

    #[tokio::test]
    async fn test_empty_document_is_malformed() {
        let temp = TempDir::new().unwrap();
        let service = fake_service(&temp).await;

        let result = service
            .ingest(IngestDocument::text("  \n\n \t\n", "blank.txt", "docs"))
            .await;
        assert!(
            matches!(result, Err(Error::MalformedDocument(_))),
            "Whitespace-only documents are rejected before embedding"
        );
        assert!(service.is_empty().await, "Nothing was written");
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let temp = TempDir::new().unwrap();
        let provider = ScriptedEmbeddingClient::new(&[
            ("good document body", [1.0, 0.0]),
            ("another good body", [0.0, 1.0]),
        ]);
        let service = RetrievalService::open(&store_config(&temp), provider)
            .await
            .unwrap();

        let report = service
            .ingest_batch(vec![
                IngestDocument::text("good document body", "one.txt", "docs"),
                IngestDocument::text("   ", "empty.txt", "docs"),
                IngestDocument::text("text the backend rejects", "bad.txt", "docs"),
                IngestDocument::text("another good body", "two.txt", "docs"),
            ])
            .await;

        assert_eq!(report.ingested, 2, "Good documents land despite the failures");
        assert_eq!(report.skipped, 1, "The empty document is skipped");
        assert_eq!(report.failed, 1, "The embedding failure is isolated");
        assert_eq!(report.chunks, 2);
        assert_eq!(service.len().await, 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_index_untouched() {
        let temp = TempDir::new().unwrap();
        let provider = ScriptedEmbeddingClient::new(&[]);
        let service = RetrievalService::open(&store_config(&temp), provider)
            .await
            .unwrap();

        let result = service
            .ingest(IngestDocument::text("unknown text", "doc.txt", "docs"))
            .await;
        assert!(matches!(result, Err(Error::Embedding(_))));
        assert!(service.is_empty().await, "A failed embed writes nothing");
    }

    #[tokio::test]
    async fn test_visibility_filter_hides_internal_chunks() {
        let temp = TempDir::new().unwrap();
        let provider = ScriptedEmbeddingClient::new(&[
            ("internal pricing sheet", [1.0, 0.0]),
            ("public product overview", [0.9, 0.1]),
            ("query", [1.0, 0.0]),
        ]);
        let service = RetrievalService::open(&store_config(&temp), provider)
            .await
            .unwrap();

        service
            .ingest(
                IngestDocument::text("internal pricing sheet", "pricing.txt", "internal")
                    .with_visibility(false),
            )
            .await
            .unwrap();
        service
            .ingest(IngestDocument::text(
                "public product overview",
                "overview.txt",
                "marketing",
            ))
            .await
            .unwrap();

        let visible = service.search("query", 5, true).await.unwrap();
        assert_eq!(visible.len(), 1, "Only the public chunk may surface");
        assert_eq!(visible[0].id, "overview.txt#chunk0");

        let all = service.search("query", 5, false).await.unwrap();
        assert_eq!(all.len(), 2, "Unfiltered search sees everything");
        assert_eq!(all[0].id, "pricing.txt#chunk0", "Internal chunk ranks first");
    }

    #[tokio::test]
    async fn test_overfetch_fills_requested_k() {
        let temp = TempDir::new().unwrap();
        // Three internal chunks dominate the ranking; the two visible
        // chunks sit below them. A naive top-2-then-filter would return
        // nothing visible.
        let provider = ScriptedEmbeddingClient::new(&[
            ("internal alpha", [1.0, 0.0]),
            ("internal beta", [0.99, 0.01]),
            ("internal gamma", [0.98, 0.02]),
            ("visible delta", [0.9, 0.1]),
            ("visible epsilon", [0.8, 0.2]),
            ("query", [1.0, 0.0]),
        ]);
        let service = RetrievalService::open(&store_config(&temp), provider)
            .await
            .unwrap();

        for text in ["internal alpha", "internal beta", "internal gamma"] {
            service
                .ingest(
                    IngestDocument::text(text, format!("{text}.txt"), "internal")
                        .with_visibility(false),
                )
                .await
                .unwrap();
        }
        for text in ["visible delta", "visible epsilon"] {
            service
                .ingest(IngestDocument::text(text, format!("{text}.txt"), "docs"))
                .await
                .unwrap();
        }

        let hits = service.search("query", 2, true).await.unwrap();
        assert_eq!(hits.len(), 2, "Over-fetching reaches past the internal block");
        assert_eq!(hits[0].text, "visible delta", "Similarity order is kept");
        assert_eq!(hits[1].text, "visible epsilon");
    }

    #[tokio::test]
    async fn test_search_zero_k_short_circuits() {
        let temp = TempDir::new().unwrap();
        let service = fake_service(&temp).await;
        let hits = service.search("anything", 0, true).await.unwrap();
        assert!(hits.is_empty(), "k = 0 never calls the backend");
    }

    #[tokio::test]
    async fn test_concurrent_saves_serialize() {
        let temp = TempDir::new().unwrap();
        let service = fake_service(&temp).await;
        service
            .ingest(IngestDocument::text(
                "Concurrent writers share one staging file.",
                "doc.txt",
                "docs",
            ))
            .await
            .unwrap();

        // Saves racing on the shared staging path must queue on the
        // write lock; both succeed and the artifact stays readable.
        let (first, second) = tokio::join!(service.save(), service.save());
        first.unwrap();
        second.unwrap();

        let reopened = RetrievalService::open(&store_config(&temp), FakeEmbeddingClient)
            .await
            .unwrap();
        assert_eq!(reopened.len().await, 1, "The saved artifact is intact");
    }

    #[tokio::test]
    async fn test_reopen_restores_search_results() {
        let temp = TempDir::new().unwrap();
        let config = store_config(&temp);

        let service = RetrievalService::open(&config, FakeEmbeddingClient)
            .await
            .unwrap();
        service
            .ingest(IngestDocument::text(
                "Deliveries ship within two days.",
                "shipping.txt",
                "faq",
            ))
            .await
            .unwrap();
        let before = service
            .search("Deliveries ship within two days.", 3, false)
            .await
            .unwrap();

        let reopened = RetrievalService::open(&config, FakeEmbeddingClient)
            .await
            .unwrap();
        let after = reopened
            .search("Deliveries ship within two days.", 3, false)
            .await
            .unwrap();

        assert_eq!(before.len(), after.len());
        for (original, reloaded) in before.iter().zip(&after) {
            assert_eq!(original.id, reloaded.id, "Ranking survives a reopen");
            assert!((original.similarity - reloaded.similarity).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_configured_dimension_is_enforced() {
        let temp = TempDir::new().unwrap();
        let mut config = store_config(&temp);
        config.embedding.dimension = Some(8);

        let provider = ScriptedEmbeddingClient::new(&[("some text", [1.0, 0.0])]);
        let service = RetrievalService::open(&config, provider).await.unwrap();

        let result = service
            .ingest(IngestDocument::text("some text", "doc.txt", "docs"))
            .await;
        assert!(
            matches!(result, Err(Error::DimensionMismatch { expected: 8, actual: 2 })),
            "A pinned dimension rejects mismatched backends"
        );
    }
}
