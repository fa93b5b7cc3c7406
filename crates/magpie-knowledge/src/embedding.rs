//! Embedding provider boundary and the Ollama-backed client.

use std::future::Future;
use std::process::Command;
use std::time::Duration;

use magpie_core::{EmbeddingConfig, Error, Result};
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::GenerateEmbeddingsRequest;
use tokio::time::timeout;
use tracing::info;

/// A single embedding vector.
pub type Embedding = Vec<f32>;

/// Port used when the configured URL does not override it.
const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Trait for generating embeddings from text.
///
/// The engine treats the model as a black box: deterministic for
/// identical input, fixed output dimension. Injected once at startup so
/// tests can substitute a local fake.
pub trait EmbeddingProvider: Send + Sync {
    /// Ensure the embedding model is available
    ///
    /// # Errors
    /// Returns an error if the model is not available or cannot be loaded
    fn ensure_model_available(&self) -> impl Future<Output = Result<()>> + Send;

    /// Generate embedding for text
    ///
    /// # Errors
    /// Returns an error if embedding generation fails
    fn embed(&self, text: &str) -> impl Future<Output = Result<Embedding>> + Send;

    /// Embed multiple texts in batch (sends batched requests for better performance)
    ///
    /// The output preserves input order.
    ///
    /// # Errors
    /// Returns an error if any embedding generation fails
    fn embed_batch(
        &self,
        texts: Vec<String>,
    ) -> impl Future<Output = Result<Vec<Embedding>>> + Send;
}

/// Ollama embedding client
pub struct OllamaEmbeddingClient {
    ollama: Ollama,
    model: String,
    request_timeout: Duration,
    batch_size: usize,
}

impl OllamaEmbeddingClient {
    /// Create a client from embedding configuration.
    #[allow(deprecated)]
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            ollama: Ollama::new(config.url.clone(), DEFAULT_OLLAMA_PORT),
            model: config.model.clone(),
            request_timeout: Duration::from_secs(config.timeout_secs),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Send one embeddings request, bounded by the configured timeout.
    async fn request_embeddings(
        &self,
        request: GenerateEmbeddingsRequest,
    ) -> Result<Vec<Embedding>> {
        let response = timeout(
            self.request_timeout,
            self.ollama.generate_embeddings(request),
        )
        .await
        .map_err(|_| {
            Error::Embedding(format!(
                "Request to model '{}' timed out after {}s",
                self.model,
                self.request_timeout.as_secs()
            ))
        })?
        .map_err(|error| {
            let detail = format!("{error:?}");
            if detail.contains("model") && detail.contains("not found") {
                Error::Embedding(format!(
                    "Embedding model '{}' not found. Run: ollama pull {}",
                    self.model, self.model
                ))
            } else {
                Error::Embedding(format!("Embedding generation failed: {error}"))
            }
        })?;
        Ok(response.embeddings)
    }
}

impl EmbeddingProvider for OllamaEmbeddingClient {
    async fn ensure_model_available(&self) -> Result<()> {
        // Check if Ollama is running by trying to list models
        let models = match self.ollama.list_local_models().await {
            Ok(models) => models,
            Err(error) => {
                return Err(Error::Embedding(format!(
                    "Failed to connect to Ollama: {error}.\n\nPlease ensure Ollama is installed and running:\n  - Install from: https://ollama.ai\n  - Start with: ollama serve"
                )));
            }
        };

        let model_available = models.iter().any(|model| model.name.contains(&self.model));

        if !model_available {
            info!("Embedding model '{}' not found", self.model);
            info!("Pulling model from Ollama (this may take a few minutes)...");

            // Pull with the Ollama CLI so progress reaches the operator's terminal
            let status = Command::new("ollama")
                .args(["pull", &self.model])
                .status()
                .map_err(|error| {
                    Error::Embedding(format!(
                        "Failed to run 'ollama pull {}': {}. Is Ollama installed?",
                        self.model, error
                    ))
                })?;

            if !status.success() {
                return Err(Error::Embedding(format!(
                    "Failed to pull model '{}'. Check Ollama is running.",
                    self.model
                )));
            }

            info!("✓ Pulled embedding model '{}'", self.model);
        }

        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), text.to_owned().into());
        let embeddings = self.request_embeddings(request).await?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No embeddings returned".to_owned()))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let request =
                GenerateEmbeddingsRequest::new(self.model.clone(), batch.to_vec().into());
            let mut returned = self.request_embeddings(request).await?;

            if returned.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "Backend returned {} embeddings for {} texts",
                    returned.len(),
                    batch.len()
                )));
            }
            embeddings.append(&mut returned);
        }
        Ok(embeddings)
    }
}

/// Test-only fake embedding provider (deterministic, hash-based)
///
/// Available in test builds for fast, deterministic embeddings without a
/// running Ollama server.
#[cfg(test)]
pub struct FakeEmbeddingClient;

#[cfg(test)]
impl EmbeddingProvider for FakeEmbeddingClient {
    async fn ensure_model_available(&self) -> Result<()> {
        // No-op for fake embeddings
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(Self::fake_embedding(text))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        Ok(texts
            .iter()
            .map(|text| Self::fake_embedding(text))
            .collect())
    }
}

#[cfg(test)]
impl FakeEmbeddingClient {
    /// Generate fake deterministic embedding for testing
    /// Uses simple hash of content to create a 384-dim vector
    pub fn fake_embedding(text: &str) -> Embedding {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash as _, Hasher as _};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let hash = hasher.finish();

        // Hash seeds a deterministic 384-dim vector (typical embedding size)
        let mut vector = Vec::with_capacity(384);
        for index in 0..384 {
            let value = ((hash.wrapping_add(index as u64)) % 1000) as f32 / 1000.0;
            vector.push(value);
        }
        vector
    }
}
