// crates/agnus/src/embeddings/mod.rs
// Embedding provider module

mod ollama;
mod openai;

pub use self::ollama::OllamaEmbeddings;
pub use self::openai::{OpenAiEmbeddingModel, OpenAiEmbeddings};

use anyhow::Result;
use tracing::info;

use crate::config::{ApiKeys, EmbeddingsConfig};

/// Backend-specific embedding implementation
enum EmbeddingBackend {
    OpenAi(OpenAiEmbeddings),
    Ollama(OllamaEmbeddings),
}

/// Embedding client with automatic provider selection
///
/// Priority: OpenAI (highest quality) > Ollama (local, no key needed)
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    /// Provider identifier for change detection
    pub fn provider_id(&self) -> &'static str {
        match &self.backend {
            EmbeddingBackend::OpenAi(_) => "openai",
            EmbeddingBackend::Ollama(_) => "ollama",
        }
    }

    /// Create a new embedding client from pre-loaded configuration
    pub fn from_config(api_keys: &ApiKeys, config: &EmbeddingsConfig) -> Option<Self> {
        if let Some(api_key) = api_keys.openai.as_ref() {
            info!("Using OpenAI embeddings (text-embedding-3-small)");
            return Some(Self {
                backend: EmbeddingBackend::OpenAi(OpenAiEmbeddings::new(
                    api_key.clone(),
                    OpenAiEmbeddingModel::default(),
                )),
            });
        }

        if let Some(host) = api_keys.ollama.as_ref() {
            let client = OllamaEmbeddings::new(
                host.clone(),
                config.ollama_embedding_model.clone(),
                config.dimensions,
            );
            info!(
                model = client.model_name(),
                dimensions = client.dimensions(),
                "Using Ollama embeddings"
            );
            return Some(Self {
                backend: EmbeddingBackend::Ollama(client),
            });
        }

        None
    }

    /// Create a new embedding client from environment configuration
    pub fn from_env() -> Option<Self> {
        Self::from_config(&ApiKeys::from_env(), &EmbeddingsConfig::from_env())
    }

    /// Vector dimension reported by the active backend
    pub fn dimensions(&self) -> usize {
        match &self.backend {
            EmbeddingBackend::OpenAi(c) => c.dimensions(),
            EmbeddingBackend::Ollama(c) => c.dimensions(),
        }
    }

    /// Model name for display/logging
    pub fn model_name(&self) -> String {
        match &self.backend {
            EmbeddingBackend::OpenAi(c) => c.model().model_name().to_string(),
            EmbeddingBackend::Ollama(c) => c.model_name().to_string(),
        }
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match &self.backend {
            EmbeddingBackend::OpenAi(c) => c.embed(text).await,
            EmbeddingBackend::Ollama(c) => c.embed(text).await,
        }
    }

    /// Embed multiple texts in batch
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match &self.backend {
            EmbeddingBackend::OpenAi(c) => c.embed_batch(texts).await,
            EmbeddingBackend::Ollama(c) => c.embed_batch(texts).await,
        }
    }
}
