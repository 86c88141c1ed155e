// crates/agnus/src/embeddings/ollama.rs
// Ollama embeddings client (local, no API key needed)

use anyhow::{Context, Result, anyhow};
use std::time::Duration;

/// Default local embedding model
const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Dimension of the default model
const DEFAULT_DIMENSIONS: usize = 768;

/// Max inputs per request
const MAX_BATCH_SIZE: usize = 64;

/// HTTP timeout (local models can be slow on first load)
const TIMEOUT_SECS: u64 = 120;

/// Ollama embeddings client
pub struct OllamaEmbeddings {
    host: String,
    model: String,
    dimensions: usize,
    http_client: reqwest::Client,
}

impl OllamaEmbeddings {
    pub fn new(host: String, model: Option<String>, dimensions: Option<usize>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            host: host.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            dimensions: dimensions.unwrap_or(DEFAULT_DIMENSIONS),
            http_client,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results.pop().ok_or_else(|| anyhow!("Empty embedding response"))
    }

    /// Embed multiple texts in batch
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut all_results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            all_results.extend(self.embed_chunk(chunk).await?);
        }
        Ok(all_results)
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.host);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Ollama embed request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        let embeddings = json["embeddings"]
            .as_array()
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings"))?;

        let mut results = Vec::with_capacity(embeddings.len());
        for values in embeddings {
            let vec: Vec<f32> = values
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama embedding row"))?
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            if vec.len() != self.dimensions {
                anyhow::bail!(
                    "Ollama returned dimension {} but {} was configured",
                    vec.len(),
                    self.dimensions
                );
            }
            results.push(vec);
        }
        Ok(results)
    }
}
