// crates/agnus/src/embeddings/openai.rs
// OpenAI embeddings API client

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Max characters to embed (truncate longer text)
const MAX_TEXT_CHARS: usize = 8000;

/// Max inputs per batch request (OpenAI supports up to 2048)
const MAX_BATCH_SIZE: usize = 256;

/// HTTP timeout
const TIMEOUT_SECS: u64 = 30;

/// Retry attempts for transient failures
const RETRY_ATTEMPTS: usize = 2;

/// API endpoint
const API_URL: &str = "https://api.openai.com/v1/embeddings";

/// Supported embedding models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OpenAiEmbeddingModel {
    /// text-embedding-3-small: 1536 dimensions (recommended)
    #[default]
    TextEmbedding3Small,
    /// text-embedding-3-large: 3072 dimensions
    TextEmbedding3Large,
}

impl OpenAiEmbeddingModel {
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::TextEmbedding3Small => "text-embedding-3-small",
            Self::TextEmbedding3Large => "text-embedding-3-large",
        }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            Self::TextEmbedding3Small => 1536,
            Self::TextEmbedding3Large => 3072,
        }
    }
}

/// OpenAI embeddings client
pub struct OpenAiEmbeddings {
    api_key: String,
    model: OpenAiEmbeddingModel,
    http_client: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: String, model: OpenAiEmbeddingModel) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key,
            model,
            http_client,
        }
    }

    pub fn model(&self) -> OpenAiEmbeddingModel {
        self.model
    }

    pub fn dimensions(&self) -> usize {
        self.model.dimensions()
    }

    fn truncate(text: &str) -> &str {
        crate::utils::truncate_at_boundary(text, MAX_TEXT_CHARS)
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = Self::truncate(text);
        let body = serde_json::json!({
            "model": self.model.model_name(),
            "input": text
        });

        let mut last_error = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }

            match self
                .http_client
                .post(API_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
            {
                Ok(response) => {
                    if response.status().is_success() {
                        let json: serde_json::Value = response.json().await?;
                        if let Some(values) = json["data"]
                            .as_array()
                            .and_then(|data| data.first())
                            .and_then(|first| first["embedding"].as_array())
                        {
                            let embedding: Vec<f32> = values
                                .iter()
                                .filter_map(|v| v.as_f64().map(|f| f as f32))
                                .collect();
                            if embedding.len() == self.dimensions() {
                                return Ok(embedding);
                            }
                        }
                        anyhow::bail!("Invalid embedding response");
                    } else {
                        let status = response.status();
                        let text = response.text().await.unwrap_or_default();
                        last_error = Some(anyhow::anyhow!("API error {}: {}", status, text));
                    }
                }
                Err(e) => {
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown embedding error")))
    }

    /// Embed multiple texts in batch
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut all_results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            all_results.extend(self.embed_batch_inner(chunk).await?);
        }
        Ok(all_results)
    }

    async fn embed_batch_inner(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts.iter().map(|t| Self::truncate(t)).collect();
        debug!(count = inputs.len(), "Embedding batch");

        let body = serde_json::json!({
            "model": self.model.model_name(),
            "input": inputs
        });

        let response = self
            .http_client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("Batch embed request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Batch API error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        let data = json["data"]
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid batch response"))?;

        // Results carry an index field; sort to preserve input order
        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for item in data {
            let index = item["index"].as_u64().unwrap_or(0) as usize;
            if let Some(values) = item["embedding"].as_array() {
                let vec: Vec<f32> = values
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                indexed.push((index, vec));
            }
        }
        indexed.sort_by_key(|(i, _)| *i);

        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation() {
        let long_text = "a".repeat(10000);
        assert_eq!(OpenAiEmbeddings::truncate(&long_text).len(), MAX_TEXT_CHARS);
        assert_eq!(OpenAiEmbeddings::truncate("short"), "short");
    }

    #[test]
    fn test_model_dimensions() {
        assert_eq!(OpenAiEmbeddingModel::TextEmbedding3Small.dimensions(), 1536);
        assert_eq!(OpenAiEmbeddingModel::TextEmbedding3Large.dimensions(), 3072);
    }
}
