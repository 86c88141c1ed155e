// crates/agnus/src/llm/openai_compat.rs
// Chat-completions client for OpenAI-compatible endpoints (OpenAI, DeepSeek)

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::http_client::RetryingHttpClient;
use super::provider::{LlmClient, Provider};

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Non-streaming chat response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible chat/completions endpoint
pub struct OpenAiCompatClient {
    provider: Provider,
    url: String,
    api_key: String,
    model: String,
    http: RetryingHttpClient,
    max_tokens: Option<u32>,
}

impl OpenAiCompatClient {
    /// Create a client for a known provider with its default endpoint/model
    pub fn for_provider(provider: Provider, api_key: String) -> Self {
        Self {
            provider,
            url: provider.chat_url().to_string(),
            api_key,
            model: provider.default_model().to_string(),
            http: RetryingHttpClient::new(Duration::from_secs(300), Duration::from_secs(30)),
            max_tokens: Some(16_000),
        }
    }

    /// Override the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the endpoint URL (self-hosted gateways)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request_id = Uuid::new_v4().to_string();

        info!(
            request_id = %request_id,
            provider = %self.provider,
            model = %self.model,
            prompt_chars = prompt.len(),
            "Starting chat request"
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
        };

        let body = serde_json::to_string(&request)?;
        let response_body = self
            .http
            .post_json(&request_id, &self.url, &self.api_key, body)
            .await?;

        let response: ChatResponse = serde_json::from_str(&response_body)
            .map_err(|e| anyhow!("Malformed chat response: {}", e))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Chat response contained no content"))?;

        debug!(request_id = %request_id, response_chars = content.len(), "Chat request complete");
        Ok(content)
    }

    fn provider(&self) -> Provider {
        self.provider
    }
}
