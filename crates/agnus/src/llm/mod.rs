// crates/agnus/src/llm/mod.rs
// LLM backend contract and provider clients

mod http_client;
mod openai_compat;
pub mod provider;

pub use self::http_client::RetryingHttpClient;
pub use self::openai_compat::OpenAiCompatClient;
pub use self::provider::{LlmClient, Provider};

use std::sync::Arc;

use crate::config::ApiKeys;

/// Build an LLM client from the configured API keys.
/// Priority: DeepSeek, then OpenAI. Returns None when no key is set.
pub fn client_from_config(api_keys: &ApiKeys) -> Option<Arc<dyn LlmClient>> {
    if let Some(key) = api_keys.deepseek.as_ref() {
        return Some(Arc::new(OpenAiCompatClient::for_provider(
            Provider::DeepSeek,
            key.clone(),
        )));
    }
    if let Some(key) = api_keys.openai.as_ref() {
        return Some(Arc::new(OpenAiCompatClient::for_provider(
            Provider::OpenAi,
            key.clone(),
        )));
    }
    None
}
