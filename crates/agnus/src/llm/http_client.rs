// crates/agnus/src/llm/http_client.rs
// Shared HTTP execution with retry for LLM providers

use anyhow::{Result, anyhow};
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// Maximum retry attempts for transient failures
const MAX_ATTEMPTS: u32 = 3;
/// Base backoff between retries (doubles each attempt)
const BASE_BACKOFF_SECS: u64 = 1;

/// HTTP client wrapper that retries transient provider failures:
/// 429 and 5xx responses, plus connect/timeout transport errors. Other
/// transport errors are not retried since the request may already have
/// been processed.
pub struct RetryingHttpClient {
    client: Client,
    max_attempts: u32,
    base_backoff: Duration,
}

impl RetryingHttpClient {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            max_attempts: MAX_ATTEMPTS,
            base_backoff: Duration::from_secs(BASE_BACKOFF_SECS),
        }
    }

    #[cfg(test)]
    fn with_limits(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            client: Client::new(),
            max_attempts,
            base_backoff,
        }
    }

    /// POST a JSON body with Bearer auth, retrying transient failures.
    /// Returns the response body as text.
    pub async fn post_json(
        &self,
        request_id: &str,
        url: &str,
        api_key: &str,
        body: String,
    ) -> Result<String> {
        let mut attempts = 0;
        let mut backoff = self.base_backoff;

        loop {
            let response_result = self
                .client
                .post(url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .body(body.clone())
                .send()
                .await;

            match response_result {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let error_body = response.text().await.unwrap_or_default();

                        if attempts < self.max_attempts
                            && (status.as_u16() == 429 || status.is_server_error())
                        {
                            warn!(
                                request_id = %request_id,
                                status = %status,
                                "Transient error, retrying in {:?}",
                                backoff
                            );
                            tokio::time::sleep(backoff).await;
                            attempts += 1;
                            backoff *= 2;
                            continue;
                        }

                        return Err(anyhow!("API error {}: {}", status, error_body));
                    }

                    return Ok(response.text().await?);
                }
                Err(e) => {
                    if attempts < self.max_attempts && (e.is_connect() || e.is_timeout()) {
                        warn!(
                            request_id = %request_id,
                            error = %e,
                            "Request failed (connect/timeout), retrying in {:?}",
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        backoff *= 2;
                        continue;
                    }
                    return Err(anyhow!("Request failed after retries: {}", e));
                }
            }
        }
    }
}
