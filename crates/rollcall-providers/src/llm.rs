use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rollcall_core::{ProviderConfig, ProviderError};

use crate::provider::{Completion, CompletionRequest, TextProvider, Usage};

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes `{base_url}/chat/completions`:
/// OpenAI, Groq, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rollcall_core::ProviderConfig;
/// use rollcall_providers::{CompletionClient, TextProvider};
///
/// let config = ProviderConfig {
///     name: "openai".into(),
///     model: "gpt-4o-mini".into(),
///     base_url: "https://api.openai.com/v1".into(),
///     api_key: Some("test-key".into()),
///     api_key_env: None,
/// };
/// let client = CompletionClient::new(&config, Duration::from_secs(15)).unwrap();
/// assert_eq!(client.name(), "openai");
/// ```
pub struct CompletionClient {
    client: reqwest::Client,
    name: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl CompletionClient {
    /// Create a client for one configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Configuration {
                provider: config.name.clone(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            name: config.name.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key(),
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "response_format": { "type": "json_object" },
        });
        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }
        body
    }
}

#[async_trait]
impl TextProvider for CompletionClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        if self.model.is_empty() {
            return Err(ProviderError::Configuration {
                provider: self.name.clone(),
                message: "no model configured".into(),
            });
        }
        let url = format!("{}/chat/completions", self.base_url);

        let mut http = self.client.post(&url);
        if let Some(api_key) = &self.api_key {
            http = http.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = http
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| transport_error(&self.name, &e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body_text = response.text().await.unwrap_or_default();
            return Err(status_error(&self.name, status, body_text, retry_after));
        }

        let response_body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: self.name.clone(),
                    message: format!("failed to parse response: {e}"),
                })?;

        let text = response_body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: self.name.clone(),
                message: format!("unexpected response structure: {response_body}"),
            })?;

        let usage = response_body.get("usage").and_then(|u| {
            Some(Usage {
                prompt_tokens: u.get("prompt_tokens")?.as_u64()? as u32,
                completion_tokens: u.get("completion_tokens")?.as_u64()? as u32,
            })
        });

        Ok(Completion {
            text: text.to_string(),
            usage,
        })
    }
}

/// Map a non-success HTTP status to a typed provider error.
pub(crate) fn status_error(
    provider: &str,
    status: StatusCode,
    body: String,
    retry_after: Option<Duration>,
) -> ProviderError {
    let provider = provider.to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            provider,
            retry_after,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::Timeout { provider }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth {
            provider,
            message: body,
        },
        _ => ProviderError::Http {
            provider,
            status: status.as_u16(),
            message: body,
        },
    }
}

/// Map a transport failure (no HTTP status) to a typed provider error.
pub(crate) fn transport_error(provider: &str, error: &reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        ProviderError::Http {
            provider: provider.to_string(),
            status: 0,
            message: format!("request failed: {error}"),
        }
    }
}

pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
