//! OpenAI-compatible embedding client.
//!
//! Splits input into fixed-size batches and checks every returned vector
//! against the configured dimensionality.

use std::time::Duration;

use async_trait::async_trait;
use rollcall_core::{ProviderConfig, ProviderError};
use serde::{Deserialize, Serialize};

use crate::llm::{retry_after, status_error, transport_error};
use crate::provider::EmbeddingProvider;

const DEFAULT_BATCH_SIZE: usize = 64;

/// Client for an `{base_url}/embeddings` endpoint.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rollcall_core::ProviderConfig;
/// use rollcall_providers::{EmbeddingClient, EmbeddingProvider};
///
/// let config = ProviderConfig {
///     name: "openai".into(),
///     model: "text-embedding-3-small".into(),
///     base_url: "https://api.openai.com/v1".into(),
///     api_key: Some("test-key".into()),
///     api_key_env: None,
/// };
/// let client = EmbeddingClient::new(&config, 1536, Duration::from_secs(10)).unwrap();
/// assert_eq!(client.dimensions(), 1536);
/// ```
pub struct EmbeddingClient {
    client: reqwest::Client,
    name: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    dimensions: usize,
    batch_size: usize,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    /// Create a client for one configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] if the HTTP client cannot be built.
    pub fn new(
        config: &ProviderConfig,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
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
            dimensions,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Override the number of texts sent per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn embed_chunk(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut http = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                input: batch,
            });
        if let Some(api_key) = &self.api_key {
            http = http.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = http
            .send()
            .await
            .map_err(|e| transport_error(&self.name, &e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(status_error(&self.name, status, body, retry_after));
        }

        let mut embed_response: EmbedResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: self.name.clone(),
                    message: format!("failed to parse response: {e}"),
                })?;

        if embed_response.data.len() != batch.len() {
            return Err(ProviderError::InvalidResponse {
                provider: self.name.clone(),
                message: format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embed_response.data.len()
                ),
            });
        }

        embed_response.data.sort_by_key(|item| item.index);
        embed_response
            .data
            .into_iter()
            .map(|item| {
                if item.embedding.len() == self.dimensions {
                    Ok(item.embedding)
                } else {
                    Err(ProviderError::DimensionMismatch {
                        provider: self.name.clone(),
                        expected: self.dimensions,
                        actual: item.embedding.len(),
                    })
                }
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all_embeddings.extend(self.embed_chunk(batch).await?);
        }
        Ok(all_embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_model_and_input() {
        let input = vec!["a".to_string(), "b".to_string()];
        let request = EmbedRequest {
            model: "text-embedding-3-small",
            input: &input,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert_eq!(json["input"][1], "b");
    }

    #[test]
    fn response_items_without_index_parse() {
        let body = r#"{"data":[{"embedding":[0.1,0.2]}]}"#;
        let parsed: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].index, None);
        assert_eq!(parsed.data[0].embedding.len(), 2);
    }
}
