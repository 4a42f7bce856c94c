//! Embedding client
//!
//! OpenAI-compatible `/embeddings` endpoint. Input batches are split to the
//! contract's maximum batch size and issued sequentially; partial failures
//! fail the whole call (the pipeline embeds one query at a time anyway).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use docqa_core::{EmbeddingService, Error, Result, EMBEDDING_MAX_BATCH};

use crate::LlmError;

/// Embedding client configuration
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    /// API base URL (".../v1")
    pub endpoint: String,
    pub model: String,
    /// Output dimension D
    pub dimension: usize,
    pub timeout: Duration,
}

impl Default for EmbeddingClientConfig {
    fn default() -> Self {
        Self::from(&docqa_config::EmbeddingSettings::default())
    }
}

impl From<&docqa_config::EmbeddingSettings> for EmbeddingClientConfig {
    fn from(settings: &docqa_config::EmbeddingSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            dimension: settings.dimension,
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

/// HTTP embedding client implementing [`EmbeddingService`].
#[derive(Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    config: EmbeddingClientConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: EmbeddingClientConfig) -> std::result::Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: self.config.model.clone(),
            input: texts,
        };

        let url = format!("{}/embeddings", self.config.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::EmbeddingFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingFailed(format!("{}: {}", status, text)));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingFailed(format!("invalid response: {}", e)))?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        if data.len() != texts.len() {
            return Err(Error::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }

        for item in &data {
            if item.embedding.len() != self.config.dimension {
                return Err(Error::EmbeddingFailed(format!(
                    "dimension mismatch: expected {}, got {}",
                    self.config.dimension,
                    item.embedding.len()
                )));
            }
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(Error::Validation("embedding batch must not be empty".into()));
        }

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_MAX_BATCH) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: String,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Debug, Deserialize)]
struct EmbedItem {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let client = HttpEmbeddingClient::new(EmbeddingClientConfig::default()).unwrap();
        let err = client.embed(&[]).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_dimension_from_config() {
        let client = HttpEmbeddingClient::new(EmbeddingClientConfig::default()).unwrap();
        assert_eq!(client.dimension(), 2560);
    }

    #[test]
    fn test_response_items_reordered_by_index() {
        let json = r#"{"data":[{"index":1,"embedding":[0.2]},{"index":0,"embedding":[0.1]}]}"#;
        let mut parsed: EmbedResponse = serde_json::from_str(json).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![0.1]);
    }
}
