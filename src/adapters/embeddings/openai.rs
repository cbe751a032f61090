//! OpenAI embedding provider adapter.
//!
//! Talks to the `/embeddings` endpoint of any OpenAI-compatible API (OpenAI,
//! Azure OpenAI, local servers). Requests are retried with the shared
//! backoff policy; batches are split by `max_batch_size`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::errors::{KnowledgeError, KnowledgeResult};
use crate::domain::models::OpenAiSettings;
use crate::domain::ports::embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};
use crate::infrastructure::vector::retry::{RetryPolicy, Retryable};

/// Environment fallback for the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to parse embedding response: {0}")]
    Decode(String),
}

impl Retryable for ApiError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// OpenAI embedding provider.
pub struct OpenAiEmbeddingProvider {
    settings: OpenAiSettings,
    client: reqwest::Client,
    retry: RetryPolicy,
    initialized: AtomicBool,
}

impl OpenAiEmbeddingProvider {
    pub fn new(settings: OpenAiSettings) -> KnowledgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                KnowledgeError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            settings,
            client,
            retry: RetryPolicy::new(2, Duration::from_millis(200), Duration::from_secs(2)),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn api_key(&self) -> KnowledgeResult<String> {
        self.settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
            .ok_or_else(|| {
                KnowledgeError::ModelUnavailable(format!(
                    "OpenAI API key not set. Set {API_KEY_ENV} or configure embedding.openai.api_key"
                ))
            })
    }

    async fn request_once(&self, api_key: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/embeddings", self.settings.base_url.trim_end_matches('/'));
        let body = EmbeddingsRequest {
            model: &self.settings.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }

        let result: EmbeddingsResponse = response.json().await?;

        // the API does not promise input order
        let mut data = result.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn call_embeddings_api(&self, texts: Vec<String>) -> KnowledgeResult<Vec<Vec<f32>>> {
        self.initialize().await?;
        let api_key = self.api_key()?;
        let expected = texts.len();

        let vectors = self
            .retry
            .execute("openai_embeddings", || self.request_once(&api_key, &texts))
            .await
            .map_err(|err| match err {
                ApiError::Timeout(_) => KnowledgeError::timeout(
                    "openai_embeddings",
                    Duration::from_secs(self.settings.timeout_secs),
                ),
                other => KnowledgeError::ModelUnavailable(format!("embedding API: {other}")),
            })?;

        if vectors.len() != expected {
            return Err(KnowledgeError::ModelUnavailable(format!(
                "embedding API returned {} vectors for {expected} inputs",
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.settings.dimension) {
            return Err(KnowledgeError::ModelUnavailable(format!(
                "model {} produced {} dimensions, configured for {}",
                self.settings.model,
                bad.len(),
                self.settings.dimension
            )));
        }

        debug!(count = expected, model = %self.settings.model, "Embedded batch");
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.settings.dimension
    }

    /// Checks that credentials are present. No request is made.
    async fn initialize(&self) -> KnowledgeResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.api_key()?;
        if !self.initialized.swap(true, Ordering::AcqRel) {
            info!(model = %self.settings.model, "OpenAI embedding provider ready");
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn embed(&self, text: &str) -> KnowledgeResult<Vec<f32>> {
        self.call_embeddings_api(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KnowledgeError::ModelUnavailable("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, inputs: &[EmbeddingInput]) -> KnowledgeResult<Vec<EmbeddingOutput>> {
        let mut outputs = Vec::with_capacity(inputs.len());

        for chunk in inputs.chunks(self.settings.max_batch_size.max(1)) {
            let texts = chunk.iter().map(|i| i.text.clone()).collect();
            let vectors = self.call_embeddings_api(texts).await?;

            outputs.extend(chunk.iter().zip(vectors).map(|(input, vector)| EmbeddingOutput {
                id: input.id.clone(),
                vector,
            }));
        }

        Ok(outputs)
    }
}

// -- OpenAI API request/response types --

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: &str) -> OpenAiSettings {
        OpenAiSettings {
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            dimension: 3,
            max_batch_size: 2,
            ..OpenAiSettings::default()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn test_missing_key_is_model_unavailable() {
        let provider = OpenAiEmbeddingProvider::new(OpenAiSettings::default()).unwrap();
        temp_env::with_var_unset(API_KEY_ENV, || {
            assert!(matches!(
                provider.api_key(),
                Err(KnowledgeError::ModelUnavailable(_))
            ));
        });
        assert!(!provider.is_initialized());
    }

    #[test]
    fn test_key_from_env() {
        let provider = OpenAiEmbeddingProvider::new(OpenAiSettings::default()).unwrap();
        temp_env::with_var(API_KEY_ENV, Some("env-key"), || {
            assert_eq!(provider.api_key().unwrap(), "env-key");
        });
    }

    #[tokio::test]
    async fn test_embed_restores_input_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(
                r#"{"data":[{"index":1,"embedding":[0,1,0]},{"index":0,"embedding":[1,0,0]}]}"#,
            )
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new(settings(&server.url())).unwrap();
        let outputs = provider
            .embed_batch(&[EmbeddingInput::new("a", "first"), EmbeddingInput::new("b", "second")])
            .await
            .unwrap();

        assert_eq!(outputs[0].id, "a");
        assert_eq!(outputs[0].vector, vec![1.0, 0.0, 0.0]);
        assert_eq!(outputs[1].vector, vec![0.0, 1.0, 0.0]);
        assert!(provider.is_initialized());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_batches_are_chunked() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"index":0,"embedding":[1,0,0]},{"index":1,"embedding":[0,1,0]}]}"#)
            .expect(2)
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new(settings(&server.url())).unwrap();
        let inputs: Vec<_> = (0..4)
            .map(|i| EmbeddingInput::new(i.to_string(), format!("text {i}")))
            .collect();
        let outputs = provider.embed_batch(&inputs).await.unwrap();

        assert_eq!(outputs.len(), 4);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new(settings(&server.url()))
            .unwrap()
            .with_retry_policy(fast_retry());
        let err = provider.embed("text").await.unwrap_err();

        assert!(matches!(err, KnowledgeError::ModelUnavailable(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"index":0,"embedding":[1,0]}]}"#)
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new(settings(&server.url())).unwrap();
        assert!(matches!(
            provider.embed("text").await,
            Err(KnowledgeError::ModelUnavailable(_))
        ));
    }
}
