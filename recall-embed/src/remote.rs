//! Embeddings from an OpenAI-compatible HTTP endpoint.

use crate::config::RemoteEmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff doubles at most this many times.
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Async client for `POST {base_url}/embeddings`.
///
/// Every call sends a single request carrying all inputs. Rate limiting (429),
/// server errors and transport failures are retried with exponential backoff;
/// any other error status fails the call immediately.
#[derive(Debug, Clone)]
pub struct RemoteProvider {
    client: Client,
    endpoint: String,
    config: RemoteEmbedConfig,
}

impl RemoteProvider {
    pub fn new(config: RemoteEmbedConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| EmbedError::invalid_config("missing API key"))?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| EmbedError::invalid_config("API key is not a valid header value"))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &RemoteEmbedConfig {
        &self.config
    }

    /// Delay before retry number `attempt + 1`.
    fn retry_backoff(&self, attempt: u32) -> Duration {
        self.config.base_delay() * (1u32 << attempt.min(MAX_BACKOFF_EXPONENT))
    }

    async fn request_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimensions,
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            EmbedError::invalid_response(format!("failed to parse embedding response: {e}"))
        })?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(EmbedError::invalid_response(format!(
                "endpoint returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        if let Some(bad) = parsed
            .data
            .iter()
            .find(|entry| entry.embedding.len() != self.config.dimensions)
        {
            return Err(EmbedError::invalid_response(format!(
                "embedding {} has {} dimensions, expected {}",
                bad.index,
                bad.embedding.len(),
                self.config.dimensions
            )));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        self.embed_texts_cancellable(texts, &CancellationToken::new())
            .await
    }

    async fn embed_texts_cancellable(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult {
                embeddings: vec![],
                dimension: self.config.dimensions,
            });
        }

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(EmbedError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EmbedError::Cancelled),
                outcome = self.request_once(texts) => outcome,
            };

            match outcome {
                Ok(embeddings) => {
                    debug!(
                        "Embedded {} texts via {} (attempt {})",
                        texts.len(),
                        self.endpoint,
                        attempt + 1
                    );
                    return Ok(EmbeddingResult {
                        embeddings,
                        dimension: self.config.dimensions,
                    });
                }
                Err(err) if err.is_transient() && attempt + 1 < self.config.max_retries => {
                    let delay = self.retry_backoff(attempt);
                    warn!(
                        "Embedding request failed ({}), retrying in {:?} ({}/{})",
                        err,
                        delay,
                        attempt + 1,
                        self.config.max_retries
                    );
                    attempt += 1;
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(EmbedError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimensions
    }

    fn provider_name(&self) -> &str {
        "remote"
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
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
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> RemoteEmbedConfig {
        RemoteEmbedConfig::builder()
            .api_key("sk-test")
            .model("test-model")
            .dimensions(2usize)
            .base_url(server.uri())
            .max_retries(3u32)
            .base_delay_ms(1u64)
            .build()
            .unwrap()
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_reorders_response_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "input": ["first", "second"],
                "dimensions": 2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [0.0, 1.0], "index": 1},
                    {"embedding": [1.0, 0.0], "index": 0}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = RemoteProvider::new(config_for(&server)).unwrap();
        let result = provider.embed_texts(&texts(&["first", "second"])).await.unwrap();

        assert_eq!(result.embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(result.dimension, 2);
    }

    #[tokio::test]
    async fn test_retries_rate_limit_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.5, 0.5], "index": 0}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = RemoteProvider::new(config_for(&server)).unwrap();
        let embedding = provider.embed_text("hello").await.unwrap();
        assert_eq!(embedding, vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = RemoteProvider::new(config_for(&server)).unwrap();
        let err = provider.embed_texts(&texts(&["x"])).await.unwrap_err();
        match err {
            EmbedError::Api { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad input");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let provider = RemoteProvider::new(config_for(&server)).unwrap();
        let err = provider.embed_texts(&texts(&["x"])).await.unwrap_err();
        assert!(matches!(err, EmbedError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_length_mismatch_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.5, 0.5], "index": 0}]
            })))
            .mount(&server)
            .await;

        let provider = RemoteProvider::new(config_for(&server)).unwrap();
        let err = provider.embed_texts(&texts(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.base_delay_ms = 60_000;
        let provider = RemoteProvider::new(config).unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = provider
            .embed_texts_cancellable(&texts(&["x"]), &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RemoteEmbedConfig::builder()
            .api_key("k")
            .model("m")
            .dimensions(4usize)
            .base_delay_ms(10u64)
            .build()
            .unwrap();
        let provider = RemoteProvider::new(config).unwrap();
        assert_eq!(provider.retry_backoff(0), Duration::from_millis(10));
        assert_eq!(provider.retry_backoff(2), Duration::from_millis(40));
        assert_eq!(provider.retry_backoff(20), Duration::from_millis(320));
        assert_eq!(provider.endpoint(), "https://api.openai.com/v1/embeddings");
    }
}
