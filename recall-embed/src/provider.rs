//! Embedding provider trait and factory

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::remote::RemoteProvider;
use crate::tfidf::TfIdfProvider;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of embedding generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result. The dimension is taken from the first
    /// vector, or 0 when there are none.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that map text to fixed-size vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts, one vector per text in order
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Like [`embed_texts`](Self::embed_texts), giving up with
    /// [`EmbedError::Cancelled`] once `cancel` fires.
    async fn embed_texts_cancellable(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<EmbeddingResult> {
        if cancel.is_cancelled() {
            return Err(EmbedError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EmbedError::Cancelled),
            result = self.embed_texts(texts) => result,
        }
    }

    /// Generate the embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_response("No embedding generated for text"))
    }

    /// Let the provider learn from a corpus before anything is embedded.
    ///
    /// Providers without trainable state ignore this.
    async fn fit(&self, _corpus: &[String]) -> Result<()> {
        Ok(())
    }

    /// Serialized provider state that must survive a restart for stored
    /// embeddings to stay comparable with new ones.
    async fn export_state(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Restore state produced by [`export_state`](Self::export_state).
    async fn import_state(&self, _state: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Build the provider described by `config`.
///
/// Configuration problems (missing API key, zero dimensions) are reported
/// here rather than on the first request.
pub fn create_provider(config: &EmbedConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config {
        EmbedConfig::TfIdf(tfidf) => {
            if tfidf.max_vocab == 0 {
                return Err(EmbedError::invalid_config("max_vocab must be positive"));
            }
            tracing::info!("Using TF-IDF embeddings (max_vocab={})", tfidf.max_vocab);
            Ok(Arc::new(TfIdfProvider::new(tfidf.max_vocab)))
        }
        EmbedConfig::Remote(remote) => {
            tracing::info!(
                "Using remote embeddings: model={} dimensions={}",
                remote.model,
                remote.dimensions
            );
            Ok(Arc::new(RemoteProvider::new(remote.clone())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RemoteEmbedConfig, TfIdfConfig};
    use std::time::Duration;

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(EmbeddingResult::new(vec![vec![0.0]; texts.len()]))
        }

        fn embedding_dimension(&self) -> usize {
            1
        }

        fn provider_name(&self) -> &str {
            "slow"
        }
    }

    #[test]
    fn test_embedding_result() {
        let result = EmbeddingResult::new(vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert_eq!(EmbeddingResult::new(vec![]).dimension, 0);
    }

    #[test]
    fn test_create_provider() {
        let provider = create_provider(&EmbedConfig::TfIdf(TfIdfConfig { max_vocab: 32 })).unwrap();
        assert_eq!(provider.provider_name(), "tfidf");
        assert_eq!(provider.embedding_dimension(), 32);

        assert!(create_provider(&EmbedConfig::TfIdf(TfIdfConfig { max_vocab: 0 })).is_err());

        let remote = RemoteEmbedConfig::builder()
            .api_key("sk-test")
            .model("m")
            .dimensions(0usize)
            .build()
            .unwrap();
        assert!(create_provider(&EmbedConfig::Remote(remote)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_cancellation_interrupts_request() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = SlowProvider
            .embed_texts_cancellable(&["x".to_string()], &token)
            .await;
        assert!(matches!(result, Err(EmbedError::Cancelled)));
    }
}
