//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable consulted when a remote config carries no API key.
pub const API_KEY_ENV: &str = "RECALL_API_KEY";

/// Default endpoint root for OpenAI-compatible embedding APIs.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Which provider to build, with its settings.
///
/// Deserializes from a table tagged with `provider`:
///
/// ```
/// use recall_embed::EmbedConfig;
///
/// let config: EmbedConfig = serde_json::from_str(r#"{"provider": "tfidf", "max_vocab": 256}"#).unwrap();
/// assert!(matches!(config, EmbedConfig::TfIdf(ref c) if c.max_vocab == 256));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbedConfig {
    TfIdf(TfIdfConfig),
    Remote(RemoteEmbedConfig),
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::TfIdf(TfIdfConfig::default())
    }
}

/// Settings for the local TF-IDF provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfIdfConfig {
    /// Vocabulary size, which is also the embedding dimension
    pub max_vocab: usize,
}

impl Default for TfIdfConfig {
    fn default() -> Self {
        Self { max_vocab: 4096 }
    }
}

/// Settings for an OpenAI-compatible remote embedding endpoint
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct RemoteEmbedConfig {
    /// Bearer token; falls back to `RECALL_API_KEY` when empty
    #[builder(default)]
    #[serde(default)]
    pub api_key: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Requested embedding dimensionality
    pub dimensions: usize,
    /// Endpoint root; `/embeddings` is appended
    #[builder(default = "DEFAULT_BASE_URL.to_string()")]
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds
    #[builder(default = "30")]
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts allowed on transient failures, including the first one
    #[builder(default = "3")]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds, doubled on every retry
    #[builder(default = "500")]
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

impl RemoteEmbedConfig {
    /// Create a new remote configuration using the builder
    pub fn builder() -> RemoteEmbedConfigBuilder {
        RemoteEmbedConfigBuilder::default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// The configured key, or the `RECALL_API_KEY` environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        let key = self.api_key.trim();
        if !key.is_empty() {
            return Some(key.to_string());
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    /// Check the settings that would otherwise only fail on the first request.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(EmbedError::invalid_config("missing model name"));
        }
        if self.dimensions == 0 {
            return Err(EmbedError::invalid_config("dimensions must be positive"));
        }
        if self.max_retries == 0 {
            return Err(EmbedError::invalid_config("max_retries must be at least 1"));
        }
        if self.resolved_api_key().is_none() {
            return Err(EmbedError::invalid_config(format!(
                "missing API key (set api_key or {API_KEY_ENV})"
            )));
        }
        Ok(())
    }
}
