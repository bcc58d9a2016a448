//! # recall-embed
//!
//! Text embedding providers behind one async trait. Two providers ship with
//! the crate:
//!
//! - [`TfIdfProvider`]: a local TF-IDF model that trains its vocabulary from
//!   the corpus it is given, with no network access or model files.
//! - [`RemoteProvider`]: a client for OpenAI-compatible `/embeddings`
//!   endpoints with retry, backoff and cancellation.
//!
//! ## Quick Start
//!
//! ```
//! use recall_embed::{EmbedConfig, create_provider};
//!
//! # async fn example() -> recall_embed::Result<()> {
//! let provider = create_provider(&EmbedConfig::default())?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type.
//! [`EmbedError::is_transient`] tells whether a failure is worth retrying.

pub mod config;
pub mod error;
pub mod provider;
pub mod remote;
pub mod tfidf;

// Re-export main types for easy access
pub use config::{EmbedConfig, RemoteEmbedConfig, RemoteEmbedConfigBuilder, TfIdfConfig};
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, create_provider};
pub use remote::RemoteProvider;
pub use tfidf::{TfIdfProvider, Vocabulary};
