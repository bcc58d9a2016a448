//! Storage abstraction layer for recall-retriever
//!
//! This module separates persistence from indexing. The pipeline keeps every
//! chunk vector in a [`MemoryStore`] while it runs and copies the complete
//! state into a durable [`VectorStore`] on save.
//!
//! ## Key Components
//!
//! - **VectorStore**: Async trait implemented by every backend
//! - **MemoryStore**: Map-backed store, also used as the pipeline's live tier
//! - **SqliteStore**: SQLite backend (WAL mode, transactional writes)
//! - **Snapshot**: Everything one save writes, applied atomically where the
//!   backend supports it
//!
//! ## Architecture
//!
//! ```text
//! Pipeline ── MemoryStore (live)
//!     │
//!     └── save/load ── VectorStore ─┬─ MemoryStore
//!                                   └─ SqliteStore
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use recall_context::Metadata;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

/// An embedded chunk. The id follows the `<document>#<chunk index>` scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    /// Chunk text, kept so search results can be hydrated after a reload
    pub content: Option<String>,
}

impl Vector {
    pub fn new(id: impl Into<String>, embedding: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            embedding,
            metadata,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Everything a single save persists.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    /// Ids removed since the previous save
    pub removed: &'a [String],
    /// Every live vector
    pub vectors: &'a [Vector],
    /// Encoded graph, see [`crate::index::codec`]
    pub graph: &'a [u8],
    /// Serialized embedder state, if the embedder has any
    pub embedder_state: Option<&'a [u8]>,
}

/// Persistence backend for vectors, the graph snapshot and embedder state.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace vectors by id
    async fn save(&self, vectors: &[Vector]) -> Result<()>;

    /// All stored vectors, ordered by id
    async fn load(&self) -> Result<Vec<Vector>>;

    /// Delete vectors by id; unknown ids are ignored
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Replace the stored graph snapshot
    async fn save_graph(&self, data: &[u8]) -> Result<()>;

    async fn load_graph(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the stored embedder state
    async fn save_embedder_state(&self, data: &[u8]) -> Result<()>;

    async fn load_embedder_state(&self) -> Result<Option<Vec<u8>>>;

    /// Apply a whole snapshot: deletions first, then vectors, graph and
    /// embedder state. Backends with transactions override this to apply it
    /// atomically.
    async fn save_snapshot(&self, snapshot: Snapshot<'_>) -> Result<()> {
        self.delete(snapshot.removed).await?;
        self.save(snapshot.vectors).await?;
        self.save_graph(snapshot.graph).await?;
        if let Some(state) = snapshot.embedder_state {
            self.save_embedder_state(state).await?;
        }
        Ok(())
    }

    /// Release resources held by the backend
    async fn close(&self) -> Result<()>;
}

/// Which durable backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// No durable tier; save and load are no-ops
    None,
    /// Process-local store, mostly useful for tests
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file for the SQLite backend
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn none() -> Self {
        Self {
            backend: StorageBackend::None,
            path: None,
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: Some(path.into()),
        }
    }
}

/// Open the durable tier described by `config`, or `None` for
/// [`StorageBackend::None`].
pub async fn open_store(config: &StorageConfig) -> Result<Option<Arc<dyn VectorStore>>> {
    match config.backend {
        StorageBackend::None => Ok(None),
        StorageBackend::Memory => Ok(Some(Arc::new(MemoryStore::new()))),
        StorageBackend::Sqlite => {
            let path = config
                .path
                .as_ref()
                .context("the sqlite storage backend requires a path")?;
            let store = SqliteStore::open(path)
                .await
                .with_context(|| format!("Failed to open vector database at {}", path.display()))?;
            Ok(Some(Arc::new(store)))
        }
    }
}

/// Encode an embedding as concatenated little-endian `f32` values.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`encode_embedding`].
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!(
            "embedding blob of {} bytes is not a whole number of f32 values",
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_blob_layout() {
        let bytes = encode_embedding(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_embedding(&bytes).unwrap(), vec![1.0, -2.5]);
        assert!(decode_embedding(&bytes[..7]).is_err());
        assert!(decode_embedding(&[]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_store() -> Result<()> {
        assert!(open_store(&StorageConfig::none()).await?.is_none());
        assert!(open_store(&StorageConfig::memory()).await?.is_some());
        assert!(open_store(&StorageConfig::default()).await.is_err());

        let temp_dir = tempfile::tempdir()?;
        let store = open_store(&StorageConfig::sqlite(temp_dir.path().join("index.db")))
            .await?
            .unwrap();
        assert!(store.load().await?.is_empty());
        store.close().await?;
        Ok(())
    }
}
