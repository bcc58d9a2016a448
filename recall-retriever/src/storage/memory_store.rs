//! In-process [`VectorStore`].

use super::{Vector, VectorStore};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Map-backed store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    vectors: RwLock<HashMap<String, Vector>>,
    graph: RwLock<Option<Vec<u8>>>,
    embedder_state: RwLock<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored ids, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.vectors.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vectors.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<Vector> {
        self.vectors.read().await.get(id).cloned()
    }

    /// Drop every vector, the graph and the embedder state.
    pub async fn clear(&self) {
        self.vectors.write().await.clear();
        *self.graph.write().await = None;
        *self.embedder_state.write().await = None;
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn save(&self, vectors: &[Vector]) -> Result<()> {
        let mut map = self.vectors.write().await;
        for vector in vectors {
            map.insert(vector.id.clone(), vector.clone());
        }
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Vector>> {
        let mut vectors: Vec<Vector> = self.vectors.read().await.values().cloned().collect();
        vectors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(vectors)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut map = self.vectors.write().await;
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }

    async fn save_graph(&self, data: &[u8]) -> Result<()> {
        *self.graph.write().await = Some(data.to_vec());
        Ok(())
    }

    async fn load_graph(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.graph.read().await.clone())
    }

    async fn save_embedder_state(&self, data: &[u8]) -> Result<()> {
        *self.embedder_state.write().await = Some(data.to_vec());
        Ok(())
    }

    async fn load_embedder_state(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.embedder_state.read().await.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
