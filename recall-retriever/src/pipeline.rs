//! Document pipeline: chunk, embed, index, persist.
//!
//! A [`Pipeline`] owns one chunker, one embedding provider and one HNSW
//! graph. Every chunk vector is also kept in an in-process [`MemoryStore`];
//! [`Pipeline::save`] copies that tier together with the graph snapshot and
//! the embedder state into the durable [`VectorStore`], and
//! [`Pipeline::load`] restores all three.
//!
//! Chunk ids follow the `<document>#<chunk index>` scheme.

use crate::config::RecallConfig;
use crate::index::{HnswConfig, HnswIndex, IndexStats};
use crate::storage::{MemoryStore, Snapshot, Vector, VectorStore, open_store};
use anyhow::{Context, Result};
use recall_context::{Chunker, Metadata, create_chunker};
use recall_embed::{EmbeddingProvider, create_provider};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Result count used when a search asks for zero results.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Metadata key holding the owning document id of a chunk.
pub const DOC_ID_KEY: &str = "doc_id";
/// Metadata key holding the zero-based position of a chunk.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

// Tombstones below this are not worth a rebuild
const COMPACTION_MIN_DELETED: usize = 64;

/// One ranked chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    /// `1 - distance`; 1.0 for an identical direction
    pub score: f32,
    pub distance: f32,
    pub metadata: Metadata,
    /// Chunk text, empty when unknown
    pub content: String,
}

#[derive(Debug)]
struct PipelineState {
    index: HnswIndex,
    /// Chunk id to chunk text
    content: HashMap<String, String>,
    /// Document id to its chunk ids, in chunk order
    documents: HashMap<String, Vec<String>>,
    /// Chunk ids to delete from the durable tier on the next save
    pending_deletes: HashSet<String>,
}

impl PipelineState {
    fn new(index: HnswIndex) -> Self {
        Self {
            index,
            content: HashMap::new(),
            documents: HashMap::new(),
            pending_deletes: HashSet::new(),
        }
    }

    /// Drop every chunk of `doc_id` from the graph and the content map.
    fn detach(&mut self, doc_id: &str) -> Vec<String> {
        let Some(chunk_ids) = self.documents.remove(doc_id) else {
            return Vec::new();
        };
        self.index.remove(&chunk_ids);
        for chunk_id in &chunk_ids {
            self.content.remove(chunk_id);
        }
        chunk_ids
    }

    fn maybe_compact(&mut self) -> Result<()> {
        let deleted = self.index.deleted_count();
        if deleted >= COMPACTION_MIN_DELETED && deleted > self.index.len() {
            tracing::debug!(
                "Compacting index: {} live nodes, {} tombstones",
                self.index.len(),
                deleted
            );
            self.index = self.index.compacted()?;
        }
        Ok(())
    }
}

/// The owning document of a stored chunk.
fn document_of(vector: &Vector) -> &str {
    vector
        .metadata
        .get(DOC_ID_KEY)
        .map(String::as_str)
        .or_else(|| vector.id.rsplit_once('#').map(|(doc, _)| doc))
        .unwrap_or(&vector.id)
}

fn chunk_position(chunk_id: &str) -> usize {
    chunk_id
        .rsplit_once('#')
        .and_then(|(_, index)| index.parse().ok())
        .unwrap_or(usize::MAX)
}

pub struct Pipeline {
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    memory: MemoryStore,
    durable: Option<Arc<dyn VectorStore>>,
    index_config: HnswConfig,
    state: RwLock<PipelineState>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("chunker", &self.chunker.name())
            .field("embedder", &self.embedder.provider_name())
            .field("durable", &self.durable.is_some())
            .field("index_config", &self.index_config)
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        chunker: Box<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        index_config: HnswConfig,
        durable: Option<Arc<dyn VectorStore>>,
    ) -> Result<Self> {
        index_config.validate()?;
        let index = HnswIndex::new(index_config.clone());
        Ok(Self {
            chunker,
            embedder,
            memory: MemoryStore::new(),
            durable,
            index_config,
            state: RwLock::new(PipelineState::new(index)),
        })
    }

    /// Build the chunker, embedder and durable store described by `config`.
    pub async fn from_config(config: &RecallConfig) -> Result<Self> {
        config.validate()?;
        let chunker = create_chunker(&config.chunker);
        let embedder = create_provider(&config.embedder).context("Failed to create embedder")?;
        let durable = open_store(&config.storage).await?;
        tracing::info!(
            "Pipeline ready: chunker={} embedder={} durable={:?}",
            chunker.name(),
            embedder.provider_name(),
            config.storage.backend
        );
        Self::new(chunker, embedder, config.index.clone(), durable)
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn has_durable_store(&self) -> bool {
        self.durable.is_some()
    }

    /// Let the embedder learn from whole documents before they are added.
    ///
    /// The documents are chunked first so the embedder sees the same units
    /// it will later embed.
    pub async fn fit(&self, documents: &[String]) -> Result<()> {
        let corpus: Vec<String> = documents
            .iter()
            .flat_map(|text| self.chunker.chunk(text))
            .map(|chunk| chunk.content)
            .collect();
        if corpus.is_empty() {
            return Ok(());
        }
        self.embedder.fit(&corpus).await?;
        Ok(())
    }

    /// Index `text` as document `id`, replacing any earlier version.
    ///
    /// Returns the number of chunks stored.
    pub async fn add(&self, id: &str, text: &str, metadata: &Metadata) -> Result<usize> {
        self.add_cancellable(id, text, metadata, &CancellationToken::new())
            .await
    }

    pub async fn add_cancellable(
        &self,
        id: &str,
        text: &str,
        metadata: &Metadata,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let chunks = self.chunker.chunk_with_metadata(text, metadata);

        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let result = self
                .embedder
                .embed_texts_cancellable(&texts, cancel)
                .await?;
            if result.len() != chunks.len() {
                anyhow::bail!(
                    "embedder returned {} vectors for {} chunks",
                    result.len(),
                    chunks.len()
                );
            }
            result.embeddings
        };

        let vectors: Vec<Vector> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let mut metadata = chunk.metadata;
                metadata.insert(DOC_ID_KEY.to_string(), id.to_string());
                metadata.insert(CHUNK_INDEX_KEY.to_string(), chunk.index.to_string());
                Vector::new(format!("{id}#{}", chunk.index), embedding, metadata)
                    .with_content(chunk.content)
            })
            .collect();

        let mut state = self.state.write().await;

        // Validate everything before the first mutation
        let expected = state
            .index
            .dimensions()
            .or_else(|| vectors.first().map(|v| v.embedding.len()));
        for vector in &vectors {
            state.index.validate_vector(&vector.embedding)?;
            if Some(vector.embedding.len()) != expected {
                anyhow::bail!(
                    "embedder produced vectors of mixed dimensionality for document {id}"
                );
            }
        }

        let previous = state.detach(id);
        let new_ids: HashSet<&str> = vectors.iter().map(|v| v.id.as_str()).collect();
        let stale: Vec<String> = previous
            .into_iter()
            .filter(|chunk_id| !new_ids.contains(chunk_id.as_str()))
            .collect();
        self.memory.delete(&stale).await?;
        state.pending_deletes.extend(stale);

        let count = vectors.len();
        let mut chunk_ids = Vec::with_capacity(count);
        for vector in &vectors {
            state.index.insert(vector.clone())?;
            state.pending_deletes.remove(&vector.id);
            if let Some(content) = &vector.content {
                state.content.insert(vector.id.clone(), content.clone());
            }
            chunk_ids.push(vector.id.clone());
        }
        self.memory.save(&vectors).await?;
        if !chunk_ids.is_empty() {
            state.documents.insert(id.to_string(), chunk_ids);
        }
        state.maybe_compact()?;

        tracing::debug!("Indexed document {} as {} chunks", id, count);
        Ok(count)
    }

    /// Embed `query` and return up to `k` nearest chunks (10 when `k` is 0).
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if self.state.read().await.index.is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed_text(query).await?;
        self.search_vector(&embedding, k).await
    }

    pub async fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let k = if k == 0 { DEFAULT_SEARCH_LIMIT } else { k };
        let state = self.state.read().await;
        let hits = state.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                content: state.content.get(&hit.id).cloned().unwrap_or_default(),
                score: 1.0 - hit.distance,
                distance: hit.distance,
                metadata: hit.metadata,
                id: hit.id,
            })
            .collect())
    }

    /// Remove every chunk of the given documents. Unknown ids are ignored.
    ///
    /// Returns the number of chunks removed.
    pub async fn remove(&self, doc_ids: &[String]) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut removed = Vec::new();
        for doc_id in doc_ids {
            removed.extend(state.detach(doc_id));
        }
        if removed.is_empty() {
            return Ok(0);
        }
        self.memory.delete(&removed).await?;
        let count = removed.len();
        state.pending_deletes.extend(removed);
        state.maybe_compact()?;
        tracing::debug!("Removed {} chunks of {} documents", count, doc_ids.len());
        Ok(count)
    }

    /// Write the vectors, graph and embedder state to the durable store.
    ///
    /// Does nothing without a durable store.
    pub async fn save(&self) -> Result<()> {
        let Some(durable) = &self.durable else {
            return Ok(());
        };

        let (removed, vectors, graph) = {
            let state = self.state.read().await;
            let removed: Vec<String> = state.pending_deletes.iter().cloned().collect();
            (removed, self.memory.load().await?, state.index.marshal())
        };
        let embedder_state = self.embedder.export_state().await?;

        durable
            .save_snapshot(Snapshot {
                removed: &removed,
                vectors: &vectors,
                graph: &graph,
                embedder_state: embedder_state.as_deref(),
            })
            .await
            .context("Failed to save index")?;

        let mut state = self.state.write().await;
        for id in &removed {
            state.pending_deletes.remove(id);
        }
        tracing::info!(
            "Saved {} vectors ({} deletions, {} graph bytes)",
            vectors.len(),
            removed.len(),
            graph.len()
        );
        Ok(())
    }

    /// Replace the in-process state with the durable store's contents.
    ///
    /// Without a stored graph the index is rebuilt from the raw vectors.
    /// A snapshot that cannot be decoded is an error. Returns the number of
    /// vectors loaded.
    pub async fn load(&self) -> Result<usize> {
        let Some(durable) = &self.durable else {
            return Ok(0);
        };

        let mut state = self.state.write().await;
        let vectors = durable.load().await.context("Failed to load vectors")?;
        let graph = durable.load_graph().await?;

        if let Some(embedder_state) = durable.load_embedder_state().await? {
            self.embedder
                .import_state(&embedder_state)
                .await
                .context("Failed to restore embedder state")?;
        }

        let index = match graph {
            Some(bytes) => {
                let index =
                    HnswIndex::unmarshal(&bytes).context("Stored index snapshot is corrupt")?;
                let mut stored_ids: Vec<&str> = vectors.iter().map(|v| v.id.as_str()).collect();
                stored_ids.sort_unstable();
                if index.ids() == stored_ids {
                    index
                } else {
                    tracing::warn!(
                        "Index snapshot holds {} vectors but the store has {}; rebuilding",
                        index.len(),
                        vectors.len()
                    );
                    self.rebuild(&vectors)?
                }
            }
            None => self.rebuild(&vectors)?,
        };

        let mut restored = PipelineState::new(index);
        let mut documents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for vector in &vectors {
            if let Some(content) = &vector.content {
                restored.content.insert(vector.id.clone(), content.clone());
            }
            documents
                .entry(document_of(vector).to_string())
                .or_default()
                .push(vector.id.clone());
        }
        for (doc_id, mut chunk_ids) in documents {
            chunk_ids.sort_by_key(|id| chunk_position(id));
            restored.documents.insert(doc_id, chunk_ids);
        }

        self.memory.clear().await;
        self.memory.save(&vectors).await?;
        *state = restored;

        tracing::info!(
            "Loaded {} vectors for {} documents",
            vectors.len(),
            state.documents.len()
        );
        Ok(vectors.len())
    }

    fn rebuild(&self, vectors: &[Vector]) -> Result<HnswIndex> {
        let mut index = HnswIndex::new(self.index_config.clone());
        for vector in vectors {
            index
                .insert(vector.clone())
                .with_context(|| format!("Stored vector {} cannot be indexed", vector.id))?;
        }
        Ok(index)
    }

    pub async fn document_count(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn chunk_count(&self) -> usize {
        self.state.read().await.index.len()
    }

    /// Indexed document ids, sorted.
    pub async fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().await.documents.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Metadata of the first chunk of every document.
    pub async fn document_metadata(&self) -> HashMap<String, Metadata> {
        let state = self.state.read().await;
        state
            .documents
            .iter()
            .filter_map(|(doc_id, chunk_ids)| {
                let first = chunk_ids.first()?;
                let node = state.index.get(first)?;
                Some((doc_id.clone(), node.metadata.clone()))
            })
            .collect()
    }

    pub async fn index_stats(&self) -> IndexStats {
        self.state.read().await.index.stats()
    }

    /// Close the durable store.
    pub async fn close(&self) -> Result<()> {
        if let Some(durable) = &self.durable {
            durable.close().await?;
        }
        Ok(())
    }
}
