//! Core chunk types shared by every chunking strategy.
//!
//! A [`Chunker`] turns a document into an ordered list of [`Chunk`]s. Each chunk
//! carries its ordinal within the document and a string metadata map that the
//! caller can seed through [`Chunker::chunk_with_metadata`].
//!
//! Chunk sizes are measured with [`estimate_tokens`], a whitespace word count.
//! It is not a real tokenizer, but every size guarantee in this crate is
//! expressed in terms of it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fixed::FixedChunker;
use crate::json::JsonChunker;
use crate::markdown::MarkdownChunker;

/// String metadata attached to chunks and vectors.
///
/// Ordered so that serialized forms are deterministic.
pub type Metadata = BTreeMap<String, String>;

/// Default token budget per chunk.
pub const DEFAULT_MAX_TOKENS: usize = 512;

/// A single fragment of a document prepared for independent embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The text of this fragment.
    pub content: String,
    /// Zero-based position of this chunk within its document.
    pub index: usize,
    /// Inherited caller metadata plus chunker-specific keys.
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(content: impl Into<String>, index: usize) -> Self {
        Self {
            content: content.into(),
            index,
            metadata: Metadata::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Token estimate of this chunk's content.
    pub fn tokens(&self) -> usize {
        estimate_tokens(&self.content)
    }
}

/// Cheap token estimate: the number of whitespace-delimited words.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Splits raw document text into chunks.
pub trait Chunker: Send + Sync {
    /// Split `text` into chunks in reading order. Empty input yields no chunks.
    fn chunk(&self, text: &str) -> Vec<Chunk>;

    /// Like [`chunk`](Self::chunk), copying `metadata` onto every chunk.
    ///
    /// Keys set by the chunker itself (for example `heading` or `format`)
    /// take precedence over caller keys with the same name.
    fn chunk_with_metadata(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        self.chunk(text)
            .into_iter()
            .map(|mut chunk| {
                let mut merged = metadata.clone();
                merged.append(&mut chunk.metadata);
                chunk.metadata = merged;
                chunk
            })
            .collect()
    }

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}

/// Which chunking strategy to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkerKind {
    #[default]
    Markdown,
    Json,
    Fixed,
}

/// Configuration for [`create_chunker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub kind: ChunkerKind,
    /// Maximum token estimate per chunk
    pub max_tokens: usize,
    /// Words shared between consecutive windows (fixed chunker only)
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            kind: ChunkerKind::Markdown,
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap: DEFAULT_MAX_TOKENS / 8,
        }
    }
}

impl ChunkerConfig {
    pub fn new(kind: ChunkerKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }
}

/// Build the chunker described by `config`.
pub fn create_chunker(config: &ChunkerConfig) -> Box<dyn Chunker> {
    match config.kind {
        ChunkerKind::Markdown => Box::new(MarkdownChunker::new(config.max_tokens)),
        ChunkerKind::Json => Box::new(JsonChunker::new(config.max_tokens)),
        ChunkerKind::Fixed => Box::new(FixedChunker::new(config.max_tokens, config.overlap)),
    }
}
