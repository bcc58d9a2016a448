//! Fixed-size sliding window chunking over whitespace tokens.

use crate::chunk::{Chunk, Chunker};

/// Emits windows of `max_tokens` words, each starting `max_tokens - overlap`
/// words after the previous one.
#[derive(Debug, Clone)]
pub struct FixedChunker {
    max_tokens: usize,
    overlap: usize,
}

impl FixedChunker {
    /// An `overlap` that is not smaller than `max_tokens` is replaced with
    /// `max_tokens / 4`.
    pub fn new(max_tokens: usize, overlap: usize) -> Self {
        let max_tokens = max_tokens.max(1);
        let overlap = if overlap < max_tokens {
            overlap
        } else {
            max_tokens / 4
        };
        Self {
            max_tokens,
            overlap,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.max_tokens.saturating_sub(self.overlap).max(1)
    }
}

impl Chunker for FixedChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < words.len() {
            let end = (start + self.max_tokens).min(words.len());
            chunks.push(Chunk::new(words[start..end].join(" "), chunks.len()));
            if end == words.len() {
                break;
            }
            start += self.step();
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
