//! JSON and JSON Lines chunking.
//!
//! The shape of the input decides the strategy:
//!
//! - multi-line input that does not open with `[` is JSONL, one chunk per
//!   non-blank line (`format=jsonl`)
//! - input opening with `[` is a JSON array, one chunk per element
//!   (`format=json_array`); if it fails to parse, the whole text becomes a
//!   single chunk
//! - anything else (a bare object or scalar) is one chunk with no `format` key

use crate::chunk::{Chunk, Chunker};

/// Chunker for JSON documents and JSON Lines streams.
#[derive(Debug, Clone)]
pub struct JsonChunker {
    max_tokens: usize,
}

impl JsonChunker {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
        }
    }

    /// Records are atomic, so the budget is advisory for this chunker.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn chunk_lines(&self, trimmed: &str) -> Vec<Chunk> {
        trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .enumerate()
            .map(|(index, line)| Chunk::new(line, index).with_meta("format", "jsonl"))
            .collect()
    }

    fn chunk_array(&self, trimmed: &str) -> Vec<Chunk> {
        let elements = match serde_json::from_str::<Vec<serde_json::Value>>(trimmed) {
            Ok(elements) => elements,
            Err(_) => return vec![Chunk::new(trimmed, 0)],
        };

        elements
            .iter()
            .enumerate()
            .map(|(index, value)| {
                // Serializing a parsed Value cannot fail
                let raw = serde_json::to_string(value).unwrap_or_default();
                Chunk::new(raw, index).with_meta("format", "json_array")
            })
            .collect()
    }
}

impl Chunker for JsonChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        if trimmed.starts_with('[') {
            self.chunk_array(trimmed)
        } else if trimmed.contains('\n') {
            self.chunk_lines(trimmed)
        } else {
            vec![Chunk::new(trimmed, 0)]
        }
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
