//! recall-context: split documents into embeddable chunks
//!
//! Three strategies share the [`Chunker`] trait:
//!
//! - **[`MarkdownChunker`]**: heading-bounded sections packed by paragraph,
//!   with fenced code blocks kept whole
//! - **[`JsonChunker`]**: one chunk per JSONL line or JSON array element
//! - **[`FixedChunker`]**: sliding word windows with overlap
//!
//! Use [`create_chunker`] to build one from a [`ChunkerConfig`].

pub mod chunk;
pub mod fixed;
pub mod json;
pub mod markdown;

pub use chunk::{
    Chunk, Chunker, ChunkerConfig, ChunkerKind, DEFAULT_MAX_TOKENS, Metadata, create_chunker,
    estimate_tokens,
};
pub use fixed::FixedChunker;
pub use json::JsonChunker;
pub use markdown::MarkdownChunker;
