//! Approximate nearest-neighbor index.
//!
//! [`HnswIndex`] is a Hierarchical Navigable Small World graph over cosine
//! distance. Nodes live in an append-only list addressed by stable `u32`
//! handles; removal tombstones a node and unlinks it from the graph. The
//! whole graph can be written to and read back from a versioned binary
//! snapshot (see [`codec`]).

pub mod codec;
pub mod distance;
pub mod hnsw;

pub use distance::{cosine_distance, cosine_similarity};
pub use hnsw::{HnswConfig, HnswIndex, IndexStats, Node, SearchHit};

/// Errors raised by the index and its snapshot codec.
#[derive(Debug, thiserror::Error)]
pub enum HnswError {
    #[error("dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot index an empty vector")]
    EmptyVector,

    #[error("invalid index configuration: {0}")]
    InvalidConfig(String),

    #[error("index is full")]
    CapacityExceeded,

    #[error("corrupt index snapshot: {0}")]
    Corrupt(String),

    #[error("unsupported index snapshot version {0}")]
    UnsupportedVersion(u16),
}
