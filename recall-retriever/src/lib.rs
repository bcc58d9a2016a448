//! recall-retriever: embedded vector search over text documents
//!
//! This crate ties the chunkers of `recall-context` and the embedding
//! providers of `recall-embed` to an HNSW graph with durable storage, and
//! adds a workspace indexer that keeps the graph in sync with files on disk.
//!
//! ## Key Modules
//!
//! - **[`pipeline`]**: Add, search, remove and persist documents
//! - **[`index`]**: HNSW graph and its binary snapshot format
//! - **[`storage`]**: Vector stores (memory, SQLite)
//! - **[`indexer`]**: Change-detecting file indexer with a background loop
//! - **[`config`]**: TOML configuration for all of the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recall_retriever::{config::RecallConfig, pipeline::Pipeline};
//! use recall_context::Metadata;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RecallConfig::default().with_workspace(Path::new("."));
//! let pipeline = Pipeline::from_config(&config).await?;
//! pipeline.load().await?;
//!
//! pipeline.add("notes", "The quick brown fox", &Metadata::new()).await?;
//! for hit in pipeline.search("fox", 5).await? {
//!     println!("{} {:.3}", hit.id, hit.score);
//! }
//! pipeline.save().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Files → Indexer → Pipeline → Chunker → EmbeddingProvider → HnswIndex
//!                      ↓                                        ↓
//!                 MemoryStore ─── save/load ─── VectorStore (SQLite)
//! ```

pub mod config;
pub mod index;
pub mod indexer;
pub mod pipeline;
pub mod storage;
