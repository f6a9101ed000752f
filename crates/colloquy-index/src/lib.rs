//! Document retrieval for Colloquy.
//!
//! Provides the embedding service boundary trait with a deterministic mock
//! implementation, and an in-memory document index with cosine similarity
//! search and atomic per-document replacement on re-ingest.

pub mod embedding;
pub mod error;
pub mod index;

pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding};
pub use error::IndexError;
pub use index::{DocumentIndex, IndexInfo, ScoredChunk};
