//! Vector store abstraction for docqa.
//!
//! The [`VectorStore`] trait covers the operations the ingestion and
//! question pipelines need: append embedded chunks and run a top-k
//! similarity search. Stores are plain owned values (`&mut self` for
//! writes) so callers can clone a snapshot, mutate it, and swap it in.

pub mod memory;

use anyhow::Result;

use crate::models::{Chunk, RetrievedChunk};

/// Abstract nearest-neighbor store over embedded chunks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorStore::add) | Append chunks with their embedding vectors |
/// | [`similarity_search`](VectorStore::similarity_search) | Top-k chunks by cosine similarity |
///
/// # Ranking
///
/// Results are ordered by similarity descending. Ties keep insertion order
/// (the earlier-added chunk ranks first). Searching an empty store returns
/// an empty list rather than an error.
pub trait VectorStore: Send + Sync {
    /// Number of stored chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality of stored vectors, or `None` before the first insert.
    fn dims(&self) -> Option<usize>;

    /// Append chunks and their vectors (same length, same order).
    fn add(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<()>;

    /// Return up to `k` chunks most similar to `query_vec`.
    fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;
}
