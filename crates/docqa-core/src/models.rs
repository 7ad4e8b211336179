//! Core data types that flow through ingestion and retrieval.

use serde::{Deserialize, Serialize};

/// Text extracted from one uploaded file, before splitting.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Per-ingestion document UUID.
    pub id: String,
    /// Original filename, carried into every chunk as its `source`.
    pub source: String,
    pub text: String,
}

/// A contiguous span of a document's text.
///
/// Chunks are immutable once created. The `hash` is the SHA-256 of `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// Filename of the document this chunk came from.
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned from a similarity search, with its cosine score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}
