//! In-memory [`VectorStore`] with brute-force cosine search.
//!
//! Every query is scored against every stored vector. This is the whole
//! index: persistence is handled by the app crate, which reads and writes
//! the entries exposed here.

use anyhow::{bail, Result};

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, RetrievedChunk};

use super::VectorStore;

/// A chunk paired with its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Flat in-memory index tagged with the embedding model that produced it.
#[derive(Debug, Clone)]
pub struct InMemoryVectorStore {
    model: String,
    dims: Option<usize>,
    entries: Vec<IndexEntry>,
}

impl InMemoryVectorStore {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            dims: None,
            entries: Vec::new(),
        }
    }

    /// Rebuild a store from previously persisted entries.
    ///
    /// Every vector must have length `dims`.
    pub fn from_entries(
        model: impl Into<String>,
        dims: Option<usize>,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        if let Some(d) = dims {
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != d) {
                bail!(
                    "chunk {} has {} dimensions, index expects {}",
                    bad.chunk.id,
                    bad.vector.len(),
                    d
                );
            }
        } else if !entries.is_empty() {
            bail!("index has entries but no dimensionality");
        }
        Ok(Self {
            model: model.into(),
            dims,
            entries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Distinct chunk sources in first-indexed order.
    pub fn sources(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for e in &self.entries {
            if !out.iter().any(|s| s == &e.chunk.source) {
                out.push(e.chunk.source.clone());
            }
        }
        out
    }
}

impl VectorStore for InMemoryVectorStore {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    fn add(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let mut dims = self.dims;
        for v in &vectors {
            if v.is_empty() {
                bail!("embedding vector is empty");
            }
            match dims {
                Some(d) if d != v.len() => {
                    bail!("embedding has {} dimensions, index expects {}", v.len(), d)
                }
                Some(_) => {}
                None => dims = Some(v.len()),
            }
        }

        self.dims = dims;
        self.entries.extend(
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry { chunk, vector }),
        );
        Ok(())
    }

    fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(d) = self.dims {
            if query_vec.len() != d {
                bail!(
                    "query embedding has {} dimensions, index expects {}",
                    query_vec.len(),
                    d
                );
            }
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query_vec, &e.vector)))
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| RetrievedChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, source: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: format!("doc-{}", source),
            source: source.to_string(),
            chunk_index: 0,
            text: format!("text of {}", id),
            hash: String::new(),
        }
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let mut store = InMemoryVectorStore::new("test");
        store
            .add(
                vec![chunk("a", "a.pdf"), chunk("b", "b.pdf"), chunk("c", "c.pdf")],
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            )
            .unwrap();

        let hits = store.similarity_search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "b");
        assert_eq!(hits[1].chunk.id, "c");
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut store = InMemoryVectorStore::new("test");
        store
            .add(
                vec![chunk("first", "a.pdf"), chunk("second", "b.pdf")],
                vec![vec![1.0, 0.0], vec![2.0, 0.0]],
            )
            .unwrap();
        let hits = store.similarity_search(&[1.0, 0.0], 5).unwrap();
        assert_eq!(hits[0].chunk.id, "first");
        assert_eq!(hits[1].chunk.id, "second");
    }

    #[test]
    fn test_empty_store_returns_no_hits() {
        let store = InMemoryVectorStore::new("test");
        assert!(store.similarity_search(&[1.0, 2.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut store = InMemoryVectorStore::new("test");
        store.add(vec![chunk("a", "a.pdf")], vec![vec![1.0, 0.0]]).unwrap();
        assert!(store
            .add(vec![chunk("b", "b.pdf")], vec![vec![1.0, 0.0, 0.0]])
            .is_err());
        assert!(store.similarity_search(&[1.0], 1).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let mut store = InMemoryVectorStore::new("test");
        assert!(store.add(vec![chunk("a", "a.pdf")], vec![]).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_sources_are_distinct_in_order() {
        let mut store = InMemoryVectorStore::new("test");
        store
            .add(
                vec![chunk("1", "b.pdf"), chunk("2", "a.pdf"), chunk("3", "b.pdf")],
                vec![vec![1.0], vec![1.0], vec![1.0]],
            )
            .unwrap();
        assert_eq!(store.sources(), vec!["b.pdf".to_string(), "a.pdf".to_string()]);
    }

    #[test]
    fn test_from_entries_validates_dims() {
        let entries = vec![IndexEntry {
            chunk: chunk("a", "a.pdf"),
            vector: vec![1.0, 2.0],
        }];
        assert!(InMemoryVectorStore::from_entries("m", Some(3), entries.clone()).is_err());
        assert!(InMemoryVectorStore::from_entries("m", None, entries.clone()).is_err());
        let store = InMemoryVectorStore::from_entries("m", Some(2), entries).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.model(), "m");
    }
}
