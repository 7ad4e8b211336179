//! On-disk persistence for the vector index.
//!
//! An index directory holds two kinds of files:
//!
//! | File | Contents |
//! |------|----------|
//! | `index.json` | Manifest: format version, model, dims, save time, chunk metadata + text, and the name of the vectors file |
//! | `vectors-<uuid>.bin` | One little-endian `f32` row per chunk, in manifest order |
//!
//! Saving writes a fresh vectors file, then replaces the manifest through a
//! temp-file rename, then removes vectors files the manifest no longer
//! names. A crash at any point leaves either the old or the new index
//! readable, never a mix.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use docqa_core::embedding::{bytes_to_vec, vec_to_bytes};
use docqa_core::models::Chunk;
use docqa_core::store::memory::{InMemoryVectorStore, IndexEntry};
use docqa_core::store::VectorStore;

const MANIFEST_FILE: &str = "index.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    model: String,
    dims: Option<usize>,
    saved_at: DateTime<Utc>,
    vectors_file: String,
    chunks: Vec<Chunk>,
}

/// Persist `store` under `dir`, creating the directory if needed.
pub async fn save_index(dir: &Path, store: &InMemoryVectorStore) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

    let vectors_file = format!("vectors-{}.bin", Uuid::new_v4());
    let mut bytes = Vec::with_capacity(store.len() * store.dims().unwrap_or(0) * 4);
    for entry in store.entries() {
        bytes.extend_from_slice(&vec_to_bytes(&entry.vector));
    }
    tokio::fs::write(dir.join(&vectors_file), &bytes)
        .await
        .with_context(|| format!("Failed to write {}", vectors_file))?;

    let manifest = Manifest {
        version: FORMAT_VERSION,
        model: store.model().to_string(),
        dims: store.dims(),
        saved_at: Utc::now(),
        vectors_file: vectors_file.clone(),
        chunks: store.entries().iter().map(|e| e.chunk.clone()).collect(),
    };
    let json = serde_json::to_vec(&manifest)?;
    let tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
    tokio::fs::write(&tmp, &json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, dir.join(MANIFEST_FILE))
        .await
        .context("Failed to replace index manifest")?;

    remove_stale_vectors(dir, &vectors_file).await;

    tracing::debug!(
        path = %dir.display(),
        chunks = store.len(),
        "index saved"
    );
    Ok(())
}

/// Best-effort cleanup of vectors files left by earlier saves.
async fn remove_stale_vectors(dir: &Path, keep: &str) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("vectors-") && name.ends_with(".bin") && name != keep {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(file = %name, error = %e, "could not remove stale vectors file");
            }
        }
    }
}

/// Load the index under `dir`.
///
/// Returns `Ok(None)` when no manifest exists (nothing has been saved yet).
pub async fn load_index(dir: &Path) -> Result<Option<InMemoryVectorStore>> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
        return Ok(None);
    }

    let raw = tokio::fs::read(&manifest_path)
        .await
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    let manifest: Manifest =
        serde_json::from_slice(&raw).context("Failed to parse index manifest")?;

    if manifest.version != FORMAT_VERSION {
        bail!(
            "Unsupported index format version {} (expected {})",
            manifest.version,
            FORMAT_VERSION
        );
    }

    let bytes = tokio::fs::read(dir.join(&manifest.vectors_file))
        .await
        .with_context(|| format!("Failed to read {}", manifest.vectors_file))?;

    let dims = manifest.dims.unwrap_or(0);
    if dims == 0 && !manifest.chunks.is_empty() {
        bail!(
            "Index manifest lists {} chunks but no vector dimensions",
            manifest.chunks.len()
        );
    }
    let expected = manifest.chunks.len() * dims * 4;
    if bytes.len() != expected {
        bail!(
            "Vectors file holds {} bytes, expected {} ({} chunks x {} dims)",
            bytes.len(),
            expected,
            manifest.chunks.len(),
            dims
        );
    }

    let entries: Vec<IndexEntry> = if dims == 0 {
        Vec::new()
    } else {
        manifest
            .chunks
            .into_iter()
            .zip(bytes.chunks_exact(dims * 4))
            .map(|(chunk, row)| IndexEntry {
                chunk,
                vector: bytes_to_vec(row),
            })
            .collect()
    };

    let store = InMemoryVectorStore::from_entries(manifest.model, manifest.dims, entries)?;
    Ok(Some(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: &str, source: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: format!("doc-{}", source),
            source: source.to_string(),
            chunk_index: 0,
            text: text.to_string(),
            hash: "h".to_string(),
        }
    }

    fn sample_store() -> InMemoryVectorStore {
        let mut store = InMemoryVectorStore::new("test-model");
        store
            .add(
                vec![chunk("1", "a.pdf", "alpha"), chunk("2", "b.pdf", "beta")],
                vec![vec![1.0, 0.0, 0.5], vec![0.0, 1.0, -0.5]],
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_missing_index_loads_as_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load_index(&tmp.path().join("idx")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_entries() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        let store = sample_store();
        save_index(&dir, &store).await.unwrap();

        let loaded = load_index(&dir).await.unwrap().unwrap();
        assert_eq!(loaded.model(), "test-model");
        assert_eq!(loaded.dims(), Some(3));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.entries()[1].chunk, store.entries()[1].chunk);
        assert_eq!(loaded.entries()[1].vector, vec![0.0, 1.0, -0.5]);

        let hits = loaded.similarity_search(&[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].chunk.source, "b.pdf");
    }

    #[tokio::test]
    async fn test_resave_removes_stale_vectors_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        let mut store = sample_store();
        save_index(&dir, &store).await.unwrap();
        store
            .add(vec![chunk("3", "c.pdf", "gamma")], vec![vec![0.5, 0.5, 0.5]])
            .unwrap();
        save_index(&dir, &store).await.unwrap();

        let vector_files: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("vectors-"))
            .collect();
        assert_eq!(vector_files.len(), 1);
        assert_eq!(load_index(&dir).await.unwrap().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_store_round_trips() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        save_index(&dir, &InMemoryVectorStore::new("m")).await.unwrap();
        let loaded = load_index(&dir).await.unwrap().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dims(), None);
    }

    #[tokio::test]
    async fn test_truncated_vectors_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        save_index(&dir, &sample_store()).await.unwrap();

        let vectors = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().starts_with("vectors-"))
            .unwrap()
            .path();
        std::fs::write(&vectors, [0u8; 4]).unwrap();

        let err = load_index(&dir).await.unwrap_err();
        assert!(err.to_string().contains("expected"));
    }

    #[tokio::test]
    async fn test_chunks_without_dims_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        std::fs::create_dir_all(&dir).unwrap();
        let manifest = serde_json::json!({
            "version": FORMAT_VERSION,
            "model": "m",
            "dims": null,
            "saved_at": Utc::now(),
            "vectors_file": "v.bin",
            "chunks": [chunk("1", "a.pdf", "alpha")],
        });
        std::fs::write(dir.join("index.json"), manifest.to_string()).unwrap();
        std::fs::write(dir.join("v.bin"), b"").unwrap();

        let err = load_index(&dir).await.unwrap_err();
        assert!(err.to_string().contains("no vector dimensions"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.json"), b"{not json").unwrap();
        assert!(load_index(&dir).await.is_err());
    }
}
