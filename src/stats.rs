//! Index statistics.
//!
//! Reads the persisted index directly, so `docqa stats` works without API
//! keys or a running server.

use anyhow::Result;
use std::path::Path;

use docqa_core::store::memory::InMemoryVectorStore;
use docqa_core::store::VectorStore;

use crate::config::Config;
use crate::index::load_index;

/// Chunk count for one source file.
#[derive(Debug, PartialEq)]
pub struct SourceStats {
    pub source: String,
    pub chunks: usize,
}

/// Per-source chunk counts in first-indexed order.
pub fn source_breakdown(store: &InMemoryVectorStore) -> Vec<SourceStats> {
    let mut out: Vec<SourceStats> = Vec::new();
    for entry in store.entries() {
        match out.iter_mut().find(|s| s.source == entry.chunk.source) {
            Some(s) => s.chunks += 1,
            None => out.push(SourceStats {
                source: entry.chunk.source.clone(),
                chunks: 1,
            }),
        }
    }
    out
}

/// Load the index under `[index].path` and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let path = &config.index.path;

    println!("docqa Index Stats");
    println!("=================");
    println!();
    println!("  Index:       {}", path.display());

    let Some(store) = load_index(path).await? else {
        println!();
        println!("  No index yet. Upload a PDF or run `docqa ingest <file.pdf>`.");
        return Ok(());
    };

    println!("  Size:        {}", format_bytes(dir_size(path).await));
    println!("  Model:       {}", store.model());
    println!(
        "  Dimensions:  {}",
        store
            .dims()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Chunks:      {}", store.len());

    let breakdown = source_breakdown(&store);
    if !breakdown.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<40} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(49));
        for s in &breakdown {
            println!("  {:<40} {:>8}", s.source, s.chunks);
        }
    }

    Ok(())
}

/// Total size of the regular files directly under `dir`; 0 if unreadable.
async fn dir_size(dir: &Path) -> u64 {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return 0;
    };
    let mut total = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(meta) = entry.metadata().await {
            if meta.is_file() {
                total += meta.len();
            }
        }
    }
    total
}

/// Human-readable byte count.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
