//! End-to-end tests of the `docqa` binary that need no network access.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use docqa_core::models::Chunk;
use docqa_core::store::memory::InMemoryVectorStore;
use docqa_core::store::VectorStore;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let config_path = root.join("docqa.toml");
    fs::write(
        &config_path,
        format!(
            r#"[index]
path = "{}/vector_index"

[embedding]
provider = "ollama"
url = "http://127.0.0.1:9"

[llm]
provider = "ollama"
url = "http://127.0.0.1:9"
"#,
            root.display()
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_docqa(config: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_docqa"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "docqa=warn")
        .output()
        .expect("failed to run docqa");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn chunk(source: &str, text: &str) -> Chunk {
    Chunk {
        id: format!("{}-0", source),
        document_id: source.to_string(),
        source: source.to_string(),
        chunk_index: 0,
        text: text.to_string(),
        hash: String::new(),
    }
}

#[test]
fn test_stats_without_index() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_docqa(&config, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("No index yet"), "got: {}", stdout);
}

#[tokio::test]
async fn test_stats_reports_persisted_index() {
    let (tmp, config) = setup_test_env();

    let mut store = InMemoryVectorStore::new("nomic-embed-text");
    store
        .add(
            vec![
                chunk("fruit.pdf", "apples"),
                chunk("animals.pdf", "zebras"),
                chunk("fruit.pdf", "oranges"),
            ],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]],
        )
        .unwrap();
    docqa::index::save_index(&tmp.path().join("vector_index"), &store)
        .await
        .unwrap();

    let (stdout, stderr, success) = run_docqa(&config, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Model:       nomic-embed-text"), "got: {}", stdout);
    assert!(stdout.contains("Chunks:      3"), "got: {}", stdout);
    assert!(stdout.contains("fruit.pdf"));
    assert!(stdout.contains("animals.pdf"));
}

#[test]
fn test_ask_without_index_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_docqa(&config, &["ask", "What is this about?"]);
    assert!(!success);
    assert!(stderr.contains("Please upload a PDF first."), "got: {}", stderr);
}

#[test]
fn test_ingest_rejects_non_pdf() {
    let (tmp, config) = setup_test_env();
    let notes = tmp.path().join("notes.txt");
    fs::write(&notes, "plain text").unwrap();

    let (_, stderr, success) = run_docqa(&config, &["ingest", notes.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("No PDF files provided"), "got: {}", stderr);
    assert!(!tmp.path().join("vector_index").exists());
}

#[test]
fn test_invalid_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[chunking]\nchunk_size = 10\nchunk_overlap = 50\n").unwrap();

    let (_, stderr, success) = run_docqa(&config, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "got: {}", stderr);
}
