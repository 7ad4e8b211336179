//! Shared fixtures for integration tests: deterministic embedder and chat
//! model, a plain-text extractor, and a config rooted in a temp directory.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use docqa::config::{Config, IngestMode};
use docqa::embedding::Embedder;
use docqa::extract::TextExtractor;
use docqa::llm::ChatModel;
use docqa::service::{QaService, UploadedFile};

pub const DIMS: usize = 64;

/// Bag-of-words embedder: each lowercase word is hashed into one of
/// [`DIMS`] buckets. Texts sharing words score higher.
#[derive(Default)]
pub struct HashEmbedder {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.to_lowercase().bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % DIMS as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("embedding service unavailable");
        }
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("embedding service unavailable");
        }
        Ok(hash_embed(text))
    }
}

/// Chat model that records every prompt and replies with a fixed string.
#[derive(Default)]
pub struct RecordingChat {
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for RecordingChat {
    fn model_name(&self) -> &str {
        "recording-test"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("stub answer".to_string())
    }
}

/// Treats file bytes as UTF-8 text, so tests control the "page text".
pub struct Utf8Extractor;

impl TextExtractor for Utf8Extractor {
    fn extract(&self, _filename: &str, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).to_string()
    }
}

pub fn test_config(tmp: &TempDir, mode: IngestMode) -> Config {
    let mut config = Config::default();
    config.index.path = tmp.path().join("vector_index");
    config.index.mode = mode;
    config.server.bind = "127.0.0.1:0".to_string();
    config
}

pub struct Harness {
    pub service: Arc<QaService>,
    pub embedder: Arc<HashEmbedder>,
    pub chat: Arc<RecordingChat>,
}

/// Open a service over `config` with the fake backends.
pub async fn open_service(config: Config) -> Harness {
    let embedder = Arc::new(HashEmbedder::default());
    let chat = Arc::new(RecordingChat::default());
    let service = QaService::open(config, embedder.clone(), chat.clone())
        .await
        .unwrap()
        .with_extractor(Arc::new(Utf8Extractor));
    Harness {
        service: Arc::new(service),
        embedder,
        chat,
    }
}

pub fn file(name: &str, text: &str) -> UploadedFile {
    UploadedFile {
        filename: name.to_string(),
        bytes: text.as_bytes().to_vec(),
    }
}

pub const FRUIT_TEXT: &str = "Apples and oranges are sold at the fruit market. \
    Bananas ripen quickly in warm weather. The orchard harvest begins in autumn.";

pub const ANIMAL_TEXT: &str = "Zebras and giraffes roam the savanna. \
    The zebra herd migrates north when the rains arrive. Lions hunt at dusk.";
