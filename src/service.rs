//! The question-answering service.
//!
//! [`QaService`] owns everything a request needs: the configuration, the
//! embedding and chat backends, the splitter, and the current index
//! snapshot. Handlers and CLI commands share one instance through `Arc`.
//!
//! # Index Ownership
//!
//! The index is held as an immutable `Arc<InMemoryVectorStore>` snapshot
//! behind a `RwLock`. Questions clone the `Arc` and release the lock before
//! any network call. Ingestion is serialized by a separate writer mutex:
//! it builds the next snapshot from a copy of the current one, persists it,
//! and only then publishes it. A failure at any step leaves both the
//! published snapshot and the files on disk as they were.

use anyhow::{anyhow, Context};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use docqa_core::chunk::RecursiveSplitter;
use docqa_core::models::SourceDocument;
use docqa_core::store::memory::InMemoryVectorStore;
use docqa_core::store::VectorStore;

use crate::config::{Config, IngestMode};
use crate::embedding::Embedder;
use crate::error::QaError;
use crate::extract::{is_pdf_filename, PdfTextExtractor, TextExtractor};
use crate::index::{load_index, save_index};
use crate::llm::ChatModel;
use crate::prompt::{build_context, cited_sources, render_prompt, PROMPT_TEMPLATE};

/// One file received for ingestion.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Outcome of a successful [`QaService::ingest`].
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Files whose text was indexed, in upload order.
    pub filenames: Vec<String>,
    /// Number of chunks added.
    pub chunks: usize,
    /// Files that were not PDFs or yielded no text.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    /// Distinct source filenames of the retrieved chunks, in rank order.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IndexStats {
    pub loaded: bool,
    pub chunks: usize,
    pub dims: Option<usize>,
    pub model: Option<String>,
    pub sources: Vec<String>,
}

pub struct QaService {
    config: Config,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    extractor: Arc<dyn TextExtractor>,
    splitter: RecursiveSplitter,
    index: RwLock<Option<Arc<InMemoryVectorStore>>>,
    writer: Mutex<()>,
}

impl QaService {
    /// Build the service and load any index persisted under `config.index.path`.
    ///
    /// An unreadable index is logged and ignored; the service then starts
    /// empty and the next upload writes a fresh one.
    pub async fn open(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
    ) -> anyhow::Result<Self> {
        let splitter =
            RecursiveSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;

        let index = match load_index(&config.index.path).await {
            Ok(Some(store)) => {
                if store.model() != embedder.model_name() {
                    tracing::warn!(
                        index_model = store.model(),
                        configured_model = embedder.model_name(),
                        "persisted index was built with a different embedding model"
                    );
                }
                tracing::info!(
                    path = %config.index.path.display(),
                    chunks = store.len(),
                    "loaded vector index"
                );
                Some(Arc::new(store))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    path = %config.index.path.display(),
                    error = %format!("{:#}", e),
                    "could not load vector index, starting without one"
                );
                None
            }
        };
        tracing::debug!(
            embedding_model = embedder.model_name(),
            llm_model = llm.model_name(),
            "service backends ready"
        );

        Ok(Self {
            config,
            embedder,
            llm,
            extractor: Arc::new(PdfTextExtractor),
            splitter,
            index: RwLock::new(index),
            writer: Mutex::new(()),
        })
    }

    /// Replace the PDF extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn snapshot(&self) -> Option<Arc<InMemoryVectorStore>> {
        self.index.read().await.clone()
    }

    /// Extract, chunk, embed and index `files`, then persist the index.
    ///
    /// Files with an empty name are ignored. Non-PDF files and PDFs without
    /// extractable text are reported in [`IngestReport::skipped`].
    pub async fn ingest(&self, files: Vec<UploadedFile>) -> Result<IngestReport, QaError> {
        if files.is_empty() {
            return Err(QaError::invalid("No file part"));
        }

        let named: Vec<UploadedFile> = files
            .into_iter()
            .filter(|f| !f.filename.is_empty())
            .collect();
        if named.is_empty() {
            return Err(QaError::invalid("No selected file"));
        }

        let mut skipped = Vec::new();
        let mut pdfs = Vec::new();
        for file in named {
            if is_pdf_filename(&file.filename) {
                pdfs.push(file);
            } else {
                skipped.push(file.filename);
            }
        }
        if pdfs.is_empty() {
            return Err(QaError::invalid("No PDF files provided"));
        }

        let extractor = Arc::clone(&self.extractor);
        let extracted = tokio::task::spawn_blocking(move || {
            pdfs.into_iter()
                .map(|f| {
                    let text = extractor.extract(&f.filename, &f.bytes);
                    (f.filename, text)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| QaError::Internal(anyhow!("PDF extraction task failed: {}", e)))?;

        let mut documents = Vec::new();
        for (filename, text) in extracted {
            if text.trim().is_empty() {
                skipped.push(filename);
            } else {
                documents.push(SourceDocument {
                    id: Uuid::new_v4().to_string(),
                    source: filename,
                    text,
                });
            }
        }

        let chunks = self.splitter.split_documents(&documents);
        if chunks.is_empty() {
            return Err(QaError::invalid("No valid text found"));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_documents(&texts)
            .await
            .map_err(QaError::Upstream)?;

        let chunk_count = chunks.len();
        let filenames: Vec<String> = documents.into_iter().map(|d| d.source).collect();

        let _guard = self.writer.lock().await;
        let mut next = match (self.config.index.mode, self.snapshot().await) {
            (IngestMode::Accumulate, Some(current)) if !current.is_empty() => {
                if current.model() != self.embedder.model_name() {
                    return Err(QaError::Internal(anyhow!(
                        "index was built with embedding model '{}' but '{}' is configured; \
                         point index.path elsewhere or use mode = \"replace\"",
                        current.model(),
                        self.embedder.model_name()
                    )));
                }
                (*current).clone()
            }
            _ => InMemoryVectorStore::new(self.embedder.model_name()),
        };

        next.add(chunks, vectors)
            .context("Failed to add embeddings to index")
            .map_err(QaError::Internal)?;
        save_index(&self.config.index.path, &next)
            .await
            .context("Failed to save index")
            .map_err(QaError::Internal)?;

        let total = next.len();
        *self.index.write().await = Some(Arc::new(next));

        tracing::info!(
            files = filenames.len(),
            chunks = chunk_count,
            total_chunks = total,
            skipped = skipped.len(),
            "indexed upload"
        );

        Ok(IngestReport {
            filenames,
            chunks: chunk_count,
            skipped,
        })
    }

    /// Answer `question` from the top-k retrieved chunks.
    ///
    /// Fails with [`QaError::NoIndex`] before anything has been indexed,
    /// whatever the question.
    pub async fn ask(&self, question: &str) -> Result<Answer, QaError> {
        let Some(index) = self.snapshot().await else {
            return Err(QaError::NoIndex);
        };
        if question.trim().is_empty() {
            return Err(QaError::invalid("Question must not be empty."));
        }

        let hits = if index.is_empty() {
            Vec::new()
        } else {
            let query = self
                .embedder
                .embed_query(question)
                .await
                .map_err(QaError::Upstream)?;
            index
                .similarity_search(&query, self.config.retrieval.top_k)
                .map_err(QaError::Internal)?
        };

        let context = build_context(&hits);
        let prompt = render_prompt(PROMPT_TEMPLATE, &context, question);
        tracing::debug!(hits = hits.len(), prompt_chars = prompt.len(), "asking model");

        let answer = self
            .llm
            .complete(&prompt)
            .await
            .map_err(QaError::Upstream)?;

        Ok(Answer {
            answer,
            sources: cited_sources(&hits),
        })
    }

    pub async fn stats(&self) -> IndexStats {
        match self.snapshot().await {
            Some(index) => IndexStats {
                loaded: true,
                chunks: index.len(),
                dims: index.dims(),
                model: Some(index.model().to_string()),
                sources: index.sources(),
            },
            None => IndexStats {
                loaded: false,
                chunks: 0,
                dims: None,
                model: None,
                sources: Vec::new(),
            },
        }
    }

    pub async fn indexed_chunks(&self) -> usize {
        self.snapshot().await.map(|i| i.len()).unwrap_or(0)
    }
}
