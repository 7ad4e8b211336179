//! # docqa
//!
//! Upload PDFs, index them for semantic retrieval, and ask questions that
//! are answered from the retrieved passages only.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Upload  │──▶│ Extract+Chunk│──▶│    Embed     │
//! │  (PDF)   │   │  1000 / 200  │   │  (provider)  │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          ▼
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Answer  │◀──│ Prompt + LLM │◀──│ Vector index │◀─▶ vector_index/
//! └──────────┘   └──────────────┘   │  top-k cos   │
//!                                   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GOOGLE_API_KEY=...
//! docqa serve                         # http://127.0.0.1:5000
//! docqa ingest report.pdf notes.pdf   # index from the command line
//! docqa ask "What was Q3 revenue?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat-completion providers |
//! | [`upstream`] | Shared HTTP client with retry |
//! | [`prompt`] | Context block and prompt template |
//! | [`index`] | Index persistence |
//! | [`service`] | Ingest and ask, index ownership |
//! | [`error`] | Typed service errors |
//! | [`stats`] | Index summary for the CLI |
//! | [`server`] | HTTP routes |
//!
//! Chunking, the vector store and the core data types live in
//! [`docqa_core`].

pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod prompt;
pub mod server;
pub mod service;
pub mod stats;
pub mod upstream;
