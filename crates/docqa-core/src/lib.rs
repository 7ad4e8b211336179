//! # docqa core
//!
//! Shared, I/O-free logic for docqa: chunk models, the recursive character
//! splitter, vector utilities, and the vector store abstraction with its
//! in-memory implementation.
//!
//! This crate contains no tokio, HTTP, or filesystem dependencies. Network
//! embedding providers, persistence, and the web surface live in the
//! `docqa` application crate.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod store;
