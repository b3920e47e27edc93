//! # lexrag core
//!
//! Backend-agnostic logic for lexrag: document models, the overlapping
//! chunker, the [`VectorIndex`](index::VectorIndex) contract with its
//! in-memory implementation, and the multi-turn
//! [`ConversationEngine`](conversation::ConversationEngine).
//!
//! This crate performs no filesystem, network, or subprocess I/O. Embedding
//! and chat backends are injected through the [`Embedder`](embedding::Embedder)
//! and [`ChatBackend`](conversation::ChatBackend) traits; the `lexrag` app
//! crate supplies the HTTP-backed implementations.

pub mod chunk;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;

pub use error::{RagError, Result};
