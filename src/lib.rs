//! # lexrag
//!
//! Ask questions about a legal document (contract, deed, bylaws, ...) and
//! get answers grounded in its own text.
//!
//! A PDF or DOCX is reduced to text (falling back to OCR for scanned PDFs),
//! cut into overlapping chunks, embedded into an in-memory vector
//! collection, and then queried turn by turn: each question retrieves the
//! closest chunks and sends them, together with the conversation so far,
//! to a chat model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌──────────────┐
//! │ TextExtractor│──▶│ Chunker  │──▶│ MemoryIndex  │
//! │ PDF/DOCX/OCR │   │ 1000/200 │   │ cosine top-k │
//! └──────────────┘   └──────────┘   └──────┬───────┘
//!                                          │ context
//!                                          ▼
//!                  ┌─────────┐      ┌──────────────────┐
//!                  │   CLI   │◀────▶│ConversationEngine│──▶ chat model
//!                  │(lexrag) │      │ history + tokens │
//!                  └─────────┘      └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexrag upload ./contrato.pdf
//! lexrag files
//! lexrag ask contrato.pdf "¿Cuál es el plazo del contrato?"
//! lexrag chat contrato.pdf --language en
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`storage`] | Upload directory (`archivos/`) |
//! | [`extract`] | PDF / DOCX text extraction |
//! | [`ocr`] | Rasterise + OCR fallback for scanned PDFs |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat completion backend |
//! | [`persona`] | Assistant persona and answer language |
//! | [`progress`] | Load progress on stderr |
//! | [`session`] | Load/ask orchestration |
//!
//! Backend-agnostic pieces (chunker, index, conversation engine, error
//! type) live in the [`lexrag_core`] crate.

pub mod config;
pub mod embedding;
pub mod extract;
pub mod llm;
pub mod ocr;
pub mod persona;
pub mod progress;
pub mod session;
pub mod storage;
