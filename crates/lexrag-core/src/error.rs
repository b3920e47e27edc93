//! Error taxonomy shared by every stage of the pipeline.
//!
//! Extraction and chunking failures abort a load before any state is
//! touched; `ask`-time failures reach the caller as distinct variants.

use std::time::Duration;

use thiserror::Error;

/// All failures surfaced by lexrag library operations.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("unsupported format: '{0}' (expected .pdf or .docx)")]
    UnsupportedFormat(String),

    #[error("document contains no text: {0}")]
    EmptyDocument(String),

    #[error("no text could be extracted from {0}, not even with OCR")]
    NoTextExtracted(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no document loaded; load a document before asking")]
    NotLoaded,

    #[error("collection '{0}' holds no entries")]
    EmptyIndex(String),

    #[error("duplicate id '{id}' in collection '{collection}'")]
    DuplicateId { collection: String, id: String },

    #[error("embedding backend error: {0}")]
    Embedding(String),

    #[error("OCR backend error: {0}")]
    Ocr(String),

    #[error("completion backend error: {0}")]
    Completion(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;
