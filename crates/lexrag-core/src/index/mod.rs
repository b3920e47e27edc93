//! Vector index abstraction.
//!
//! A [`VectorIndex`] is one named collection of embedded chunks that can be
//! queried by similarity. Collections are obtained from a catalog such as
//! [`memory::IndexCatalog`], whose `create_or_get` is idempotent and never
//! clears an existing collection.
//!
//! # Id policy
//!
//! Ids are never silently overwritten: adding an id that is already present
//! fails with [`RagError::DuplicateId`](crate::RagError::DuplicateId).
//! Callers namespace ids per load (`"{generation}:{chunk_index}"`) and
//! stage each load in its own collection.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

/// Free-form string metadata stored alongside each entry.
pub type Metadata = BTreeMap<String, String>;

/// An entry waiting to be embedded and stored.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// A stored entry: id, embedding, metadata, and the original text.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

/// One ranked result of a similarity query.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    /// Cosine similarity to the query embedding.
    pub score: f32,
    pub metadata: Metadata,
}

/// A named, queryable collection of embedded texts.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorIndex::add) | Embed and store one text |
/// | [`add_batch`](VectorIndex::add_batch) | Embed and store many texts, all or nothing |
/// | [`query`](VectorIndex::query) | Top-k texts by cosine similarity |
/// | [`clear`](VectorIndex::clear) | Remove every entry |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embed `text` and store it under `id`.
    async fn add(&self, id: &str, text: &str, metadata: Metadata) -> Result<()>;

    /// Embed and store a batch. Either every entry is stored or none is.
    async fn add_batch(&self, entries: Vec<NewEntry>) -> Result<()>;

    /// Return up to `top_k` entries in descending similarity to `text`.
    ///
    /// Fails with [`RagError::EmptyIndex`](crate::RagError::EmptyIndex)
    /// when the collection holds no entries.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<QueryHit>>;

    /// Remove every entry.
    fn clear(&self);
}
