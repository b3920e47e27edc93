//! In-memory [`VectorIndex`] implementation and its collection catalog.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`. Queries are
//! brute-force cosine similarity over every stored vector, which is plenty
//! for the few hundred chunks of a single legal document.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::embedding::{check_vectors, cosine_similarity, embed_one, Embedder};
use crate::error::{RagError, Result};

use super::{IndexEntry, Metadata, NewEntry, QueryHit, VectorIndex};

#[derive(Default)]
struct Entries {
    rows: Vec<IndexEntry>,
    ids: HashSet<String>,
}

/// A single named collection held in memory.
pub struct MemoryCollection {
    name: String,
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Entries>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            name: name.into(),
            embedder,
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Ids of all stored entries, in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.read().rows.iter().map(|e| e.id.clone()).collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn duplicate(&self, id: &str) -> RagError {
        RagError::DuplicateId {
            collection: self.name.clone(),
            id: id.to_string(),
        }
    }

    /// Fail on ids that collide with stored entries or with each other.
    fn check_ids<'a>(&self, ids: impl Iterator<Item = &'a str>) -> Result<()> {
        let entries = self.read();
        let mut seen = HashSet::new();
        for id in ids {
            if entries.ids.contains(id) || !seen.insert(id) {
                return Err(self.duplicate(id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.read().rows.len()
    }

    async fn add(&self, id: &str, text: &str, metadata: Metadata) -> Result<()> {
        self.add_batch(vec![NewEntry {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
        }])
        .await
    }

    async fn add_batch(&self, entries: Vec<NewEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.check_ids(entries.iter().map(|e| e.id.as_str()))?;

        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        check_vectors(self.embedder.as_ref(), texts.len(), &vectors)?;

        let mut stored = self.write();
        // Re-check under the write lock; another writer may have raced us.
        if let Some(e) = entries.iter().find(|e| stored.ids.contains(&e.id)) {
            return Err(self.duplicate(&e.id));
        }
        for (entry, vector) in entries.into_iter().zip(vectors) {
            stored.ids.insert(entry.id.clone());
            stored.rows.push(IndexEntry {
                id: entry.id,
                text: entry.text,
                vector,
                metadata: entry.metadata,
            });
        }
        debug!(collection = %self.name, total = stored.rows.len(), "entries added");
        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<QueryHit>> {
        if self.is_empty() {
            return Err(RagError::EmptyIndex(self.name.clone()));
        }
        let query_vec = embed_one(self.embedder.as_ref(), text).await?;
        check_vectors(self.embedder.as_ref(), 1, std::slice::from_ref(&query_vec))?;

        let entries = self.read();
        let mut hits: Vec<QueryHit> = entries
            .rows
            .iter()
            .map(|e| QueryHit {
                id: e.id.clone(),
                text: e.text.clone(),
                score: cosine_similarity(&query_vec, &e.vector),
                metadata: e.metadata.clone(),
            })
            .collect();
        // Stable sort: equal scores keep insertion order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    fn clear(&self) {
        let mut entries = self.write();
        entries.rows.clear();
        entries.ids.clear();
    }
}

/// Named collections sharing one embedding function.
pub struct IndexCatalog {
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl IndexCatalog {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Return the collection called `name`, creating it if needed.
    ///
    /// Idempotent: a second call returns the same collection with its
    /// contents intact.
    pub fn create_or_get(&self, name: &str) -> Arc<MemoryCollection> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name, self.embedder.clone())))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<MemoryCollection>> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Remove a collection from the catalog. Returns whether it existed.
    pub fn drop_collection(&self, name: &str) -> bool {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Sorted collection names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
