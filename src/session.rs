//! Orchestration of one chat session: load a document, then ask about it.
//!
//! A [`Session`] owns the extractor, the collection catalog and the
//! conversation engine. Loading is all-or-nothing:
//!
//! ```text
//! extract ──► chunk ──► stage "{base}-g{n}" ──► embed + add (batched) ──► swap
//!    │          │                 │                      │
//!    └──────────┴───── error ─────┴──── drop staging ────┘   previous document stays active
//! ```
//!
//! Only after the staging collection is fully populated does it become
//! the active one; the collection it replaces is then dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use lexrag_core::chunk::chunk_segments;
use lexrag_core::conversation::{Answer, ConversationEngine, ConversationPolicy};
use lexrag_core::index::memory::{IndexCatalog, MemoryCollection};
use lexrag_core::index::{Metadata, NewEntry, VectorIndex};
use lexrag_core::models::{Chunk, ConversationTurn, DocumentFormat, ExtractionMethod};
use lexrag_core::Result;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::TextExtractor;
use crate::llm::create_chat_backend;
use crate::persona::load_persona;
use crate::progress::{LoadProgressEvent, LoadProgressReporter, NoProgress};

/// A session shared between concurrent callers; the mutex serialises
/// loads and questions.
pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

/// How documents are cut and stored.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    /// Base collection name; each load is staged as `"{collection}-g{n}"`.
    pub collection: String,
    /// Chunks embedded per backend call.
    pub batch_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            chunk_size: lexrag_core::chunk::DEFAULT_CHUNK_SIZE,
            overlap: lexrag_core::chunk::DEFAULT_OVERLAP,
            collection: "legal_docs".to_string(),
            batch_size: 64,
        }
    }
}

/// Summary of a successful load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub source: PathBuf,
    pub format: DocumentFormat,
    pub method: ExtractionMethod,
    pub segments: usize,
    /// Extracted characters across all segments.
    pub chars: usize,
    pub chunks: usize,
    pub collection: String,
}

/// The document currently answering questions.
pub struct ActiveDocument {
    pub report: LoadReport,
    collection: Arc<MemoryCollection>,
}

impl ActiveDocument {
    pub fn collection(&self) -> &Arc<MemoryCollection> {
        &self.collection
    }
}

pub struct Session {
    extractor: TextExtractor,
    catalog: IndexCatalog,
    engine: ConversationEngine,
    options: LoadOptions,
    generation: u64,
    active: Option<ActiveDocument>,
    progress: Box<dyn LoadProgressReporter>,
}

impl Session {
    pub fn new(
        extractor: TextExtractor,
        catalog: IndexCatalog,
        engine: ConversationEngine,
        options: LoadOptions,
    ) -> Self {
        Self {
            extractor,
            catalog,
            engine,
            options,
            generation: 0,
            active: None,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn LoadProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Wire up the configured backends.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let extractor = TextExtractor::from_config(&config.extraction, &config.ocr)?;
        let catalog = IndexCatalog::new(create_embedder(&config.embedding)?);
        let persona = load_persona(config.conversation.persona_file.as_deref())?;
        let policy = ConversationPolicy {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            top_k: config.retrieval.top_k,
            max_history_turns: config.history_window(),
        };
        let engine = ConversationEngine::new(persona, policy, create_chat_backend(&config.llm)?);
        let options = LoadOptions {
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            collection: config.retrieval.collection.clone(),
            batch_size: config.embedding.batch_size,
        };
        Ok(Self::new(extractor, catalog, engine, options))
    }

    pub fn load_options(&self) -> &LoadOptions {
        &self.options
    }

    /// Options for subsequent loads; the active document is unaffected.
    pub fn set_load_options(&mut self, options: LoadOptions) {
        self.options = options;
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Extract, chunk and index `path`, then make it the active document.
    ///
    /// On any error the previously active document (if any) keeps serving
    /// questions and no partial collection is left behind.
    pub async fn load_document(&mut self, path: &Path) -> Result<LoadReport> {
        let source = path.display().to_string();
        self.progress.report(LoadProgressEvent::Extracting {
            source: source.clone(),
        });
        let document = self.extractor.extract(path).await?;

        self.generation += 1;
        let generation = self.generation;
        let chunks = chunk_segments(
            &source,
            generation,
            &document.segments,
            self.options.chunk_size,
            self.options.overlap,
        )?;

        let name = format!("{}-g{}", self.options.collection, generation);
        let staged = self.catalog.create_or_get(&name);
        if let Err(e) = self.populate(&source, &staged, &chunks).await {
            warn!(collection = %name, error = %e, "load failed, discarding staged collection");
            self.catalog.drop_collection(&name);
            return Err(e);
        }

        let report = LoadReport {
            source: path.to_path_buf(),
            format: document.format,
            method: document.method,
            segments: document.segments.len(),
            chars: document.char_len(),
            chunks: chunks.len(),
            collection: name,
        };
        let previous = self.active.replace(ActiveDocument {
            report: report.clone(),
            collection: staged,
        });
        if let Some(prev) = previous {
            self.catalog.drop_collection(prev.collection.name());
        }

        info!(
            source = %report.source.display(),
            method = %report.method,
            chunks = report.chunks,
            collection = %report.collection,
            "document loaded"
        );
        Ok(report)
    }

    async fn populate(
        &self,
        source: &str,
        collection: &MemoryCollection,
        chunks: &[Chunk],
    ) -> Result<()> {
        let total = chunks.len() as u64;
        for batch in chunks.chunks(self.options.batch_size.max(1)) {
            let entries = batch
                .iter()
                .map(|c| NewEntry {
                    id: c.id.clone(),
                    text: c.text.clone(),
                    metadata: chunk_metadata(c),
                })
                .collect();
            collection.add_batch(entries).await?;
            self.progress.report(LoadProgressEvent::Indexing {
                source: source.to_string(),
                n: collection.len() as u64,
                total,
            });
        }
        Ok(())
    }

    /// Answer `query` from the active document.
    ///
    /// Fails with [`RagError::NotLoaded`](lexrag_core::RagError::NotLoaded)
    /// before any backend call when nothing is loaded.
    pub async fn ask(&mut self, query: &str, language_instruction: &str) -> Result<Answer> {
        let index = self.active.as_ref().map(|a| {
            let index: &dyn VectorIndex = a.collection.as_ref();
            index
        });
        self.engine.ask(query, index, language_instruction).await
    }

    pub fn is_loaded(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActiveDocument> {
        self.active.as_ref()
    }

    pub fn tokens_used(&self) -> u64 {
        self.engine.tokens_used()
    }

    pub fn history(&self) -> &[ConversationTurn] {
        self.engine.history()
    }

    /// Clear the conversation; the loaded document and token count remain.
    pub fn reset_history(&mut self) {
        self.engine.reset();
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.catalog
    }
}

fn chunk_metadata(chunk: &Chunk) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("chunk_id".to_string(), chunk.id.clone());
    metadata.insert("chunk_index".to_string(), chunk.chunk_index.to_string());
    metadata.insert("source".to_string(), chunk.source.clone());
    metadata.insert("generation".to_string(), chunk.generation.to_string());
    metadata.insert("hash".to_string(), chunk.hash.clone());
    metadata
}
