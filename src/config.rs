//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults the
//! assistant was tuned with (1000/200 character chunks, top-3 retrieval,
//! `text-embedding-3-small`, `gpt-4o-mini` at temperature 0.2, Spanish OCR).
//!
//! ```toml
//! [storage]
//! dir = "archivos"
//!
//! [chunking]
//! chunk_size = 1000
//! overlap = 200
//!
//! [embedding]
//! provider = "openai"        # openai | hashing | disabled
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [llm]
//! model = "gpt-4o-mini"
//! temperature = 0.2
//!
//! [ocr]
//! language = "spa"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use lexrag_core::chunk::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use lexrag_core::conversation::{DEFAULT_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TOP_K};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("archivos")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Base name of the collection; each load gets `"{collection}-g{n}"`.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            collection: default_collection(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_collection() -> String {
    "legal_docs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: Option<usize>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            api_base: default_api_base(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> Option<String> {
    Some("text-embedding-3-small".to_string())
}
fn default_dims() -> Option<usize> {
    Some(1536)
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: DEFAULT_TEMPERATURE,
            api_base: default_api_base(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// Tesseract language code.
    #[serde(default = "default_ocr_language")]
    pub language: String,
    /// Rasterisation resolution for scanned pages.
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Per-invocation timeout for the rasteriser and for each OCR call.
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
    /// Deadline for a whole OCR pass (rasterising plus every page).
    #[serde(default = "default_ocr_pass_timeout_secs")]
    pub pass_timeout_secs: u64,
    #[serde(default = "default_rasterizer")]
    pub rasterizer: String,
    #[serde(default = "default_engine")]
    pub engine: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: default_ocr_language(),
            dpi: default_dpi(),
            timeout_secs: default_ocr_timeout_secs(),
            pass_timeout_secs: default_ocr_pass_timeout_secs(),
            rasterizer: default_rasterizer(),
            engine: default_engine(),
        }
    }
}

fn default_ocr_language() -> String {
    "spa".to_string()
}
fn default_dpi() -> u32 {
    200
}
fn default_ocr_timeout_secs() -> u64 {
    120
}
fn default_ocr_pass_timeout_secs() -> u64 {
    1800
}
fn default_rasterizer() -> String {
    "pdftoppm".to_string()
}
fn default_engine() -> String {
    "tesseract".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_extraction_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_extraction_timeout_secs(),
        }
    }
}

fn default_extraction_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// Most recent turns replayed into each prompt. `0` replays everything.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    /// Replaces the built-in legal assistant persona.
    #[serde(default)]
    pub persona_file: Option<PathBuf>,
    /// Default answer language: `es` or `en`.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
            persona_file: None,
            language: default_language(),
        }
    }
}

fn default_max_history_turns() -> usize {
    20
}
fn default_language() -> String {
    "es".to_string()
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.collection.trim().is_empty() {
            bail!("retrieval.collection must not be empty");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "hashing" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or hashing.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.provider == "openai" && self.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.llm.provider.as_str() {
            "openai" => {}
            other => bail!("Unknown llm provider: '{}'. Must be openai.", other),
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be in [0.0, 2.0]");
        }

        match self.ocr.rasterizer.as_str() {
            "pdftoppm" => {}
            other => bail!("Unknown ocr.rasterizer: '{}'. Must be pdftoppm.", other),
        }
        match self.ocr.engine.as_str() {
            "tesseract" => {}
            other => bail!("Unknown ocr.engine: '{}'. Must be tesseract.", other),
        }
        if self.ocr.dpi == 0 {
            bail!("ocr.dpi must be > 0");
        }
        if self.ocr.pass_timeout_secs < self.ocr.timeout_secs {
            bail!(
                "ocr.pass_timeout_secs ({}) must be >= ocr.timeout_secs ({})",
                self.ocr.pass_timeout_secs,
                self.ocr.timeout_secs
            );
        }

        match self.conversation.language.as_str() {
            "es" | "en" => {}
            other => bail!("conversation.language must be 'es' or 'en', got '{}'", other),
        }

        Ok(())
    }

    /// History window for prompt assembly; `None` means unbounded.
    pub fn history_window(&self) -> Option<usize> {
        match self.conversation.max_history_turns {
            0 => None,
            n => Some(n),
        }
    }
}

/// Parse and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
