//! OCR fallback for scanned PDFs.
//!
//! Two seams, both async traits:
//! - [`PageRasterizer`] renders every page of a PDF to an image inside a
//!   temporary directory ([`RenderedPages`]).
//! - [`OcrEngine`] recognises the text of one page image.
//!
//! The default implementations shell out to poppler's `pdftoppm` and to
//! `tesseract`. Each subprocess runs under a timeout and is killed when its
//! future is dropped; the page images are deleted when [`RenderedPages`]
//! goes out of scope, on success and error paths alike.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use lexrag_core::{RagError, Result};

use crate::config::OcrConfig;

/// Page images of one PDF, deleted on drop.
pub struct RenderedPages {
    dir: TempDir,
    pages: Vec<PathBuf>,
}

impl RenderedPages {
    /// Take ownership of `dir` and the ordered page images inside it.
    pub fn new(dir: TempDir, pages: Vec<PathBuf>) -> Self {
        Self { dir, pages }
    }

    pub fn pages(&self) -> &[PathBuf] {
        &self.pages
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Renders PDF pages to images.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, pdf: &Path) -> Result<RenderedPages>;
}

/// Recognises text in a single page image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path, language: &str) -> Result<String>;
}

/// Rasterise `pdf` and OCR every page in order, all within `deadline`.
///
/// Each page's text is followed by a newline; the result may be blank.
/// Individual tool invocations carry their own, shorter timeouts.
pub async fn ocr_pdf(
    pdf: &Path,
    rasterizer: &dyn PageRasterizer,
    engine: &dyn OcrEngine,
    language: &str,
    deadline: Duration,
) -> Result<String> {
    tokio::time::timeout(deadline, ocr_pages(pdf, rasterizer, engine, language))
        .await
        .map_err(|_| RagError::Timeout {
            operation: format!("OCR of {}", pdf.display()),
            after: deadline,
        })?
}

async fn ocr_pages(
    pdf: &Path,
    rasterizer: &dyn PageRasterizer,
    engine: &dyn OcrEngine,
    language: &str,
) -> Result<String> {
    let rendered = rasterizer.rasterize(pdf).await?;
    info!(pdf = %pdf.display(), pages = rendered.pages().len(), language, "running OCR");
    debug!(dir = %rendered.dir().display(), "page images rendered");

    let mut text = String::new();
    for (i, page) in rendered.pages().iter().enumerate() {
        let page_text = engine.recognize(page, language).await?;
        debug!(page = i + 1, chars = page_text.len(), "page recognised");
        text.push_str(&page_text);
        text.push('\n');
    }
    Ok(text)
}

// ============ pdftoppm ============

/// [`PageRasterizer`] backed by poppler's `pdftoppm`.
pub struct PdftoppmRasterizer {
    dpi: u32,
    timeout: Duration,
}

impl PdftoppmRasterizer {
    pub fn new(dpi: u32, timeout: Duration) -> Self {
        Self { dpi, timeout }
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf: &Path) -> Result<RenderedPages> {
        let dir = tempfile::Builder::new().prefix("lexrag-ocr-").tempdir()?;
        let prefix = dir.path().join("page");

        let mut cmd = Command::new("pdftoppm");
        cmd.arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(pdf)
            .arg(&prefix);
        run_tool(cmd, "pdftoppm", self.timeout).await?;

        let pages = collect_pages(dir.path())?;
        if pages.is_empty() {
            return Err(RagError::Ocr(format!(
                "pdftoppm produced no page images for {}",
                pdf.display()
            )));
        }
        Ok(RenderedPages::new(dir, pages))
    }
}

/// Page images in `dir` ordered by page number (`page-1.png`, `page-01.png`, …).
fn collect_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        let number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit('-').next())
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(u32::MAX);
        pages.push((number, path));
    }
    pages.sort();
    Ok(pages.into_iter().map(|(_, p)| p).collect())
}

// ============ tesseract ============

/// [`OcrEngine`] backed by the `tesseract` command-line tool.
pub struct TesseractEngine {
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, image: &Path, language: &str) -> Result<String> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image).arg("stdout").arg("-l").arg(language);
        let output = run_tool(cmd, "tesseract", self.timeout).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Run an external tool with a deadline, failing on non-zero exit.
async fn run_tool(
    mut cmd: Command,
    name: &str,
    timeout: Duration,
) -> Result<std::process::Output> {
    cmd.kill_on_drop(true);
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| RagError::Timeout {
            operation: name.to_string(),
            after: timeout,
        })?
        .map_err(|e| RagError::Ocr(format!("failed to execute '{}': {}. Is it installed?", name, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RagError::Ocr(format!("{} failed: {}", name, stderr.trim())));
    }
    Ok(output)
}

/// Build the rasteriser and engine named in `config`.
pub fn create_ocr(config: &OcrConfig) -> Result<(Box<dyn PageRasterizer>, Box<dyn OcrEngine>)> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let rasterizer: Box<dyn PageRasterizer> = match config.rasterizer.as_str() {
        "pdftoppm" => Box::new(PdftoppmRasterizer::new(config.dpi, timeout)),
        other => {
            return Err(RagError::InvalidConfig(format!(
                "unknown ocr.rasterizer: {}",
                other
            )))
        }
    };
    let engine: Box<dyn OcrEngine> = match config.engine.as_str() {
        "tesseract" => Box::new(TesseractEngine::new(timeout)),
        other => {
            return Err(RagError::InvalidConfig(format!(
                "unknown ocr.engine: {}",
                other
            )))
        }
    };
    Ok((rasterizer, engine))
}
