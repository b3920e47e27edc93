//! Text extraction for legal documents (PDF, DOCX).
//!
//! [`TextExtractor::extract`] turns a file on disk into a [`Document`] of
//! ordered, non-blank text segments:
//!
//! | Format | Strategy | Segments |
//! |--------|----------|----------|
//! | PDF with a text layer | `pdf-extract`, page by page | one per non-blank page |
//! | scanned PDF | rasterise + OCR ([`crate::ocr`]) | one, pages joined by `\n` |
//! | DOCX | `word/document.xml` runs | one |
//!
//! Parsing runs on the blocking thread pool under a deadline, so a
//! malformed file (or a parser panic) surfaces as an error instead of
//! stalling or crashing the session.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use lexrag_core::models::{Document, DocumentFormat, ExtractionMethod};
use lexrag_core::{RagError, Result};

use crate::config::{ExtractionConfig, OcrConfig};
use crate::ocr::{self, OcrEngine, PageRasterizer};

/// Default deadline for a whole OCR pass.
const DEFAULT_OCR_DEADLINE: Duration = Duration::from_secs(1800);

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extracts text from PDF and DOCX files, with OCR for scanned PDFs.
pub struct TextExtractor {
    rasterizer: Box<dyn PageRasterizer>,
    ocr: Box<dyn OcrEngine>,
    ocr_language: String,
    timeout: Duration,
    ocr_deadline: Duration,
}

impl TextExtractor {
    pub fn new(
        rasterizer: Box<dyn PageRasterizer>,
        ocr: Box<dyn OcrEngine>,
        ocr_language: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            rasterizer,
            ocr,
            ocr_language: ocr_language.into(),
            timeout,
            ocr_deadline: DEFAULT_OCR_DEADLINE,
        }
    }

    /// Bound a whole OCR pass (rasterising plus every page).
    pub fn with_ocr_deadline(mut self, deadline: Duration) -> Self {
        self.ocr_deadline = deadline;
        self
    }

    /// Build an extractor using the OCR tools named in `ocr`.
    pub fn from_config(extraction: &ExtractionConfig, ocr: &OcrConfig) -> Result<Self> {
        let (rasterizer, engine) = ocr::create_ocr(ocr)?;
        Ok(Self::new(
            rasterizer,
            engine,
            ocr.language.clone(),
            Duration::from_secs(extraction.timeout_secs),
        )
        .with_ocr_deadline(Duration::from_secs(ocr.pass_timeout_secs)))
    }

    /// Extract the text segments of `path`.
    ///
    /// # Errors
    ///
    /// - [`RagError::UnsupportedFormat`] for anything but `.pdf` / `.docx`
    /// - [`RagError::EmptyDocument`] for a DOCX without text
    /// - [`RagError::NoTextExtracted`] for a PDF blank even after OCR
    pub async fn extract(&self, path: &Path) -> Result<Document> {
        let format = DocumentFormat::from_path(path)?;
        let bytes = tokio::fs::read(path).await?;
        debug!(path = %path.display(), %format, bytes = bytes.len(), "extracting");

        let (method, segments) = match format {
            DocumentFormat::Pdf => self.extract_pdf(path, bytes).await?,
            DocumentFormat::Docx => {
                let text = self.blocking("DOCX extraction", move || extract_docx(&bytes)).await?;
                if text.trim().is_empty() {
                    return Err(RagError::EmptyDocument(path.display().to_string()));
                }
                (ExtractionMethod::Docx, vec![text])
            }
        };

        info!(
            path = %path.display(),
            %format,
            method = %method,
            segments = segments.len(),
            "text extracted"
        );
        Ok(Document {
            source: path.to_path_buf(),
            format,
            method,
            segments,
        })
    }

    async fn extract_pdf(
        &self,
        path: &Path,
        bytes: Vec<u8>,
    ) -> Result<(ExtractionMethod, Vec<String>)> {
        let pages = self.blocking("PDF text extraction", move || pdf_pages(&bytes)).await?;
        let total = pages.len();
        let text_pages: Vec<String> = pages.into_iter().filter(|p| !p.trim().is_empty()).collect();
        if !text_pages.is_empty() {
            debug!(pages = total, with_text = text_pages.len(), "using PDF text layer");
            return Ok((ExtractionMethod::TextLayer, text_pages));
        }

        warn!(path = %path.display(), pages = total, "no text layer, falling back to OCR");
        let text = ocr::ocr_pdf(
            path,
            self.rasterizer.as_ref(),
            self.ocr.as_ref(),
            &self.ocr_language,
            self.ocr_deadline,
        )
        .await?;
        if text.trim().is_empty() {
            return Err(RagError::NoTextExtracted(path.display().to_string()));
        }
        Ok((ExtractionMethod::Ocr, vec![text]))
    }

    /// Run a CPU-bound parser on the blocking pool under the extraction deadline.
    async fn blocking<T, F>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(RagError::Extraction(format!(
                "{} aborted: {}",
                operation, join
            ))),
            Err(_) => Err(RagError::Timeout {
                operation: operation.to_string(),
                after: self.timeout,
            }),
        }
    }
}

/// Text of every PDF page, in order (pages may be blank).
fn pdf_pages(bytes: &[u8]) -> Result<Vec<String>> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| RagError::Extraction(format!("PDF extraction failed: {}", e)))
}

/// Body text of a DOCX file: one line per paragraph.
pub fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ooxml_error(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ooxml_error("word/document.xml not found"))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ooxml_error(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml_error("word/document.xml exceeds size limit"));
    }
    extract_wordml_text(&doc_xml)
}

fn ooxml_error(msg: impl std::fmt::Display) -> RagError {
    RagError::Extraction(format!("DOCX extraction failed: {}", msg))
}

/// Walk WordprocessingML, keeping `w:t` text and mapping layout elements
/// (`w:p` end, `w:br`, `w:cr`, `w:tab`) to whitespace.
fn extract_wordml_text(xml: &[u8]) -> Result<String> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ooxml_error(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"br" | b"cr" => out.push('\n'),
                b"tab" => out.push('\t'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_error(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
