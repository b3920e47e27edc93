//! End-to-end load/ask tests against in-memory fake backends.
//!
//! Covers: DOCX → one chunk/one entry, text-layer PDF, OCR fallback,
//! unsupported formats and failed loads leaving the previous document
//! active, `NotLoaded` before any backend call, token accumulation,
//! history order, and document replacement.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use lexrag_core::conversation::{ChatBackend, Completion, ConversationEngine, ConversationPolicy};
use lexrag_core::embedding::{Embedder, HashingEmbedder};
use lexrag_core::index::memory::IndexCatalog;
use lexrag_core::index::VectorIndex;
use lexrag_core::models::{ChatMessage, ConversationTurn, ExtractionMethod, Role};
use lexrag_core::{RagError, Result};
use lexrag::extract::TextExtractor;
use lexrag::ocr::{OcrEngine, PageRasterizer, RenderedPages};
use lexrag::persona::{Language, LEGAL_ASSISTANT};
use lexrag::session::{LoadOptions, Session};

// ============ fixtures ============

fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// One-page PDF whose content stream is `content`, with correct xref offsets.
fn pdf_with_content(content: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn pdf_with_phrase(phrase: &str) -> Vec<u8> {
    pdf_with_content(&format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase))
}

/// A page with no text operators, like a scanned image.
fn blank_pdf() -> Vec<u8> {
    pdf_with_content("")
}

fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

// ============ fake backends ============

struct FakeRasterizer {
    pages: usize,
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    async fn rasterize(&self, _pdf: &Path) -> Result<RenderedPages> {
        let dir = tempfile::tempdir()?;
        let mut pages = Vec::new();
        for i in 1..=self.pages {
            let page = dir.path().join(format!("page-{}.png", i));
            std::fs::write(&page, b"png")?;
            pages.push(page);
        }
        Ok(RenderedPages::new(dir, pages))
    }
}

#[derive(Clone)]
struct FakeOcr {
    text: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl OcrEngine for FakeOcr {
    async fn recognize(&self, _image: &Path, language: &str) -> Result<String> {
        assert_eq!(language, "spa");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Records every prompt; answers `a1`, `a2`, ... with scripted usage.
#[derive(Clone, Default)]
struct FakeChat {
    prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    usage: Vec<u64>,
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _model: &str,
        _temperature: f32,
    ) -> Result<Completion> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(messages.to_vec());
        let n = prompts.len();
        Ok(Completion {
            text: format!("a{}", n),
            total_tokens: self.usage.get(n - 1).copied().unwrap_or(10),
        })
    }
}

/// Hashing embedder that can be switched into failure mode.
struct SwitchableEmbedder {
    inner: HashingEmbedder,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl Embedder for SwitchableEmbedder {
    fn model_name(&self) -> &str {
        "switchable"
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Embedding("429 rate limited".into()));
        }
        self.inner.embed(texts).await
    }
}

struct Harness {
    session: Session,
    chat: FakeChat,
    ocr_calls: Arc<AtomicUsize>,
    embed_fail: Arc<AtomicBool>,
    dir: TempDir,
}

fn harness_with(ocr_text: &str, usage: Vec<u64>, options: LoadOptions) -> Harness {
    let ocr = FakeOcr {
        text: ocr_text.to_string(),
        calls: Arc::new(AtomicUsize::new(0)),
    };
    let ocr_calls = ocr.calls.clone();
    let extractor = TextExtractor::new(
        Box::new(FakeRasterizer { pages: 2 }),
        Box::new(ocr),
        "spa",
        Duration::from_secs(30),
    );

    let embed_fail = Arc::new(AtomicBool::new(false));
    let catalog = IndexCatalog::new(Arc::new(SwitchableEmbedder {
        inner: HashingEmbedder::new(256),
        fail: embed_fail.clone(),
    }));

    let chat = FakeChat {
        usage,
        ..Default::default()
    };
    let engine = ConversationEngine::new(
        LEGAL_ASSISTANT,
        ConversationPolicy::default(),
        Box::new(chat.clone()),
    );

    Harness {
        session: Session::new(extractor, catalog, engine, options),
        chat,
        ocr_calls,
        embed_fail,
        dir: tempfile::tempdir().unwrap(),
    }
}

fn harness() -> Harness {
    harness_with("", Vec::new(), LoadOptions::default())
}

fn active_collection(session: &Session) -> String {
    session.active().unwrap().report.collection.clone()
}

// ============ loading ============

#[tokio::test]
async fn docx_hello_world_is_one_chunk_and_one_entry() {
    let mut h = harness();
    let path = write(&h.dir, "hello.docx", &docx_with_paragraphs(&["Hello world"]));

    let report = h.session.load_document(&path).await.unwrap();
    assert_eq!(report.segments, 1);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.method, ExtractionMethod::Docx);

    let active = h.session.active().unwrap();
    assert_eq!(active.collection().len(), 1);
    assert_eq!(active.collection().ids(), vec!["1:0".to_string()]);
}

#[tokio::test]
async fn long_document_follows_sliding_window() {
    let mut h = harness();
    let text = "x".repeat(2500);
    let path = write(&h.dir, "long.docx", &docx_with_paragraphs(&[&text]));

    let report = h.session.load_document(&path).await.unwrap();
    assert_eq!(report.chars, 2500);
    assert_eq!(report.chunks, 4);
    assert_eq!(
        h.session.active().unwrap().collection().ids(),
        vec!["1:0", "1:1", "1:2", "1:3"]
    );
}

#[tokio::test]
async fn small_batches_index_every_chunk() {
    let mut h = harness_with(
        "",
        Vec::new(),
        LoadOptions {
            chunk_size: 10,
            overlap: 2,
            batch_size: 3,
            ..Default::default()
        },
    );
    let text = "abcdefghij".repeat(10);
    let path = write(&h.dir, "batched.docx", &docx_with_paragraphs(&[&text]));

    let report = h.session.load_document(&path).await.unwrap();
    assert_eq!(report.chunks, 13);
    assert_eq!(h.session.active().unwrap().collection().len(), 13);
}

#[tokio::test]
async fn text_layer_pdf_skips_ocr() {
    let mut h = harness();
    let path = write(&h.dir, "lease.pdf", &pdf_with_phrase("lease term twelve months"));

    let report = h.session.load_document(&path).await.unwrap();
    assert_eq!(report.method, ExtractionMethod::TextLayer);
    assert!(report.chunks >= 1);
    assert_eq!(h.ocr_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blank_pdf_runs_ocr_then_reports_no_text() {
    let mut h = harness_with("   \n", Vec::new(), LoadOptions::default());
    let path = write(&h.dir, "scan.pdf", &blank_pdf());

    let err = h.session.load_document(&path).await.unwrap_err();
    assert!(matches!(err, RagError::NoTextExtracted(_)), "got {:?}", err);
    assert_eq!(h.ocr_calls.load(Ordering::SeqCst), 2);
    assert!(!h.session.is_loaded());
    assert!(h.session.catalog().names().is_empty());
}

#[tokio::test]
async fn scanned_pdf_is_indexed_from_ocr_text() {
    let mut h = harness_with(
        "CLÁUSULA PRIMERA: el locador cede el inmueble.",
        Vec::new(),
        LoadOptions::default(),
    );
    let path = write(&h.dir, "scan.pdf", &blank_pdf());

    let report = h.session.load_document(&path).await.unwrap();
    assert_eq!(report.method, ExtractionMethod::Ocr);
    assert_eq!(report.segments, 1);
    assert_eq!(report.chunks, 1);
    assert_eq!(h.ocr_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unsupported_format_keeps_previous_document() {
    let mut h = harness();
    let docx = write(&h.dir, "contract.docx", &docx_with_paragraphs(&["Rent is due monthly."]));
    h.session.load_document(&docx).await.unwrap();
    let before = active_collection(&h.session);

    let notes = write(&h.dir, "notes.txt", b"plain text");
    let err = h.session.load_document(&notes).await.unwrap_err();
    assert!(matches!(err, RagError::UnsupportedFormat(_)));

    assert_eq!(active_collection(&h.session), before);
    assert_eq!(h.session.catalog().names(), vec![before.clone()]);
    assert_eq!(h.session.active().unwrap().collection().len(), 1);
}

#[tokio::test]
async fn invalid_chunking_keeps_previous_document() {
    let mut h = harness();
    let first = write(&h.dir, "first.docx", &docx_with_paragraphs(&["First contract."]));
    h.session.load_document(&first).await.unwrap();
    let before = active_collection(&h.session);

    h.session.set_load_options(LoadOptions {
        chunk_size: 10,
        overlap: 10,
        ..h.session.load_options().clone()
    });
    let second = write(&h.dir, "second.docx", &docx_with_paragraphs(&["Second contract."]));
    let err = h.session.load_document(&second).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidConfig(_)), "got {:?}", err);

    assert_eq!(active_collection(&h.session), before);
    assert_eq!(h.session.catalog().names(), vec![before]);
    assert_eq!(h.session.active().unwrap().collection().len(), 1);
}

#[tokio::test]
async fn embedding_failure_keeps_previous_document() {
    let mut h = harness();
    let first = write(&h.dir, "first.docx", &docx_with_paragraphs(&["First contract."]));
    h.session.load_document(&first).await.unwrap();
    let before = active_collection(&h.session);

    h.embed_fail.store(true, Ordering::SeqCst);
    let second = write(&h.dir, "second.docx", &docx_with_paragraphs(&["Second contract."]));
    let err = h.session.load_document(&second).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)));

    assert_eq!(active_collection(&h.session), before);
    assert_eq!(h.session.catalog().names(), vec![before]);
}

#[tokio::test]
async fn reload_replaces_collection_with_fresh_ids() {
    let mut h = harness();
    let a = write(&h.dir, "a.docx", &docx_with_paragraphs(&["Deed of sale."]));
    let b = write(&h.dir, "b.docx", &docx_with_paragraphs(&["Power of attorney."]));

    h.session.load_document(&a).await.unwrap();
    let first = active_collection(&h.session);
    h.session.load_document(&b).await.unwrap();
    let second = active_collection(&h.session);

    assert_ne!(first, second);
    assert_eq!(h.session.catalog().names(), vec![second]);
    assert_eq!(h.session.active().unwrap().collection().ids(), vec!["2:0"]);
}

// ============ asking ============

#[tokio::test]
async fn ask_before_load_is_not_loaded_without_backend_calls() {
    let mut h = harness();
    let err = h
        .session
        .ask("What is the term?", Language::English.instruction())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NotLoaded));
    assert!(h.chat.prompts.lock().unwrap().is_empty());
    assert_eq!(h.session.tokens_used(), 0);
}

#[tokio::test]
async fn tokens_accumulate_and_history_is_ordered() {
    let mut h = harness_with("", vec![30, 45], LoadOptions::default());
    let path = write(
        &h.dir,
        "lease.docx",
        &docx_with_paragraphs(&["The lease term is twelve months.", "Rent is 500 per month."]),
    );
    h.session.load_document(&path).await.unwrap();

    let es = Language::Spanish.instruction();
    let first = h.session.ask("q1", es).await.unwrap();
    assert_eq!(first.usage, 30);
    assert_eq!(first.total_tokens, 30);
    let second = h.session.ask("q2", es).await.unwrap();
    assert_eq!(second.total_tokens, 75);
    assert_eq!(h.session.tokens_used(), 75);

    assert_eq!(
        h.session.history(),
        &[
            ConversationTurn {
                query: "q1".into(),
                answer: "a1".into()
            },
            ConversationTurn {
                query: "q2".into(),
                answer: "a2".into()
            },
        ]
    );

    let prompts = h.chat.prompts.lock().unwrap();
    let replay: Vec<(Role, &str)> = prompts[1][1..3]
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(replay, vec![(Role::User, "q1"), (Role::Assistant, "a1")]);
    assert!(prompts[1][0]
        .content
        .ends_with("\nPor favor responde en Español."));
    assert!(prompts[1][3].content.starts_with("Context:\n"));
    assert!(prompts[1][3].content.ends_with("\n\nQuestion: q2"));
}

#[tokio::test]
async fn reset_clears_history_but_not_tokens() {
    let mut h = harness_with("", vec![12], LoadOptions::default());
    let path = write(&h.dir, "acta.docx", &docx_with_paragraphs(&["Minutes of the meeting."]));
    h.session.load_document(&path).await.unwrap();
    h.session.ask("Who attended?", "").await.unwrap();

    h.session.reset_history();
    assert!(h.session.history().is_empty());
    assert_eq!(h.session.tokens_used(), 12);

    h.session.ask("When?", "").await.unwrap();
    let prompts = h.chat.prompts.lock().unwrap();
    assert_eq!(prompts[1].len(), 2, "no turns replayed after reset");
}

#[tokio::test]
async fn shared_session_serialises_callers() {
    let mut h = harness_with("", vec![5, 7], LoadOptions::default());
    let path = write(&h.dir, "bylaws.docx", &docx_with_paragraphs(&["Article 1: name."]));
    h.session.load_document(&path).await.unwrap();
    let chat = h.chat.clone();
    let shared = h.session.into_shared();

    let mut tasks = Vec::new();
    for q in ["first", "second"] {
        let shared = shared.clone();
        tasks.push(tokio::spawn(async move {
            shared.lock().await.ask(q, "").await.map(|a| a.usage)
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let session = shared.lock().await;
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.tokens_used(), 12);
    assert_eq!(chat.prompts.lock().unwrap().len(), 2);
}
