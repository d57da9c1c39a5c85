//! End-to-end integration tests for edgequake-pdf2docx.
//!
//! These tests drive the real toolchain: pdfium for every PDF operation and
//! tesseract for OCR. Fixtures are generated on the fly with pdfium (a text
//! PDF, and a PNG "screenshot" rendered from it), so no files need to be
//! downloaded. They are gated behind the `E2E_ENABLED` environment variable
//! so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_batch_scenario -- --nocapture

use edgequake_pdf2docx::pipeline::pdfium::PdfiumLibrary;
use edgequake_pdf2docx::{
    BatchOrchestrator, ConversionConfig, ConversionPipeline, ConversionRequest, InputFile,
    OutputKind, Strategy,
};
use image::ImageFormat;
use pdfium_render::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

const PAGE_ONE: &[&str] = &[
    "Quarterly Report",
    "Revenue grew steadily across every region",
    "while operating costs remained stable.",
];
const PAGE_TWO: &[&str] = &["Outlook", "The board expects similar results next quarter."];

fn library() -> PdfiumLibrary {
    PdfiumLibrary::new(std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from))
}

fn config() -> ConversionConfig {
    let mut builder = ConversionConfig::builder().render_dpi(300);
    if let Some(path) = std::env::var_os("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_library_path(path);
    }
    builder.build().expect("valid config")
}

/// Skip this test unless E2E_ENABLED is set and pdfium can be bound.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if !library().is_available() {
            println!("SKIP — pdfium not found; set PDFIUM_LIB_PATH");
            return;
        }
    }};
}

/// Additionally skip when tesseract is missing.
macro_rules! ocr_skip_unless_ready {
    ($pipeline:expr) => {{
        if !$pipeline.toolchain().ocr.is_available() {
            println!("SKIP — tesseract not found on PATH");
            return;
        }
    }};
}

/// A PDF with one text object per line, one page per slice.
fn text_pdf(pages: &[&[&str]]) -> Vec<u8> {
    let pdfium = library().bind().expect("pdfium binds");
    let mut document = pdfium.create_new_pdf().expect("new pdf");
    let font = document.fonts_mut().helvetica();
    for lines in pages {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .expect("new page");
        for (i, line) in lines.iter().enumerate() {
            page.objects_mut()
                .create_text_object(
                    PdfPoints::new(72.0),
                    PdfPoints::new(760.0 - i as f32 * 28.0),
                    *line,
                    font,
                    PdfPoints::new(18.0),
                )
                .expect("text object");
        }
    }
    document.save_to_bytes().expect("save pdf")
}

/// The same pages redrawn onto new pages through Form XObjects, the way
/// `\includepdf` or page-imposition tools embed them.
fn imported_pdf(pdf: &[u8]) -> Vec<u8> {
    let pdfium = library().bind().expect("pdfium binds");
    let source = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .expect("load fixture");
    let imported = source
        .pages()
        .tile_into_new_document(1, 1, PdfPagePaperSize::a4())
        .expect("import pages");
    imported.save_to_bytes().expect("save pdf")
}

/// Render page 1 of `pdf` to PNG bytes, like a screenshot of the document.
fn screenshot(pdf: &[u8]) -> Vec<u8> {
    let pdfium = library().bind().expect("pdfium binds");
    let document = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .expect("load fixture");
    let page = document.pages().get(0).expect("page 1");
    let image = page
        .render_with_config(&PdfRenderConfig::new().set_target_width(1800))
        .expect("render")
        .as_image();
    let mut png = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image.to_rgb8())
        .write_to(&mut png, ImageFormat::Png)
        .expect("encode png");
    png.into_inner()
}

fn docx_text(docx: &[u8]) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(docx)).expect("docx is a zip");
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .expect("document part")
        .read_to_string(&mut xml)
        .expect("utf-8 xml");
    let tags = Regex::new(r"<[^>]+>").unwrap();
    tags.replace_all(&xml, " ").into_owned()
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Share of ground-truth tokens present in `recognised`.
fn token_overlap(truth: &[&str], recognised: &str) -> f64 {
    let expected = tokens(&truth.join(" "));
    let found = tokens(recognised);
    expected.intersection(&found).count() as f64 / expected.len() as f64
}

async fn convert_one(name: &str, bytes: Vec<u8>, kind: OutputKind) -> edgequake_pdf2docx::ConversionOutcome {
    let workdir = tempfile::tempdir().unwrap();
    ConversionPipeline::detect(config())
        .convert(
            ConversionRequest::new(InputFile::new(name, bytes), kind),
            workdir.path(),
        )
        .await
}

// ── Structural / direct tier (pdfium only) ───────────────────────────────────

#[tokio::test]
async fn test_text_pdf_converts_structurally() {
    e2e_skip_unless_ready!();

    let outcome = convert_one("a.pdf", text_pdf(&[PAGE_ONE, PAGE_TWO]), OutputKind::Document).await;

    assert_eq!(outcome.strategies(), vec![Strategy::Structural]);
    let text = docx_text(outcome.output().expect("docx bytes"));
    assert!(text.contains("Quarterly Report"), "got: {text}");
    assert!(text.contains("Outlook"));
    println!("--- BEGIN OUTPUT ---\n{}\n--- END OUTPUT ---", text);
}

#[tokio::test]
async fn test_imported_pages_convert_structurally() {
    e2e_skip_unless_ready!();

    let pdf = imported_pdf(&text_pdf(&[PAGE_ONE]));
    let outcome = convert_one("imported.pdf", pdf, OutputKind::Document).await;

    assert_eq!(outcome.strategies(), vec![Strategy::Structural]);
    let text = docx_text(outcome.output().expect("docx bytes"));
    assert!(token_overlap(PAGE_ONE, &text) > 0.99, "got: {text}");
}

#[tokio::test]
async fn test_text_pdf_direct_extraction() {
    e2e_skip_unless_ready!();

    let outcome = convert_one("a.pdf", text_pdf(&[PAGE_ONE, PAGE_TWO]), OutputKind::PlainText).await;

    assert_eq!(outcome.strategies(), vec![Strategy::Direct]);
    let text = String::from_utf8(outcome.output().unwrap().to_vec()).unwrap();
    assert!(token_overlap(PAGE_ONE, &text) > 0.99, "got: {text}");
    assert!(token_overlap(PAGE_TWO, &text) > 0.99, "got: {text}");
}

#[tokio::test]
async fn test_corrupt_pdf_fails_every_tier() {
    e2e_skip_unless_ready!();

    let outcome = convert_one("bad.pdf", b"%PDF-1.7 truncated".to_vec(), OutputKind::Document).await;

    assert!(!outcome.is_success());
    assert_eq!(
        outcome.strategies(),
        vec![Strategy::Structural, Strategy::OcrFallback]
    );
    println!("reason: {}", outcome.reason().unwrap());
}

// ── OCR tier (pdfium + tesseract) ────────────────────────────────────────────

#[tokio::test]
async fn test_screenshot_round_trip() {
    e2e_skip_unless_ready!();
    let pipeline = ConversionPipeline::detect(config());
    ocr_skip_unless_ready!(pipeline);

    let png = screenshot(&text_pdf(&[PAGE_ONE]));
    let workdir = tempfile::tempdir().unwrap();
    let outcome = pipeline
        .convert(
            ConversionRequest::new(InputFile::new("screenshot.png", png), OutputKind::Document),
            workdir.path(),
        )
        .await;

    assert_eq!(
        outcome.strategies(),
        vec![Strategy::Structural, Strategy::OcrFallback]
    );
    assert!(workdir.path().join("screenshot_converted.pdf").exists());
    let text = docx_text(outcome.output().unwrap());
    let overlap = token_overlap(PAGE_ONE, &text);
    println!("token overlap: {:.0}%\n{}", overlap * 100.0, text);
    assert!(overlap >= 0.9, "overlap {overlap:.2} below 90%");
}

#[tokio::test]
async fn test_screenshot_to_text() {
    e2e_skip_unless_ready!();
    let pipeline = ConversionPipeline::detect(config());
    ocr_skip_unless_ready!(pipeline);

    let png = screenshot(&text_pdf(&[PAGE_ONE]));
    let workdir = tempfile::tempdir().unwrap();
    let outcome = pipeline
        .convert(
            ConversionRequest::new(InputFile::new("screenshot.png", png), OutputKind::PlainText),
            workdir.path(),
        )
        .await;

    assert_eq!(outcome.strategies(), vec![Strategy::Ocr]);
    let text = String::from_utf8(outcome.output().unwrap().to_vec()).unwrap();
    assert!(token_overlap(PAGE_ONE, &text) >= 0.9, "got: {text}");
}

#[tokio::test]
async fn test_batch_scenario() {
    e2e_skip_unless_ready!();
    let pipeline = ConversionPipeline::detect(config());
    ocr_skip_unless_ready!(pipeline);

    let text = text_pdf(&[PAGE_ONE, PAGE_TWO]);
    let files = vec![
        InputFile::new("a.pdf", text.clone()),
        InputFile::new("scan.png", screenshot(&text)),
        InputFile::new("bad.pdf", b"garbage bytes".to_vec()),
    ];
    let result = BatchOrchestrator::new(pipeline)
        .run(files, OutputKind::Document)
        .await;

    assert_eq!(result.len(), 3);
    let strategies: Vec<Option<Strategy>> = result
        .entries()
        .iter()
        .map(|e| e.outcome.strategy_used())
        .collect();
    assert_eq!(
        strategies,
        vec![Some(Strategy::Structural), Some(Strategy::OcrFallback), None]
    );

    let archive = result.archive().expect("two successes");
    assert_eq!(archive.names(), vec!["a.docx", "scan.docx"]);
    let zip = zip::ZipArchive::new(Cursor::new(archive.to_zip().unwrap())).unwrap();
    assert_eq!(zip.len(), 2);
}

#[tokio::test]
async fn test_empty_batch() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let result = BatchOrchestrator::new(ConversionPipeline::detect(config()))
        .run(Vec::new(), OutputKind::Document)
        .await;
    assert!(result.is_empty());
    assert!(result.archive().is_none());
}
