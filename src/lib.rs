//! # edgequake-pdf2docx
//!
//! Convert PDF documents and scanned images into editable Word documents
//! (`.docx`) or plain text, in batches.
//!
//! ## Why two tiers?
//!
//! A PDF with a real text layer converts best *structurally*: reading its
//! text objects, fonts and images keeps the text exact and the layout close.
//! Scans and photos have no text layer at all, so the pipeline falls back to
//! rasterising each page and running OCR. Every file records which tiers
//! were tried, in order, so a failure is always explainable.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (name, bytes)
//!  │
//!  ├─ 1. Input       extension → pdf | png | jpg | jpeg, stage in temp dir
//!  ├─ 2. Normalize   image → RGB → one-page PDF (<stem>_converted.pdf)
//!  ├─ 3. Structural  pdfium text/image objects → DOCX     ─┐ document
//!  ├─ 4. OCR         pdfium raster → tesseract, per page   ─┘ fallback
//!  ├─ 5. Direct      embedded text → TXT, OCR when blank   ── text output
//!  └─ 6. Batch       ordered outcomes, progress, ZIP of successes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2docx::{
//!     BatchOrchestrator, ConversionConfig, ConversionPipeline, InputFile, OutputKind,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let batch = BatchOrchestrator::new(ConversionPipeline::detect(config));
//!
//!     let files = vec![InputFile::from_path("scan.png")?, InputFile::from_path("report.pdf")?];
//!     let result = batch.run(files, OutputKind::Document).await;
//!     for entry in result.entries() {
//!         println!("{} → {}: {}", entry.file_name, entry.output_name, entry.outcome.message());
//!     }
//!     if let Some(archive) = result.archive() {
//!         std::fs::write("converted_docs.zip", archive.to_zip()?)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2docx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2docx = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime Requirements
//!
//! | Tool | Needed for | Missing means |
//! |------|------------|---------------|
//! | pdfium (`PDFIUM_LIB_PATH` or system) | every PDF operation | PDFs and images fail |
//! | tesseract (`PATH`) | OCR fallback | scans fail with "OCR not available" |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod toolchain;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::{ArchiveBundle, ARCHIVE_NAME};
pub use batch::{BatchEntry, BatchOrchestrator, BatchResult, OCR_INSTALL_HINT};
pub use config::{ConversionConfig, ConversionConfigBuilder, OutputKind, PageSeparator};
pub use convert::{ConversionPipeline, ConversionRequest};
pub use error::{ConvertError, OcrError, PageError};
pub use output::{ConversionOutcome, Strategy, StrategyAttempt};
pub use pipeline::input::InputFile;
pub use pipeline::ocr::{OcrEngine, PageResult, TesseractEngine};
pub use pipeline::{BlockingLane, CancellationFlag};
pub use progress::{FileStatus, NoopProgressSink, ProgressSink, SharedProgressSink};
pub use toolchain::{OcrAvailability, Toolchain};
