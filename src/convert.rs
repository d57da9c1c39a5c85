//! Per-file conversion with tiered fallback.
//!
//! ## Tiers
//!
//! | Output   | Input | First tier   | Fallback                     |
//! |----------|-------|--------------|------------------------------|
//! | document | PDF   | structural   | ocr-fallback (OCR → DOCX)    |
//! | document | image | structural*  | ocr-fallback                 |
//! | text     | PDF   | direct       | ocr-fallback (page texts)    |
//! | text     | image | ocr          | —                            |
//!
//! \* after normalising the image to `<stem>_converted.pdf`.
//!
//! Every tier returns a `Result`; the pipeline records each attempt and turns
//! the last error into [`ConversionOutcome::Failure`]. Nothing escapes
//! [`ConversionPipeline::convert`] as an error.

use crate::config::{ConversionConfig, OutputKind};
use crate::error::ConvertError;
use crate::output::{ConversionOutcome, Strategy, StrategyAttempt};
use crate::pipeline::docx::build_ocr_document;
use crate::pipeline::extract::join_pages;
use crate::pipeline::input::{InputFile, InputKind};
use crate::pipeline::normalize::decode_rgb;
use crate::pipeline::ocr::{assemble_text, rasterize_and_recognize, recognize_page, PageResult};
use crate::pipeline::{run_blocking, CancellationFlag};
use crate::toolchain::{OcrAvailability, Toolchain};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One input file and the artefact it should become.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub file: InputFile,
    pub kind: OutputKind,
}

impl ConversionRequest {
    pub fn new(file: InputFile, kind: OutputKind) -> Self {
        Self { file, kind }
    }
}

/// Runs the tiered strategy for one file at a time.
#[derive(Debug, Clone)]
pub struct ConversionPipeline {
    toolchain: Toolchain,
    config: ConversionConfig,
    cancel: CancellationFlag,
}

impl ConversionPipeline {
    pub fn new(toolchain: Toolchain, config: ConversionConfig) -> Self {
        Self {
            toolchain,
            config,
            cancel: CancellationFlag::new(),
        }
    }

    /// Pipeline over the pdfium/tesseract toolchain, probed once.
    pub fn detect(config: ConversionConfig) -> Self {
        let toolchain = Toolchain::detect(&config);
        Self::new(toolchain, config)
    }

    /// Share a cancellation flag with the caller.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    /// Convert one file, using `workdir` for intermediate files.
    ///
    /// `workdir` must be private to this call; it is created if missing.
    pub async fn convert(&self, request: ConversionRequest, workdir: &Path) -> ConversionOutcome {
        let start = Instant::now();
        let ConversionRequest { file, kind } = request;
        info!("Converting '{}' to {}", file.name(), kind.extension());

        if self.cancel.is_cancelled() {
            return failure(ConvertError::Cancelled, Vec::new());
        }

        let input_kind = match file.kind() {
            Ok(k) => k,
            Err(e) => {
                warn!("'{}': {}", file.name(), e);
                return failure(e, Vec::new());
            }
        };

        let outcome = match (input_kind, kind) {
            (InputKind::Pdf, OutputKind::Document) => match file.stage(workdir) {
                Ok(pdf) => self.document_tiers(pdf).await,
                Err(e) => failure(e, Vec::new()),
            },
            (InputKind::Image(_), OutputKind::Document) => {
                match self.normalize(&file, workdir).await {
                    Ok(pdf) => self.document_tiers(pdf).await,
                    Err(e) => failure(e, Vec::new()),
                }
            }
            (InputKind::Pdf, OutputKind::PlainText) => match file.stage(workdir) {
                Ok(pdf) => self.text_tiers(pdf).await,
                Err(e) => failure(e, Vec::new()),
            },
            (InputKind::Image(_), OutputKind::PlainText) => self.image_text(&file).await,
        };

        match &outcome {
            ConversionOutcome::Success { strategy, .. } => info!(
                "'{}' converted by {} in {}ms",
                file.name(),
                strategy,
                start.elapsed().as_millis()
            ),
            ConversionOutcome::Failure { .. } => warn!(
                "'{}' failed: {}",
                file.name(),
                outcome.reason().unwrap_or_default()
            ),
        }
        outcome
    }

    // ── Document output ─────────────────────────────────────────────────

    /// Image → `<stem>_converted.pdf` in the work directory.
    async fn normalize(&self, file: &InputFile, workdir: &Path) -> Result<PathBuf, ConvertError> {
        let normalizer = Arc::clone(&self.toolchain.normalizer);
        let bytes = file.bytes().to_vec();
        let pdf = self
            .toolchain
            .pdfium_lane
            .run(
                "image normalisation",
                self.config.structural_timeout_secs,
                move || normalizer.to_single_page_pdf(&bytes),
            )
            .await?;

        let staging_err = |e: std::io::Error| ConvertError::Staging {
            file: file.name().to_string(),
            detail: e.to_string(),
        };
        std::fs::create_dir_all(workdir).map_err(staging_err)?;
        let path = workdir.join(format!("{}_converted.pdf", file.stem()));
        std::fs::write(&path, pdf).map_err(staging_err)?;
        debug!("Normalised '{}' → {}", file.name(), path.display());
        Ok(path)
    }

    async fn document_tiers(&self, pdf_path: PathBuf) -> ConversionOutcome {
        let mut attempts = Vec::new();

        // ── Tier 1: structural ──────────────────────────────────────────
        let structural = Arc::clone(&self.toolchain.structural);
        let path = pdf_path.clone();
        let result = self
            .toolchain
            .pdfium_lane
            .run(
                "structural conversion",
                self.config.structural_timeout_secs,
                move || structural.convert(&path),
            )
            .await;
        match result {
            Ok(docx) => return success(docx, Strategy::Structural, attempts),
            Err(e) => {
                info!("Structural conversion failed, falling back to OCR: {}", e);
                attempts.push(StrategyAttempt::failed(Strategy::Structural, &e));
            }
        }

        // ── Tier 2: OCR fallback ────────────────────────────────────────
        let docx = match self.ocr_pages(&pdf_path).await {
            Ok(pages) => build_ocr_document(&pages),
            Err(e) => Err(e),
        };
        match docx {
            Ok(docx) => success(docx, Strategy::OcrFallback, attempts),
            Err(e) => {
                attempts.push(StrategyAttempt::failed(Strategy::OcrFallback, &e));
                failure(e, attempts)
            }
        }
    }

    // ── Plain-text output ───────────────────────────────────────────────

    async fn text_tiers(&self, pdf_path: PathBuf) -> ConversionOutcome {
        let mut attempts = Vec::new();

        let extractor = Arc::clone(&self.toolchain.text);
        let path = pdf_path.clone();
        let result = self
            .toolchain
            .pdfium_lane
            .run(
                "text extraction",
                self.config.structural_timeout_secs,
                move || extractor.extract(&path),
            )
            .await;
        let direct_err = match result {
            Ok(pages) => match join_pages(&pages) {
                Some(text) => return success(text.into_bytes(), Strategy::Direct, attempts),
                None => ConvertError::DirectExtractionFailed {
                    detail: "no embedded text layer".to_string(),
                },
            },
            Err(e) => e,
        };
        info!("Direct extraction gave nothing, falling back to OCR: {}", direct_err);
        attempts.push(StrategyAttempt::failed(Strategy::Direct, &direct_err));

        match self.ocr_pages(&pdf_path).await {
            Ok(pages) => {
                let text = assemble_text(&pages, &self.config.page_separator);
                success(text.into_bytes(), Strategy::OcrFallback, attempts)
            }
            Err(e) => {
                attempts.push(StrategyAttempt::failed(Strategy::OcrFallback, &e));
                failure(e, attempts)
            }
        }
    }

    /// Images have no text layer: recognise the decoded image directly.
    async fn image_text(&self, file: &InputFile) -> ConversionOutcome {
        let result = match &self.toolchain.ocr {
            OcrAvailability::Unavailable { reason } => Err(ConvertError::OcrUnavailable {
                reason: reason.clone(),
            }),
            OcrAvailability::Available { engine, .. } => {
                let bytes = file.bytes().to_vec();
                match run_blocking("image decoding", self.config.structural_timeout_secs, move || {
                    decode_rgb(&bytes)
                })
                .await
                {
                    Ok(image) => {
                        let page = recognize_page(engine, 1, Arc::new(image), &self.config).await;
                        match page.error {
                            None => Ok(format!("{}\n", page.text)),
                            Some(e) => Err(ConvertError::OcrFailed {
                                detail: e.to_string(),
                            }),
                        }
                    }
                    Err(e) => return failure(e, Vec::new()),
                }
            }
        };

        match result {
            Ok(text) => success(text.into_bytes(), Strategy::Ocr, Vec::new()),
            Err(e) => failure(e.clone(), vec![StrategyAttempt::failed(Strategy::Ocr, &e)]),
        }
    }

    async fn ocr_pages(&self, pdf_path: &Path) -> Result<Vec<PageResult>, ConvertError> {
        match &self.toolchain.ocr {
            OcrAvailability::Unavailable { reason } => Err(ConvertError::OcrUnavailable {
                reason: reason.clone(),
            }),
            OcrAvailability::Available { rasterizer, engine } => {
                rasterize_and_recognize(
                    rasterizer,
                    engine,
                    &self.toolchain.pdfium_lane,
                    pdf_path,
                    &self.config,
                    &self.cancel,
                )
                .await
            }
        }
    }
}

fn success(output: Vec<u8>, strategy: Strategy, mut attempts: Vec<StrategyAttempt>) -> ConversionOutcome {
    attempts.push(StrategyAttempt::succeeded(strategy));
    ConversionOutcome::Success {
        output,
        strategy,
        attempts,
    }
}

fn failure(error: ConvertError, attempts: Vec<StrategyAttempt>) -> ConversionOutcome {
    ConversionOutcome::Failure { error, attempts }
}

/// Fake strategies shared by the pipeline and batch tests.
///
/// Staged files are classified by their leading bytes:
/// `%PDF-text` has a text layer, `%PDF-scan` is image-only, anything else
/// is corrupt.
#[cfg(test)]
pub(crate) mod fakes {
    use crate::error::{ConvertError, OcrError, PageError};
    use crate::pipeline::extract::DirectTextExtractor;
    use crate::pipeline::normalize::{decode_rgb, ImageNormalizer};
    use crate::pipeline::ocr::OcrEngine;
    use crate::pipeline::render::PageRasterizer;
    use crate::pipeline::structural::StructuralConverter;
    use crate::toolchain::{OcrAvailability, Toolchain};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    pub const TEXT_PDF: &[u8] = b"%PDF-text two pages";
    pub const SCAN_PDF: &[u8] = b"%PDF-scan";
    pub const BAD_PDF: &[u8] = b"not a pdf at all";

    fn read(path: &Path) -> Vec<u8> {
        std::fs::read(path).unwrap_or_default()
    }

    pub fn png_bytes() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    pub struct FakeNormalizer;

    impl ImageNormalizer for FakeNormalizer {
        fn to_single_page_pdf(&self, image_bytes: &[u8]) -> Result<Vec<u8>, ConvertError> {
            decode_rgb(image_bytes)?;
            Ok(SCAN_PDF.to_vec())
        }
    }

    #[derive(Default)]
    pub struct FakeStructural {
        pub seen: Mutex<Vec<PathBuf>>,
        pub panic: bool,
        /// Hold this lock for the given time, like a hung pdfium call.
        pub hang: Option<(Arc<Mutex<()>>, Duration)>,
    }

    impl StructuralConverter for FakeStructural {
        fn convert(&self, pdf_path: &Path) -> Result<Vec<u8>, ConvertError> {
            self.seen.lock().unwrap().push(pdf_path.to_path_buf());
            if self.panic {
                panic!("converter crashed");
            }
            if let Some((lock, hold)) = &self.hang {
                let _guard = lock.lock().unwrap();
                std::thread::sleep(*hold);
            }
            let bytes = read(pdf_path);
            if bytes.starts_with(TEXT_PDF) {
                Ok(b"structural docx".to_vec())
            } else if bytes.starts_with(b"%PDF") {
                Err(ConvertError::StructuralConversionFailed {
                    detail: "no extractable text layer".into(),
                })
            } else {
                Err(ConvertError::StructuralConversionFailed {
                    detail: "could not be opened".into(),
                })
            }
        }
    }

    pub struct FakeText;

    impl DirectTextExtractor for FakeText {
        fn extract(&self, pdf_path: &Path) -> Result<Vec<String>, ConvertError> {
            let bytes = read(pdf_path);
            if bytes.starts_with(TEXT_PDF) {
                Ok(vec!["embedded page one".into(), "embedded page two".into()])
            } else if bytes.starts_with(b"%PDF") {
                Ok(vec!["  \n".into()])
            } else {
                Err(ConvertError::DirectExtractionFailed {
                    detail: "could not be opened".into(),
                })
            }
        }
    }

    /// Takes `lock` first when set, the way every pdfium stage shares one.
    #[derive(Default)]
    pub struct FakeRasterizer {
        pub lock: Option<Arc<Mutex<()>>>,
        pub calls: AtomicUsize,
    }

    impl PageRasterizer for FakeRasterizer {
        fn rasterize(
            &self,
            pdf_path: &Path,
        ) -> Result<Vec<Result<DynamicImage, PageError>>, ConvertError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _guard = self.lock.as_ref().map(|l| l.lock().unwrap());
            if read(pdf_path).starts_with(b"%PDF") {
                Ok(vec![Ok(DynamicImage::ImageRgb8(RgbImage::new(4, 4)))])
            } else {
                Err(ConvertError::OcrFailed {
                    detail: "could not be opened".into(),
                })
            }
        }
    }

    #[derive(Default)]
    pub struct FakeEngine {
        pub calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OcrEngine for FakeEngine {
        fn name(&self) -> &str {
            "fake"
        }
        fn probe(&self) -> Result<(), String> {
            Ok(())
        }
        async fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("recognised paragraph\u{000C}".into())
        }
    }

    pub struct Fakes {
        pub structural: Arc<FakeStructural>,
        pub rasterizer: Arc<FakeRasterizer>,
        pub engine: Arc<FakeEngine>,
    }

    impl Fakes {
        pub fn new() -> Self {
            Self {
                structural: Arc::new(FakeStructural::default()),
                rasterizer: Arc::new(FakeRasterizer::default()),
                engine: Arc::new(FakeEngine::default()),
            }
        }

        pub fn ocr_calls(&self) -> usize {
            self.engine.calls.load(Ordering::SeqCst)
        }

        pub fn toolchain(&self) -> Toolchain {
            Toolchain::new(
                Arc::new(FakeNormalizer),
                self.structural.clone(),
                Arc::new(FakeText),
                OcrAvailability::Available {
                    rasterizer: self.rasterizer.clone(),
                    engine: self.engine.clone(),
                },
            )
        }

        pub fn toolchain_without_ocr(&self) -> Toolchain {
            let mut toolchain = self.toolchain();
            toolchain.ocr = OcrAvailability::Unavailable {
                reason: "tesseract not found".into(),
            };
            toolchain
        }
    }
}
