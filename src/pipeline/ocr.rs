//! OCR: rasterise a PDF and recognise each page independently.
//!
//! ## Page isolation
//!
//! Every page is rendered and recognised on its own. A page that fails
//! (render glitch, tesseract crash, timeout) yields a [`PageResult`] with
//! `error` set and its error text stands in for the page content; the
//! document is only an error if *every* page fails.
//!
//! ## Retry Strategy
//!
//! The OCR engine is the most failure-prone external dependency, so only its
//! call is retried: `ocr_max_retries` extra attempts with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`), i.e. 250 ms then 500 ms with the defaults.
//! An engine that reports itself unavailable is not retried.
//!
//! Each attempt is bounded by `ocr_timeout_secs`. Engines are async and must
//! stop their work when the future is dropped; [`TesseractEngine`] kills its
//! subprocess and removes the page image on timeout.

use crate::config::{ConversionConfig, PageSeparator};
use crate::error::{ConvertError, OcrError, PageError};
use crate::pipeline::postprocess::clean_ocr_text;
use crate::pipeline::render::PageRasterizer;
use crate::pipeline::{BlockingLane, CancellationFlag};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Black-box text recogniser: `recognize(image) -> text`.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Human-readable engine name for logs.
    fn name(&self) -> &str;

    /// Probe whether the engine can run; `Err` carries an install hint.
    fn probe(&self) -> Result<(), String>;

    /// Recognise one page. Dropping the future must abandon the work.
    async fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Recognised text (or the reason there is none) for one page.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Cleaned text; empty when `error` is set.
    pub text: String,
    /// Retries used before the final attempt.
    pub retries: u32,
    pub error: Option<PageError>,
}

impl PageResult {
    fn failed(page_num: usize, retries: u32, error: PageError) -> Self {
        Self {
            page_num,
            text: String::new(),
            retries,
            error: Some(error),
        }
    }
}

// ── Tesseract ────────────────────────────────────────────────────────────────

/// Tesseract OCR through its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
}

impl TesseractEngine {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            language: config.ocr_language.clone(),
        }
    }

    async fn run(&self, image_path: &Path) -> Result<String, OcrError> {
        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => Err(OcrError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::NotAvailable(
                format!("'{}' not found", self.binary.display()),
            )),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn probe(&self) -> Result<(), String> {
        match std::process::Command::new(&self.binary)
            .arg("--version")
            .output()
        {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => Err(format!(
                "'{} --version' exited with {}",
                self.binary.display(),
                out.status
            )),
            Err(_) => Err(format!(
                "'{}' not found. Install it with: apt install tesseract-ocr (or brew install tesseract)",
                self.binary.display()
            )),
        }
    }

    async fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, ImageFormat::Png)?;

        // Removed on drop, including when the attempt times out.
        let tmp = tempfile::Builder::new()
            .prefix("ocr-page-")
            .suffix(".png")
            .tempfile()?;
        tokio::fs::write(tmp.path(), png.into_inner()).await?;
        self.run(tmp.path()).await
    }
}

// ── Recognition with retry ───────────────────────────────────────────────────

/// Recognise one page image, retrying the engine call with backoff.
///
/// Always returns a `PageResult` — never propagates the error upward so a
/// single bad page doesn't abort the document.
pub async fn recognize_page(
    engine: &Arc<dyn OcrEngine>,
    page_num: usize,
    image: Arc<DynamicImage>,
    config: &ConversionConfig,
) -> PageResult {
    let mut last_err: Option<ConvertError> = None;
    let mut all_timed_out = true;
    let mut attempts_made = 0;

    for attempt in 0..=config.ocr_max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Page {}: OCR retry {}/{} after {}ms",
                page_num, attempt, config.ocr_max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        attempts_made = attempt;

        let result = match timeout(
            Duration::from_secs(config.ocr_timeout_secs),
            engine.recognize(&image),
        )
        .await
        {
            Err(_) => Err(ConvertError::Timeout {
                stage: "OCR".to_string(),
                secs: config.ocr_timeout_secs,
            }),
            Ok(Err(OcrError::NotAvailable(reason))) => {
                Err(ConvertError::OcrUnavailable { reason })
            }
            Ok(Err(other)) => Err(ConvertError::OcrFailed {
                detail: other.to_string(),
            }),
            Ok(Ok(raw)) => Ok(raw),
        };

        match result {
            Ok(raw) => {
                let text = clean_ocr_text(&raw);
                debug!("Page {}: {} chars recognised", page_num, text.len());
                return PageResult {
                    page_num,
                    text,
                    retries: attempt,
                    error: None,
                };
            }
            Err(e) => {
                warn!("Page {}: OCR attempt {} failed — {}", page_num, attempt + 1, e);
                let permanent = matches!(e, ConvertError::OcrUnavailable { .. });
                all_timed_out &= matches!(e, ConvertError::Timeout { .. });
                last_err = Some(e);
                if permanent {
                    break;
                }
            }
        }
    }

    let error = if all_timed_out {
        PageError::Timeout {
            page: page_num,
            secs: config.ocr_timeout_secs,
        }
    } else {
        PageError::OcrFailed {
            page: page_num,
            retries: attempts_made,
            detail: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    };
    PageResult::failed(page_num, attempts_made, error)
}

/// Rasterise `pdf_path` and recognise every page, in page order.
///
/// # Errors
/// - the document cannot be rasterised at all (`OcrFailed` / `Timeout`)
/// - `lane` is still held by an abandoned call (`BackendBusy`)
/// - it has no pages, or every page failed (`OcrFailed`)
/// - the batch was cancelled between pages (`Cancelled`)
pub async fn rasterize_and_recognize(
    rasterizer: &Arc<dyn PageRasterizer>,
    engine: &Arc<dyn OcrEngine>,
    lane: &BlockingLane,
    pdf_path: &Path,
    config: &ConversionConfig,
    cancel: &CancellationFlag,
) -> Result<Vec<PageResult>, ConvertError> {
    let rasterizer = Arc::clone(rasterizer);
    let path = pdf_path.to_path_buf();
    let rendered = lane
        .run("rasterisation", config.ocr_timeout_secs, move || {
            rasterizer.rasterize(&path)
        })
        .await
        .map_err(|e| match e {
            ConvertError::Timeout { .. }
            | ConvertError::BackendBusy { .. }
            | ConvertError::OcrFailed { .. } => e,
            other => ConvertError::OcrFailed {
                detail: other.to_string(),
            },
        })?;

    let total = rendered.len();
    info!("OCR: {} pages via {}", total, engine.name());

    let mut pages = Vec::with_capacity(total);
    for (idx, page) in rendered.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        let page_num = idx + 1;
        let result = match page {
            Ok(image) => recognize_page(engine, page_num, Arc::new(image), config).await,
            Err(render_err) => {
                warn!("{}", render_err);
                PageResult::failed(page_num, 0, render_err)
            }
        };
        pages.push(result);
    }

    if pages.is_empty() {
        return Err(ConvertError::OcrFailed {
            detail: "document has no pages".to_string(),
        });
    }
    if pages.iter().all(|p| p.error.is_some()) {
        let first_error = pages
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_default();
        return Err(ConvertError::OcrFailed {
            detail: format!("all {} pages failed; first error: {}", pages.len(), first_error),
        });
    }

    let failed = pages.iter().filter(|p| p.error.is_some()).count();
    if failed > 0 {
        warn!("OCR: {}/{} pages failed and were replaced by their error", failed, total);
    }
    Ok(pages)
}

/// Concatenate page texts for plain-text output.
pub fn assemble_text(pages: &[PageResult], separator: &PageSeparator) -> String {
    let mut out = String::new();
    for page in pages {
        out.push_str(&separator.render(page.page_num));
        match &page.error {
            None => out.push_str(&page.text),
            Some(e) => out.push_str(&format!("[{}]", e)),
        }
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
