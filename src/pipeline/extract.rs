//! Direct text extraction: read the embedded text layer, page by page.
//!
//! No rasterisation happens here. A scanned PDF simply yields blank pages,
//! which the caller treats as the signal to fall back to OCR.

use crate::error::ConvertError;
use crate::pipeline::pdfium::{load_document, PdfiumLibrary};
use std::path::Path;
use tracing::debug;

/// Extracts the embedded text of each page, in page order.
pub trait DirectTextExtractor: Send + Sync {
    fn extract(&self, pdf_path: &Path) -> Result<Vec<String>, ConvertError>;
}

/// pdfium-backed [`DirectTextExtractor`].
#[derive(Debug, Clone)]
pub struct PdfiumTextExtractor {
    library: PdfiumLibrary,
}

impl PdfiumTextExtractor {
    pub fn new(library: PdfiumLibrary) -> Self {
        Self { library }
    }
}

impl DirectTextExtractor for PdfiumTextExtractor {
    fn extract(&self, pdf_path: &Path) -> Result<Vec<String>, ConvertError> {
        let pdfium = self.library.bind()?;
        let document = load_document(&pdfium, pdf_path)
            .map_err(|detail| ConvertError::DirectExtractionFailed { detail })?;

        let mut pages = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| ConvertError::DirectExtractionFailed {
                    detail: format!("page {}: {:?}", idx + 1, e),
                })?
                .all();
            debug!("Page {}: {} chars of embedded text", idx + 1, text.len());
            pages.push(text);
        }
        Ok(pages)
    }
}

/// Join extracted pages into one text, one blank line between pages.
///
/// Returns `None` when nothing visible was extracted.
pub fn join_pages(pages: &[String]) -> Option<String> {
    let joined = pages
        .iter()
        .map(|p| p.replace("\r\n", "\n").replace('\r', "\n"))
        .map(|p| p.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n\n");
    if crate::pipeline::postprocess::is_blank(&joined) {
        None
    } else {
        Some(format!("{}\n", joined.trim_matches('\n')))
    }
}
