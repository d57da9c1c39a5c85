//! Error types for the edgequake-pdf2docx library.
//!
//! Three levels, from widest to narrowest:
//!
//! * [`ConvertError`] — a single **file** could not be converted by a tier
//!   (or at all). Carried inside [`crate::output::ConversionOutcome::Failure`]
//!   and never propagated past [`crate::batch::BatchOrchestrator`].
//!
//! * [`PageError`] — a single **page** failed during OCR. Stored inside
//!   [`crate::pipeline::ocr::PageResult`] so the remaining pages survive.
//!
//! * [`OcrError`] — what an [`crate::pipeline::ocr::OcrEngine`] returns for
//!   one recognition call; the retry loop maps it to a `PageError`.

use thiserror::Error;

/// Every way the conversion of one file can fail.
///
/// All payloads are owned strings so outcomes can be cloned, logged and
/// serialised without borrowing from the failing component.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The file extension is not one of pdf, png, jpg, jpeg.
    #[error("unsupported type: '{extension}' (expected pdf, png, jpg or jpeg)")]
    UnsupportedType { extension: String },

    /// The bytes of an image input could not be decoded as PNG or JPEG.
    #[error("image could not be decoded: {detail}")]
    ImageDecodeFailed { detail: String },

    /// The input could not be written to the batch working directory.
    #[error("failed to stage '{file}' in the temp directory: {detail}")]
    Staging { file: String, detail: String },

    // ── Strategy errors ───────────────────────────────────────────────────
    /// Layout-preserving conversion failed (encrypted, corrupt, no text layer…).
    #[error("structural conversion failed: {detail}")]
    StructuralConversionFailed { detail: String },

    /// Embedded-text extraction failed.
    #[error("text extraction failed: {detail}")]
    DirectExtractionFailed { detail: String },

    /// Tesseract or the rasteriser was not found when the toolchain was probed.
    #[error("OCR not available: {reason}")]
    OcrUnavailable { reason: String },

    /// OCR ran but produced nothing usable (every page failed, no pages…).
    #[error("OCR failed: {detail}")]
    OcrFailed { detail: String },

    /// A blocking call exceeded its configured timeout.
    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: String, secs: u64 },

    /// An earlier call that timed out still holds the backend.
    #[error("{stage} skipped: {backend} is still busy with a call that timed out")]
    BackendBusy { stage: String, backend: String },

    /// The batch was cancelled before this file finished.
    #[error("cancelled before conversion finished")]
    Cancelled,

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not write a DOCX package or the ZIP archive.
    #[error("failed to write archive: {detail}")]
    Archive { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// A panic or other fault nobody anticipated.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<zip::result::ZipError> for ConvertError {
    fn from(e: zip::result::ZipError) -> Self {
        ConvertError::Archive {
            detail: e.to_string(),
        }
    }
}

/// A non-fatal error for a single OCR page.
///
/// The page's content is replaced by this error's text in the assembled
/// output; the document only fails if every page fails.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// OCR call failed after retries.
    #[error("Page {page}: OCR failed after {retries} retries: {detail}")]
    OcrFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// OCR call timed out on every attempt.
    #[error("Page {page}: OCR timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}

/// Errors from an OCR engine call.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    NotAvailable(String),

    #[error("OCR engine failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_display() {
        let e = ConvertError::UnsupportedType {
            extension: "rtf".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("unsupported type"), "got: {msg}");
        assert!(msg.contains("rtf"));
    }

    #[test]
    fn ocr_unavailable_display() {
        let e = ConvertError::OcrUnavailable {
            reason: "tesseract not found".into(),
        };
        assert_eq!(e.to_string(), "OCR not available: tesseract not found");
    }

    #[test]
    fn timeout_display() {
        let e = ConvertError::Timeout {
            stage: "structural conversion".into(),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
        assert!(e.to_string().contains("structural"));
    }

    #[test]
    fn backend_busy_display() {
        let e = ConvertError::BackendBusy {
            stage: "rasterisation".into(),
            backend: "pdfium".into(),
        };
        assert_eq!(
            e.to_string(),
            "rasterisation skipped: pdfium is still busy with a call that timed out"
        );
    }

    #[test]
    fn unexpected_display() {
        let e = ConvertError::Unexpected("task panicked".into());
        assert!(e.to_string().starts_with("unexpected error"));
    }

    #[test]
    fn page_error_display() {
        let e = PageError::OcrFailed {
            page: 3,
            retries: 2,
            detail: "exit status 1".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 3"));
        assert!(msg.contains("2 retries"));
    }
}
