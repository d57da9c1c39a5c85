//! Configuration types for PDF/image conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across tasks, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! There is no configuration file: the only environment-level surface is
//! where pdfium and tesseract live, and the CLI maps its flags (and their
//! `PDF2DOCX_*` environment variables) onto the builder.

use crate::error::ConvertError;
use crate::progress::ProgressSink;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a conversion batch.
///
/// # Example
/// ```rust
/// use edgequake_pdf2docx::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .render_dpi(300)
///     .ocr_language("eng+deu")
///     .ocr_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// DPI used when rasterising PDF pages for OCR. Range: 72–600. Default: 200.
    ///
    /// Tesseract is tuned for text around 300 DPI; 200 keeps memory and time
    /// moderate while staying readable for body-size fonts.
    pub render_dpi: u32,

    /// Cap on the rendered width or height in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Resolution assumed when an image is placed on a PDF page. Default: 100.
    ///
    /// A 1000 px wide screenshot becomes a 720 pt (10 in) wide page.
    pub image_dpi: f32,

    /// Tesseract language string (`-l`). Default: "eng".
    pub ocr_language: String,

    /// Tesseract executable. Default: "tesseract" (resolved on `PATH`).
    pub tesseract_path: PathBuf,

    /// Explicit pdfium library file or directory. Default: system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// Retries per OCR engine call after the first attempt. Default: 2.
    pub ocr_max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 250.
    pub retry_backoff_ms: u64,

    /// Timeout for one OCR engine call or one rasterisation. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Timeout for structural conversion, normalisation and text extraction. Default: 300.
    pub structural_timeout_secs: u64,

    /// Separator between pages in plain-text output.
    pub page_separator: PageSeparator,

    /// Receives per-file progress notifications from the batch.
    pub progress_sink: Option<Arc<dyn ProgressSink>>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            render_dpi: 200,
            max_rendered_pixels: 4000,
            image_dpi: 100.0,
            ocr_language: "eng".to_string(),
            tesseract_path: PathBuf::from("tesseract"),
            pdfium_library_path: None,
            ocr_max_retries: 2,
            retry_backoff_ms: 250,
            ocr_timeout_secs: 120,
            structural_timeout_secs: 300,
            page_separator: PageSeparator::default(),
            progress_sink: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("render_dpi", &self.render_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("image_dpi", &self.image_dpi)
            .field("ocr_language", &self.ocr_language)
            .field("tesseract_path", &self.tesseract_path)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("ocr_max_retries", &self.ocr_max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("structural_timeout_secs", &self.structural_timeout_secs)
            .field("page_separator", &self.page_separator)
            .field(
                "progress_sink",
                &self.progress_sink.as_ref().map(|_| "<dyn ProgressSink>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn image_dpi(mut self, dpi: f32) -> Self {
        self.config.image_dpi = dpi;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn ocr_max_retries(mut self, n: u32) -> Self {
        self.config.ocr_max_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs.max(1);
        self
    }

    pub fn structural_timeout_secs(mut self, secs: u64) -> Self {
        self.config.structural_timeout_secs = secs.max(1);
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.config.progress_sink = Some(sink);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if !(c.image_dpi.is_finite() && c.image_dpi >= 10.0) {
            return Err(ConvertError::InvalidConfig(format!(
                "image DPI must be ≥ 10, got {}",
                c.image_dpi
            )));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which artefact each input is converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// Editable word-processing document (`.docx`). (default)
    #[default]
    Document,
    /// Plain UTF-8 text (`.txt`).
    PlainText,
}

impl OutputKind {
    /// File extension of the produced artefact, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputKind::Document => "docx",
            OutputKind::PlainText => "txt",
        }
    }

    /// MIME type offered to the download boundary.
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputKind::Document => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputKind::PlainText => "text/plain; charset=utf-8",
        }
    }
}

/// How to separate pages in plain-text output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Heading line per page: "--- Page N ---". (default)
    #[default]
    Heading,
    /// Blank line only.
    Blank,
    /// ASCII form feed, the traditional page break in text files.
    FormFeed,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the text placed before page `page_num` (1-indexed).
    ///
    /// The heading style also labels the first page; the others only
    /// separate, so they render nothing before page 1.
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::Heading if page_num == 1 => format!("--- Page {} ---\n\n", page_num),
            PageSeparator::Heading => format!("\n\n--- Page {} ---\n\n", page_num),
            _ if page_num == 1 => String::new(),
            PageSeparator::Blank => "\n\n".to_string(),
            PageSeparator::FormFeed => "\n\u{000C}\n".to_string(),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_values() {
        let c = ConversionConfig::builder()
            .render_dpi(10)
            .max_rendered_pixels(5)
            .ocr_timeout_secs(0)
            .structural_timeout_secs(0)
            .ocr_max_retries(99)
            .build()
            .unwrap();
        assert_eq!(c.render_dpi, 72);
        assert_eq!(c.max_rendered_pixels, 100);
        assert_eq!(c.ocr_timeout_secs, 1);
        assert_eq!(c.structural_timeout_secs, 1);
        assert_eq!(c.ocr_max_retries, 10);
    }

    #[test]
    fn builder_rejects_bad_image_dpi() {
        let err = ConversionConfig::builder().image_dpi(0.0).build().unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_empty_language() {
        let err = ConversionConfig::builder().ocr_language("  ").build().unwrap_err();
        assert!(err.to_string().contains("language"));
    }

    #[test]
    fn output_kind_extensions() {
        assert_eq!(OutputKind::Document.extension(), "docx");
        assert_eq!(OutputKind::PlainText.extension(), "txt");
        assert!(OutputKind::Document.mime_type().contains("wordprocessingml"));
    }

    #[test]
    fn separator_rendering() {
        assert_eq!(PageSeparator::Heading.render(1), "--- Page 1 ---\n\n");
        assert_eq!(PageSeparator::Heading.render(2), "\n\n--- Page 2 ---\n\n");
        assert_eq!(PageSeparator::Blank.render(1), "");
        assert_eq!(PageSeparator::Blank.render(3), "\n\n");
        assert_eq!(PageSeparator::FormFeed.render(2), "\n\u{000C}\n");
        assert_eq!(PageSeparator::Custom("***".into()).render(2), "\n\n***\n\n");
    }

    #[test]
    fn debug_hides_sink() {
        let dbg = format!("{:?}", ConversionConfig::default());
        assert!(dbg.contains("render_dpi"));
        assert!(dbg.contains("progress_sink: None"));
    }
}
