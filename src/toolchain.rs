//! The set of conversion backends a pipeline runs with.
//!
//! [`Toolchain::detect`] builds the pdfium/tesseract defaults and probes the
//! OCR side exactly once. A missing tesseract or pdfium does not fail
//! startup: OCR is recorded as [`OcrAvailability::Unavailable`] and every
//! fallback attempt short-circuits with that reason.
//!
//! Tests build a `Toolchain` directly from fakes via [`Toolchain::new`],
//! which gives the toolchain a private [`BlockingLane`]; `detect` shares the
//! process-wide pdfium lane instead.

use crate::config::ConversionConfig;
use crate::pipeline::extract::{DirectTextExtractor, PdfiumTextExtractor};
use crate::pipeline::normalize::{ImageNormalizer, PdfiumImageNormalizer};
use crate::pipeline::ocr::{OcrEngine, TesseractEngine};
use crate::pipeline::pdfium::{self, PdfiumLibrary};
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::structural::{PdfiumStructuralConverter, StructuralConverter};
use crate::pipeline::BlockingLane;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Whether the OCR fallback can run, decided once per process.
#[derive(Clone)]
pub enum OcrAvailability {
    Available {
        rasterizer: Arc<dyn PageRasterizer>,
        engine: Arc<dyn OcrEngine>,
    },
    Unavailable {
        /// Human-readable reason, including an installation hint.
        reason: String,
    },
}

impl OcrAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, OcrAvailability::Available { .. })
    }
}

impl fmt::Debug for OcrAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrAvailability::Available { engine, .. } => f
                .debug_struct("Available")
                .field("engine", &engine.name())
                .finish_non_exhaustive(),
            OcrAvailability::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Injected strategies for every tier of the pipeline.
#[derive(Clone)]
pub struct Toolchain {
    pub normalizer: Arc<dyn ImageNormalizer>,
    pub structural: Arc<dyn StructuralConverter>,
    pub text: Arc<dyn DirectTextExtractor>,
    pub ocr: OcrAvailability,
    /// Guards normalisation, structural conversion, extraction and rasterisation.
    pub pdfium_lane: BlockingLane,
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolchain")
            .field("ocr", &self.ocr)
            .field("pdfium_lane", &self.pdfium_lane)
            .finish_non_exhaustive()
    }
}

impl Toolchain {
    pub fn new(
        normalizer: Arc<dyn ImageNormalizer>,
        structural: Arc<dyn StructuralConverter>,
        text: Arc<dyn DirectTextExtractor>,
        ocr: OcrAvailability,
    ) -> Self {
        Self {
            normalizer,
            structural,
            text,
            ocr,
            pdfium_lane: BlockingLane::new("pdfium"),
        }
    }

    /// Build the pdfium + tesseract toolchain and probe OCR availability.
    pub fn detect(config: &ConversionConfig) -> Self {
        let library = PdfiumLibrary::new(config.pdfium_library_path.clone());
        let pdfium_ok = library.is_available();
        if !pdfium_ok {
            warn!("pdfium library not found; PDF conversion will fail until it is installed");
        }

        let engine = TesseractEngine::new(config);
        let ocr = match (pdfium_ok, engine.probe()) {
            (true, Ok(())) => {
                info!(
                    "OCR available: {} ({})",
                    engine.name(),
                    config.ocr_language
                );
                OcrAvailability::Available {
                    rasterizer: Arc::new(PdfiumRasterizer::new(library.clone(), config)),
                    engine: Arc::new(engine),
                }
            }
            (false, _) => OcrAvailability::Unavailable {
                reason: "pdfium is required to rasterise pages. \
                         Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide"
                    .to_string(),
            },
            (true, Err(reason)) => OcrAvailability::Unavailable { reason },
        };
        if let OcrAvailability::Unavailable { reason } = &ocr {
            warn!("OCR fallback disabled: {}", reason);
        }

        Self {
            normalizer: Arc::new(PdfiumImageNormalizer::new(library.clone(), config)),
            structural: Arc::new(PdfiumStructuralConverter::new(library.clone())),
            text: Arc::new(PdfiumTextExtractor::new(library)),
            ocr,
            pdfium_lane: pdfium::lane(),
        }
    }
}
