//! pdfium binding shared by every pdfium-backed stage.
//!
//! Each blocking call binds its own [`Pdfium`] instance, the same way the
//! renderer always has: the `thread_safe` feature serialises access to the
//! library internally, and a binding never outlives the blocking task that
//! created it.
//!
//! That internal lock is process-wide and held for the life of a binding, so
//! every pdfium stage goes through [`lane`]: once a call is abandoned on
//! timeout, later pdfium stages fail fast until it returns.

use crate::error::ConvertError;
use crate::pipeline::BlockingLane;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

static PDFIUM_LANE: Lazy<BlockingLane> = Lazy::new(|| BlockingLane::new("pdfium"));

/// The process-wide lane shared by every pdfium-backed stage.
pub fn lane() -> BlockingLane {
    PDFIUM_LANE.clone()
}

/// Where to find the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumLibrary {
    /// A library file, or a directory containing the platform library.
    /// `None` uses the system library search path.
    path: Option<PathBuf>,
}

impl PdfiumLibrary {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Bind to the library.
    pub fn bind(&self) -> Result<Pdfium, ConvertError> {
        let bindings = match &self.path {
            Some(p) if p.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(p))
            }
            Some(p) => Pdfium::bind_to_library(p),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ConvertError::PdfiumBindingFailed(format!("{:?}", e)))?;

        debug!("Bound pdfium library ({:?})", self.path);
        Ok(Pdfium::new(bindings))
    }

    /// `true` if the library can be bound right now.
    pub fn is_available(&self) -> bool {
        self.bind().is_ok()
    }
}

/// Open a PDF, classifying the failure the way the user needs to read it.
pub fn load_document<'a>(pdfium: &'a Pdfium, pdf_path: &Path) -> Result<PdfDocument<'a>, String> {
    pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            format!(
                "'{}' is encrypted and requires a password",
                pdf_path.display()
            )
        } else {
            format!("'{}' could not be opened: {}", pdf_path.display(), err_str)
        }
    })
}
