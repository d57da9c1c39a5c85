//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 200 DPI would produce a
//! 6,600 × 9,300 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory bounded while ordinary pages
//! render at the requested DPI.
//!
//! A page that fails to render becomes a [`PageError`] in its slot instead
//! of aborting the document; only a document that cannot be opened at all
//! is an error.

use crate::config::ConversionConfig;
use crate::error::{ConvertError, PageError};
use crate::pipeline::pdfium::{load_document, PdfiumLibrary};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Turns a paginated document into page images, in page order.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf_path: &Path)
        -> Result<Vec<Result<DynamicImage, PageError>>, ConvertError>;
}

/// pdfium-backed [`PageRasterizer`].
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    library: PdfiumLibrary,
    dpi: u32,
    max_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(library: PdfiumLibrary, config: &ConversionConfig) -> Self {
        Self {
            library,
            dpi: config.render_dpi,
            max_pixels: config.max_rendered_pixels,
        }
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        pdf_path: &Path,
    ) -> Result<Vec<Result<DynamicImage, PageError>>, ConvertError> {
        let pdfium = self.library.bind()?;
        let document = load_document(&pdfium, pdf_path)
            .map_err(|detail| ConvertError::OcrFailed { detail })?;

        let pages = document.pages();
        info!("Rasterising {} pages at {} DPI", pages.len(), self.dpi);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut results = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let rendered = page
                .render_with_config(&render_config)
                .map(|bitmap| bitmap.as_image())
                .map_err(|e| PageError::RenderFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                });

            if let Ok(image) = &rendered {
                debug!(
                    "Rendered page {} → {}x{} px",
                    idx + 1,
                    image.width(),
                    image.height()
                );
            }
            results.push(rendered);
        }

        Ok(results)
    }
}
