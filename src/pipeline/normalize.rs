//! Image normalisation: turn a PNG/JPEG upload into a one-page PDF.
//!
//! Everything downstream (structural conversion, rasterisation, OCR) speaks
//! PDF, so an image is decoded, flattened to 8-bit RGB and placed on a page
//! whose size follows from the pixel dimensions at `image_dpi`.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::pipeline::pdfium::PdfiumLibrary;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use tracing::debug;

/// Converts raster image bytes into the bytes of a single-page PDF.
pub trait ImageNormalizer: Send + Sync {
    fn to_single_page_pdf(&self, image_bytes: &[u8]) -> Result<Vec<u8>, ConvertError>;
}

/// Decode PNG or JPEG bytes and force 8-bit RGB.
///
/// RGBA, palette, grey+alpha and 16-bit inputs all come out as `Rgb8`; alpha
/// is dropped rather than composited.
pub fn decode_rgb(bytes: &[u8]) -> Result<DynamicImage, ConvertError> {
    let format = image::guess_format(bytes).map_err(|e| ConvertError::ImageDecodeFailed {
        detail: e.to_string(),
    })?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(ConvertError::ImageDecodeFailed {
            detail: format!("{:?} is not a PNG or JPEG image", format),
        });
    }

    let decoded = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        ConvertError::ImageDecodeFailed {
            detail: e.to_string(),
        }
    })?;
    debug!(
        "Decoded {:?} image {}x{} ({:?})",
        format,
        decoded.width(),
        decoded.height(),
        decoded.color()
    );
    Ok(DynamicImage::ImageRgb8(decoded.to_rgb8()))
}

/// Page size in points for an image of `width_px × height_px` at `dpi`.
pub fn page_size_points(width_px: u32, height_px: u32, dpi: f32) -> (f32, f32) {
    (
        width_px as f32 * 72.0 / dpi,
        height_px as f32 * 72.0 / dpi,
    )
}

/// pdfium-backed [`ImageNormalizer`].
#[derive(Debug, Clone)]
pub struct PdfiumImageNormalizer {
    library: PdfiumLibrary,
    image_dpi: f32,
}

impl PdfiumImageNormalizer {
    pub fn new(library: PdfiumLibrary, config: &ConversionConfig) -> Self {
        Self {
            library,
            image_dpi: config.image_dpi,
        }
    }
}

impl ImageNormalizer for PdfiumImageNormalizer {
    fn to_single_page_pdf(&self, image_bytes: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let image = decode_rgb(image_bytes)?;
        let (width, height) = page_size_points(image.width(), image.height(), self.image_dpi);

        let pdfium = self.library.bind()?;
        let to_err = |e: PdfiumError| ConvertError::ImageDecodeFailed {
            detail: format!("could not build PDF page: {:?}", e),
        };

        let mut document = pdfium.create_new_pdf().map_err(to_err)?;
        {
            let mut page = document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::Custom(
                    PdfPoints::new(width),
                    PdfPoints::new(height),
                ))
                .map_err(to_err)?;
            page.objects_mut()
                .create_image_object(
                    PdfPoints::ZERO,
                    PdfPoints::ZERO,
                    &image,
                    Some(PdfPoints::new(width)),
                    Some(PdfPoints::new(height)),
                )
                .map_err(to_err)?;
        }

        let bytes = document.save_to_bytes().map_err(to_err)?;
        debug!(
            "Normalised {}x{} px image to a {:.0}x{:.0} pt page ({} bytes)",
            image.width(),
            image.height(),
            width,
            height,
            bytes.len()
        );
        Ok(bytes)
    }
}
