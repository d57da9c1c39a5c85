//! Structural conversion: rebuild a PDF's text layer as an editable DOCX.
//!
//! pdfium exposes every page object with its bounds. Text objects become
//! [`TextSpan`]s, which [`layout_page`] groups into lines (same baseline
//! within a tolerance) and lines into paragraphs (a vertical gap larger than
//! 1.5 line heights, or a change of left edge). Image objects are re-encoded
//! as PNG and placed between paragraphs by their vertical position.
//!
//! Tables, columns and floating frames are not reconstructed; their text
//! still comes through in reading order.
//!
//! Form XObjects (imported or stamped pages, `\includepdf` output) are walked
//! recursively; their children's bounds are mapped through the form matrix
//! into page space before layout.
//!
//! A document without any text object is rejected so the OCR tier gets a
//! chance; a scanned page would otherwise "succeed" as a DOCX of pictures.

use crate::error::ConvertError;
use crate::pipeline::docx::{DocxBuilder, Paragraph, Run};
use crate::pipeline::pdfium::{load_document, PdfiumLibrary};
use crate::pipeline::postprocess::is_blank;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

/// Converts a PDF file into DOCX bytes, preserving approximate layout.
pub trait StructuralConverter: Send + Sync {
    fn convert(&self, pdf_path: &Path) -> Result<Vec<u8>, ConvertError>;
}

/// One text object, in page coordinates measured from the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
}

impl TextSpan {
    /// A plain span from object-space `(left, bottom, right, top)` bounds,
    /// mapped to page space and measured from the top of the page.
    pub fn mapped(
        text: String,
        bounds: (f32, f32, f32, f32),
        font_size: f32,
        transform: &Transform,
        page_height: f32,
    ) -> Self {
        let (left, _, right, top) = transform.rect(bounds.0, bounds.1, bounds.2, bounds.3);
        Self {
            text,
            left,
            right,
            top: page_height - top,
            font_size: font_size * transform.scale(),
            bold: false,
            italic: false,
        }
    }
}

/// A laid-out paragraph and the vertical position of its first line.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedParagraph {
    pub top: f32,
    pub paragraph: Paragraph,
}

struct Line {
    top: f32,
    left: f32,
    font_size: f32,
    spans: Vec<TextSpan>,
}

impl Line {
    fn height(&self) -> f32 {
        self.font_size.max(1.0) * 1.2
    }
}

/// Group the spans of one page into positioned paragraphs, top to bottom.
pub fn layout_page(spans: &[TextSpan]) -> Vec<PlacedParagraph> {
    let mut spans: Vec<&TextSpan> = spans.iter().filter(|s| !s.text.is_empty()).collect();
    spans.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.left.total_cmp(&b.left)));

    let mut lines: Vec<Line> = Vec::new();
    for span in spans {
        match lines.last_mut() {
            Some(line) if (span.top - line.top).abs() <= (line.font_size * 0.5).max(2.0) => {
                line.left = line.left.min(span.left);
                line.font_size = line.font_size.max(span.font_size);
                line.spans.push(span.clone());
            }
            _ => lines.push(Line {
                top: span.top,
                left: span.left,
                font_size: span.font_size,
                spans: vec![span.clone()],
            }),
        }
    }

    for line in &mut lines {
        line.spans.sort_by(|a, b| a.left.total_cmp(&b.left));
    }

    let min_left = lines.iter().map(|l| l.left).fold(f32::INFINITY, f32::min);
    let mut paragraphs: Vec<PlacedParagraph> = Vec::new();
    let mut prev: Option<&Line> = None;

    for line in &lines {
        let gap = prev.map(|p| line.top - p.top);
        let starts_paragraph = match prev {
            None => true,
            Some(p) => {
                gap.unwrap_or(0.0) > p.height() * 1.5
                    || (line.left - p.left).abs() > p.font_size.max(line.font_size)
            }
        };

        if starts_paragraph {
            let space_before = match (prev, gap) {
                (Some(p), Some(g)) => (g - p.height()).max(0.0),
                _ => 0.0,
            };
            paragraphs.push(PlacedParagraph {
                top: line.top,
                paragraph: Paragraph {
                    runs: Vec::new(),
                    indent_pt: (line.left - min_left).max(0.0),
                    space_before_pt: space_before,
                },
            });
        } else if let Some(last) = paragraphs.last_mut() {
            join_with_space(&mut last.paragraph, &line.spans[0]);
        }

        if let Some(last) = paragraphs.last_mut() {
            push_line(&mut last.paragraph, line);
        }
        prev = Some(line);
    }

    paragraphs
}

fn push_line(paragraph: &mut Paragraph, line: &Line) {
    let mut prev_right: Option<f32> = None;
    for span in &line.spans {
        if let Some(right) = prev_right {
            let gap = span.left - right;
            let needs_space = gap > span.font_size.max(1.0) * 0.15
                && !span.text.starts_with(char::is_whitespace)
                && !paragraph.text().ends_with(char::is_whitespace);
            if needs_space {
                paragraph.push_run(styled(" ", span));
            }
        }
        paragraph.push_run(styled(&span.text, span));
        prev_right = Some(span.right);
    }
}

fn join_with_space(paragraph: &mut Paragraph, next: &TextSpan) {
    let text = paragraph.text();
    if text.ends_with('-') || text.ends_with(char::is_whitespace) {
        return;
    }
    paragraph.push_run(styled(" ", next));
}

fn styled(text: &str, span: &TextSpan) -> Run {
    Run {
        text: text.to_string(),
        bold: span.bold,
        italic: span.italic,
        size_pt: (span.font_size > 0.0).then_some(span.font_size),
    }
}

/// Infer bold/italic from a PostScript font name such as `Helvetica-BoldOblique`.
pub fn style_from_font_name(name: &str) -> (bool, bool) {
    let lower = name.to_lowercase();
    let bold = ["bold", "black", "heavy", "semibold", "demi"]
        .iter()
        .any(|k| lower.contains(k));
    let italic = ["italic", "oblique"].iter().any(|k| lower.contains(k));
    (bold, italic)
}

// ── pdfium implementation ───────────────────────────────────────────────────

/// pdfium-backed [`StructuralConverter`].
#[derive(Debug, Clone)]
pub struct PdfiumStructuralConverter {
    library: PdfiumLibrary,
}

impl PdfiumStructuralConverter {
    pub fn new(library: PdfiumLibrary) -> Self {
        Self { library }
    }
}

struct PlacedImage {
    top: f32,
    png: Vec<u8>,
    width: f32,
    height: f32,
}

/// Forms nested deeper than this are skipped.
const MAX_FORM_DEPTH: usize = 8;

/// Affine map `x' = a·x + c·y + e`, `y' = b·x + d·y + f` (PDF matrix order).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn from_matrix(m: &PdfMatrix) -> Self {
        Self {
            a: m.a(),
            b: m.b(),
            c: m.c(),
            d: m.d(),
            e: m.e(),
            f: m.f(),
        }
    }

    /// `self` followed by `outer`.
    pub fn then(self, outer: Transform) -> Transform {
        Transform {
            a: self.a * outer.a + self.b * outer.c,
            b: self.a * outer.b + self.b * outer.d,
            c: self.c * outer.a + self.d * outer.c,
            d: self.c * outer.b + self.d * outer.d,
            e: self.e * outer.a + self.f * outer.c + outer.e,
            f: self.e * outer.b + self.f * outer.d + outer.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Axis-aligned `(left, bottom, right, top)` of a mapped rectangle.
    pub fn rect(&self, left: f32, bottom: f32, right: f32, top: f32) -> (f32, f32, f32, f32) {
        let corners = [
            self.apply(left, bottom),
            self.apply(left, top),
            self.apply(right, bottom),
            self.apply(right, top),
        ];
        corners.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(l, b, r, t), &(x, y)| (l.min(x), b.min(y), r.max(x), t.max(y)),
        )
    }

    /// Uniform scale factor, used for font sizes.
    pub fn scale(&self) -> f32 {
        (self.a * self.d - self.b * self.c).abs().sqrt()
    }
}

/// Spans and images gathered from one page, forms included.
struct PageObjects {
    page_num: usize,
    page_height: f32,
    spans: Vec<TextSpan>,
    images: Vec<PlacedImage>,
}

impl PageObjects {
    fn new(page_num: usize, page_height: f32) -> Self {
        Self {
            page_num,
            page_height,
            spans: Vec::new(),
            images: Vec::new(),
        }
    }

    fn visit(&mut self, object: &PdfPageObject, transform: Transform, depth: usize) {
        if let Some(form) = object.as_x_object_form_object() {
            if depth >= MAX_FORM_DEPTH {
                warn!("Page {}: form nesting deeper than {}, skipped", self.page_num, MAX_FORM_DEPTH);
                return;
            }
            let inner = match form.matrix() {
                Ok(m) => Transform::from_matrix(&m).then(transform),
                Err(e) => {
                    debug!("Page {}: form without matrix ({:?})", self.page_num, e);
                    transform
                }
            };
            for i in 0..form.len() {
                match form.get(i) {
                    Ok(child) => self.visit(&child, inner, depth + 1),
                    Err(e) => debug!("Page {}: unreadable form child ({:?})", self.page_num, e),
                }
            }
            return;
        }

        let bounds = match object.bounds() {
            Ok(b) => b,
            Err(e) => {
                debug!("Page {}: skipping object without bounds ({:?})", self.page_num, e);
                return;
            }
        };
        let raw = (
            bounds.left().value,
            bounds.bottom().value,
            bounds.right().value,
            bounds.top().value,
        );

        if let Some(text_object) = object.as_text_object() {
            let text = text_object.text();
            if is_blank(&text) {
                return;
            }
            let size = text_object.scaled_font_size().value;
            let mut span = TextSpan::mapped(text, raw, size, &transform, self.page_height);
            (span.bold, span.italic) = style_from_font_name(&text_object.font().name());
            self.spans.push(span);
        } else if let Some(image_object) = object.as_image_object() {
            let (left, bottom, right, top) = transform.rect(raw.0, raw.1, raw.2, raw.3);
            match image_object.get_raw_image() {
                Ok(raw) => {
                    let mut png = Cursor::new(Vec::new());
                    let rgb = image::DynamicImage::ImageRgb8(raw.to_rgb8());
                    if let Err(e) = rgb.write_to(&mut png, ImageFormat::Png) {
                        warn!("Page {}: dropping image ({})", self.page_num, e);
                        return;
                    }
                    self.images.push(PlacedImage {
                        top: self.page_height - top,
                        png: png.into_inner(),
                        width: right - left,
                        height: top - bottom,
                    });
                }
                Err(e) => warn!("Page {}: unreadable image object ({:?})", self.page_num, e),
            }
        }
    }
}

fn failed(detail: impl Into<String>) -> ConvertError {
    ConvertError::StructuralConversionFailed {
        detail: detail.into(),
    }
}

impl StructuralConverter for PdfiumStructuralConverter {
    fn convert(&self, pdf_path: &Path) -> Result<Vec<u8>, ConvertError> {
        let pdfium = self.library.bind().map_err(|e| failed(e.to_string()))?;
        let document = load_document(&pdfium, pdf_path).map_err(failed)?;

        let pages = document.pages();
        let page_count = pages.len();
        if page_count == 0 {
            return Err(failed("document has no pages"));
        }

        let mut doc = DocxBuilder::new();
        let mut text_objects = 0usize;

        for (idx, page) in pages.iter().enumerate() {
            let page_height = page.height().value;
            doc.page_size(page.width().value, page_height);

            let mut objects = PageObjects::new(idx + 1, page_height);
            for object in page.objects().iter() {
                objects.visit(&object, Transform::IDENTITY, 0);
            }
            let PageObjects { spans, images, .. } = objects;

            text_objects += spans.len();
            let paragraphs = layout_page(&spans);
            debug!(
                "Page {}: {} spans → {} paragraphs, {} images",
                idx + 1,
                spans.len(),
                paragraphs.len(),
                images.len()
            );
            write_page(&mut doc, paragraphs, images);

            if idx + 1 < page_count as usize {
                doc.page_break();
            }
        }

        if text_objects == 0 {
            return Err(failed("no extractable text layer"));
        }

        info!(
            "Structural conversion: {} pages, {} text objects",
            page_count, text_objects
        );
        doc.finish().map_err(|e| failed(e.to_string()))
    }
}

/// Interleave paragraphs and images by vertical position.
fn write_page(doc: &mut DocxBuilder, paragraphs: Vec<PlacedParagraph>, mut images: Vec<PlacedImage>) {
    images.sort_by(|a, b| a.top.total_cmp(&b.top));
    let mut images = images.into_iter().peekable();

    for placed in paragraphs {
        while let Some(image) = images.next_if(|i| i.top <= placed.top) {
            doc.image(image.png, image.width, image.height);
        }
        doc.paragraph(&placed.paragraph);
    }
    for image in images {
        doc.image(image.png, image.width, image.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(text: &str, left: f32, top: f32, size: f32) -> TextSpan {
        TextSpan {
            text: text.to_string(),
            left,
            right: left + text.len() as f32 * size * 0.5,
            top,
            font_size: size,
            bold: false,
            italic: false,
        }
    }

    #[test]
    fn spans_on_one_baseline_form_a_line() {
        let paras = layout_page(&[
            span("world", 110.0, 72.5, 12.0),
            span("Hello", 72.0, 72.0, 12.0),
        ]);
        assert_eq!(paras.len(), 1);
        assert_eq!(paras[0].paragraph.text(), "Hello world");
    }

    #[test]
    fn consecutive_lines_join_into_one_paragraph() {
        let paras = layout_page(&[
            span("first line", 72.0, 100.0, 12.0),
            span("second line", 72.0, 114.0, 12.0),
        ]);
        assert_eq!(paras.len(), 1);
        assert_eq!(paras[0].paragraph.text(), "first line second line");
    }

    #[test]
    fn large_gap_starts_new_paragraph_with_space_before() {
        let paras = layout_page(&[
            span("one", 72.0, 100.0, 12.0),
            span("two", 72.0, 150.0, 12.0),
        ]);
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[1].paragraph.text(), "two");
        // 50pt gap minus a 14.4pt line height
        assert!((paras[1].paragraph.space_before_pt - 35.6).abs() < 0.01);
    }

    #[test]
    fn indent_is_relative_to_leftmost_line() {
        let paras = layout_page(&[
            span("body", 72.0, 100.0, 12.0),
            span("quote", 108.0, 114.0, 12.0),
        ]);
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].paragraph.indent_pt, 0.0);
        assert_eq!(paras[1].paragraph.indent_pt, 36.0);
    }

    #[test]
    fn hyphenated_line_end_joins_without_space() {
        let paras = layout_page(&[
            span("conver-", 72.0, 100.0, 12.0),
            span("sion", 72.0, 114.0, 12.0),
        ]);
        assert_eq!(paras[0].paragraph.text(), "conver-sion");
    }

    #[test]
    fn styles_become_separate_runs() {
        let mut bold = span("Title", 72.0, 72.0, 18.0);
        bold.bold = true;
        let paras = layout_page(&[bold, span("text", 72.0, 120.0, 12.0)]);
        assert_eq!(paras.len(), 2);
        let title = &paras[0].paragraph.runs[0];
        assert!(title.bold);
        assert_eq!(title.size_pt, Some(18.0));
        assert!(!paras[1].paragraph.runs[0].bold);
    }

    #[test]
    fn empty_page_has_no_paragraphs() {
        assert!(layout_page(&[]).is_empty());
    }

    #[test]
    fn font_names_map_to_styles() {
        assert_eq!(style_from_font_name("Helvetica"), (false, false));
        assert_eq!(style_from_font_name("Helvetica-BoldOblique"), (true, true));
        assert_eq!(style_from_font_name("ABCDEF+TimesNewRoman,Italic"), (false, true));
        assert_eq!(style_from_font_name("Arial-Black"), (true, false));
    }

    #[test]
    fn images_are_placed_between_paragraphs() {
        let mut doc = DocxBuilder::new();
        let paragraphs = layout_page(&[
            span("above", 72.0, 100.0, 12.0),
            span("below", 72.0, 400.0, 12.0),
        ]);
        let images = vec![PlacedImage {
            top: 200.0,
            png: vec![1, 2, 3],
            width: 100.0,
            height: 100.0,
        }];
        write_page(&mut doc, paragraphs, images);
        let bytes = doc.finish().unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        std::io::Read::read_to_string(
            &mut archive.by_name("word/document.xml").unwrap(),
            &mut xml,
        )
        .unwrap();
        let above = xml.find("above").unwrap();
        let drawing = xml.find("<w:drawing>").unwrap();
        let below = xml.find("below").unwrap();
        assert!(above < drawing && drawing < below);
    }

    fn translate(e: f32, f: f32) -> Transform {
        Transform { e, f, ..Transform::IDENTITY }
    }

    fn scale(k: f32) -> Transform {
        Transform { a: k, d: k, ..Transform::IDENTITY }
    }

    #[test]
    fn nested_transforms_compose_inner_first() {
        let inner = translate(10.0, 20.0);
        let outer = scale(0.5).then(translate(72.0, 400.0));
        let both = inner.then(outer);
        let (x, y) = both.apply(4.0, 6.0);
        let (ex, ey) = outer.apply(inner.apply(4.0, 6.0).0, inner.apply(4.0, 6.0).1);
        assert!((x - ex).abs() < 1e-4 && (y - ey).abs() < 1e-4);
        assert_eq!((x, y), (79.0, 413.0));
        assert!((both.scale() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rotated_rect_stays_axis_aligned() {
        // 90° rotation: (x, y) → (-y, x)
        let rotate = Transform { a: 0.0, b: 1.0, c: -1.0, d: 0.0, e: 0.0, f: 0.0 };
        assert_eq!(rotate.rect(0.0, 0.0, 10.0, 2.0), (-2.0, 0.0, 0.0, 10.0));
    }

    #[test]
    fn form_text_lays_out_with_page_text() {
        // An imported page drawn at half size, its origin at (72, 500).
        let form = scale(0.5).then(translate(72.0, 500.0));
        let imported = TextSpan::mapped("Imported".into(), (0.0, 0.0, 100.0, 24.0), 24.0, &form, 842.0);
        assert_eq!(imported.left, 72.0);
        assert_eq!(imported.right, 122.0);
        assert_eq!(imported.top, 330.0);
        assert_eq!(imported.font_size, 12.0);

        let heading = TextSpan::mapped(
            "Heading".into(),
            (72.0, 514.0, 130.0, 526.0),
            12.0,
            &Transform::IDENTITY,
            842.0,
        );
        let paras = layout_page(&[imported, heading]);
        assert_eq!(paras.len(), 1);
        assert_eq!(paras[0].paragraph.text(), "Heading Imported");
        assert_eq!(paras[0].top, 316.0);
    }
}
