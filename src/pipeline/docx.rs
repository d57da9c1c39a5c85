//! Minimal WordprocessingML (DOCX) writer.
//!
//! A `.docx` file is a ZIP package of XML parts. We only emit what Word,
//! LibreOffice and Google Docs need to open an editable document:
//!
//! ```text
//! [Content_Types].xml
//! _rels/.rels
//! word/document.xml
//! word/_rels/document.xml.rels
//! word/media/imageN.png
//! ```
//!
//! Paragraphs carry runs (bold / italic / size), a left indent and space
//! before, which is all the structural converter needs to approximate the
//! source layout. Text is XML-escaped and stripped of characters XML 1.0
//! cannot carry.

use crate::error::ConvertError;
use crate::pipeline::ocr::PageResult;
use crate::pipeline::postprocess::split_paragraphs;
use quick_xml::escape::escape;
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Twentieths of a point, the unit of most WordprocessingML measures.
const TWIPS_PER_POINT: f32 = 20.0;
/// English Metric Units per point, used by DrawingML extents.
const EMU_PER_POINT: f32 = 12_700.0;
/// US Letter, the page size used when nothing else is known.
const DEFAULT_PAGE_SIZE_PT: (f32, f32) = (612.0, 792.0);
/// One-inch margins.
const PAGE_MARGIN_TWIPS: u32 = 1440;

const NS_DECLS: &str = concat!(
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#,
);

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// A run of uniformly formatted text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    /// Font size in points; `None` inherits the document default.
    pub size_pt: Option<f32>,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Same formatting, ignoring text.
    pub fn same_style(&self, other: &Run) -> bool {
        self.bold == other.bold
            && self.italic == other.italic
            && self.size_pt.map(|s| (s * 2.0).round()) == other.size_pt.map(|s| (s * 2.0).round())
    }
}

/// A paragraph with approximate positioning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    pub runs: Vec<Run>,
    pub indent_pt: f32,
    pub space_before_pt: f32,
}

impl Paragraph {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            runs: vec![Run::plain(text)],
            ..Default::default()
        }
    }

    /// Concatenated text of all runs.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Append a run, merging it into the previous one when styles match.
    pub fn push_run(&mut self, run: Run) {
        if let Some(last) = self.runs.last_mut() {
            if last.same_style(&run) {
                last.text.push_str(&run.text);
                return;
            }
        }
        self.runs.push(run);
    }
}

/// Incrementally builds a DOCX package.
#[derive(Debug, Default)]
pub struct DocxBuilder {
    body: String,
    media: Vec<Vec<u8>>,
    page_size_pt: Option<(f32, f32)>,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the section page size in points (first call wins).
    pub fn page_size(&mut self, width_pt: f32, height_pt: f32) -> &mut Self {
        if self.page_size_pt.is_none() && width_pt > 0.0 && height_pt > 0.0 {
            self.page_size_pt = Some((width_pt, height_pt));
        }
        self
    }

    pub fn paragraph(&mut self, paragraph: &Paragraph) -> &mut Self {
        self.body.push_str("<w:p>");
        let indent = to_twips(paragraph.indent_pt);
        let before = to_twips(paragraph.space_before_pt);
        if indent > 0 || before > 0 {
            self.body.push_str("<w:pPr>");
            if before > 0 {
                let _ = write!(self.body, r#"<w:spacing w:before="{before}"/>"#);
            }
            if indent > 0 {
                let _ = write!(self.body, r#"<w:ind w:left="{indent}"/>"#);
            }
            self.body.push_str("</w:pPr>");
        }
        for run in &paragraph.runs {
            write_run(&mut self.body, run);
        }
        self.body.push_str("</w:p>");
        self
    }

    /// Shorthand for an unformatted paragraph.
    pub fn text_paragraph(&mut self, text: &str) -> &mut Self {
        self.paragraph(&Paragraph::plain(text))
    }

    pub fn page_break(&mut self) -> &mut Self {
        self.body
            .push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
        self
    }

    /// Add a PNG as an inline picture in its own paragraph.
    pub fn image(&mut self, png: Vec<u8>, width_pt: f32, height_pt: f32) -> &mut Self {
        self.media.push(png);
        let n = self.media.len();
        let cx = (width_pt.max(1.0) * EMU_PER_POINT).round() as u64;
        let cy = (height_pt.max(1.0) * EMU_PER_POINT).round() as u64;
        let _ = write!(
            self.body,
            concat!(
                r#"<w:p><w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
                r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{n}" name="Picture {n}"/>"#,
                r#"<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:pic><pic:nvPicPr><pic:cNvPr id="{n}" name="image{n}.png"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill><a:blip r:embed="rIdImg{n}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
                r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic>"#,
                r#"</a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#,
            ),
            cx = cx,
            cy = cy,
            n = n,
        );
        self
    }

    /// Serialise the package.
    pub fn finish(self) -> Result<Vec<u8>, ConvertError> {
        let (w, h) = self.page_size_pt.unwrap_or(DEFAULT_PAGE_SIZE_PT);
        let mut document = String::with_capacity(self.body.len() + 1024);
        let _ = write!(
            document,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document {NS_DECLS}><w:body>{body}<w:sectPr><w:pgSz w:w="{pw}" w:h="{ph}"/><w:pgMar w:top="{m}" w:right="{m}" w:bottom="{m}" w:left="{m}" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr></w:body></w:document>"#,
            body = self.body,
            pw = to_twips(w),
            ph = to_twips(h),
            m = PAGE_MARGIN_TWIPS,
        );

        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for n in 1..=self.media.len() {
            let _ = write!(
                rels,
                r#"<Relationship Id="rIdImg{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image{n}.png"/>"#
            );
        }
        rels.push_str("</Relationships>");

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let write_err = |e: std::io::Error| ConvertError::Archive {
            detail: e.to_string(),
        };

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES.as_bytes()).map_err(write_err)?;
        zip.start_file("_rels/.rels", options)?;
        zip.write_all(PACKAGE_RELS.as_bytes()).map_err(write_err)?;
        zip.start_file("word/document.xml", options)?;
        zip.write_all(document.as_bytes()).map_err(write_err)?;
        zip.start_file("word/_rels/document.xml.rels", options)?;
        zip.write_all(rels.as_bytes()).map_err(write_err)?;
        // PNG data is already compressed.
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (i, png) in self.media.iter().enumerate() {
            zip.start_file(format!("word/media/image{}.png", i + 1), stored)?;
            zip.write_all(png).map_err(write_err)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

/// Assemble OCR page results into an editable document.
///
/// Every page starts with a `--- Page N ---` paragraph, each blank-line
/// separated block of recognised text becomes a paragraph, and pages are
/// separated by hard page breaks. A page whose OCR failed carries its error
/// text instead of content.
pub fn build_ocr_document(pages: &[PageResult]) -> Result<Vec<u8>, ConvertError> {
    let mut doc = DocxBuilder::new();
    for (i, page) in pages.iter().enumerate() {
        doc.text_paragraph(&format!("--- Page {} ---", page.page_num));
        match &page.error {
            None => {
                for para in split_paragraphs(&page.text) {
                    doc.text_paragraph(&para);
                }
            }
            Some(e) => {
                doc.text_paragraph(&format!("[{}]", e));
            }
        }
        if i + 1 < pages.len() {
            doc.page_break();
        }
    }
    doc.finish()
}

fn write_run(out: &mut String, run: &Run) {
    if run.text.is_empty() {
        return;
    }
    out.push_str("<w:r>");
    if run.bold || run.italic || run.size_pt.is_some() {
        out.push_str("<w:rPr>");
        if run.bold {
            out.push_str("<w:b/>");
        }
        if run.italic {
            out.push_str("<w:i/>");
        }
        if let Some(size) = run.size_pt {
            // w:sz is in half-points.
            let half_points = (size * 2.0).round().clamp(2.0, 3276.0) as u32;
            let _ = write!(out, r#"<w:sz w:val="{half_points}"/>"#);
        }
        out.push_str("</w:rPr>");
    }
    for (i, line) in run.text.split('\n').enumerate() {
        if i > 0 {
            out.push_str("<w:br/>");
        }
        if !line.is_empty() {
            let clean = xml_safe(line);
            let _ = write!(
                out,
                r#"<w:t xml:space="preserve">{}</w:t>"#,
                escape(clean.as_str())
            );
        }
    }
    out.push_str("</w:r>");
}

/// Drop characters XML 1.0 cannot represent (form feeds from tesseract,
/// stray control bytes from broken text layers).
fn xml_safe(s: &str) -> String {
    s.chars()
        .filter(|&c| c == '\t' || !(c.is_control() || c == '\u{FFFE}' || c == '\u{FFFF}'))
        .collect()
}

fn to_twips(points: f32) -> u32 {
    if points.is_finite() && points > 0.0 {
        (points * TWIPS_PER_POINT).round() as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;
    use std::io::Read;

    fn read_part(docx: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(docx)).expect("valid zip");
        let mut part = archive.by_name(name).expect("part exists");
        let mut s = String::new();
        part.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn package_contains_required_parts() {
        let mut doc = DocxBuilder::new();
        doc.text_paragraph("Hello");
        let bytes = doc.finish().unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "word/document.xml",
            "word/_rels/document.xml.rels",
        ] {
            assert!(names.contains(&part), "missing {part}");
        }
    }

    #[test]
    fn text_is_escaped_and_sanitised() {
        let mut doc = DocxBuilder::new();
        doc.text_paragraph("Fish & <Chips>\u{000C}");
        let xml = read_part(&doc.finish().unwrap(), "word/document.xml");
        assert!(xml.contains("Fish &amp; &lt;Chips&gt;"));
        assert!(!xml.contains('\u{000C}'));
    }

    #[test]
    fn runs_carry_formatting_and_position() {
        let mut doc = DocxBuilder::new();
        doc.page_size(595.0, 842.0);
        doc.paragraph(&Paragraph {
            runs: vec![
                Run {
                    text: "Title".into(),
                    bold: true,
                    italic: false,
                    size_pt: Some(18.0),
                },
                Run {
                    text: " body".into(),
                    italic: true,
                    ..Default::default()
                },
            ],
            indent_pt: 36.0,
            space_before_pt: 12.0,
        });
        let xml = read_part(&doc.finish().unwrap(), "word/document.xml");
        assert!(xml.contains(r#"<w:ind w:left="720"/>"#));
        assert!(xml.contains(r#"<w:spacing w:before="240"/>"#));
        assert!(xml.contains(r#"<w:b/><w:sz w:val="36"/>"#));
        assert!(xml.contains("<w:i/>"));
        assert!(xml.contains(r#"<w:pgSz w:w="11900" w:h="16840"/>"#));
    }

    #[test]
    fn images_get_relationships() {
        let mut doc = DocxBuilder::new();
        doc.image(vec![0x89, b'P', b'N', b'G'], 100.0, 50.0);
        let bytes = doc.finish().unwrap();
        let rels = read_part(&bytes, "word/_rels/document.xml.rels");
        assert!(rels.contains(r#"Target="media/image1.png""#));
        let xml = read_part(&bytes, "word/document.xml");
        assert!(xml.contains(r#"r:embed="rIdImg1""#));
        assert!(xml.contains(r#"cx="1270000""#));
    }

    #[test]
    fn push_run_merges_same_style() {
        let mut p = Paragraph::default();
        p.push_run(Run::plain("a"));
        p.push_run(Run::plain("b"));
        p.push_run(Run {
            text: "c".into(),
            bold: true,
            ..Default::default()
        });
        assert_eq!(p.runs.len(), 2);
        assert_eq!(p.text(), "abc");
    }

    #[test]
    fn ocr_document_has_headings_breaks_and_page_errors() {
        let pages = vec![
            PageResult {
                page_num: 1,
                text: "First para\n\nSecond para".into(),
                retries: 0,
                error: None,
            },
            PageResult {
                page_num: 2,
                text: String::new(),
                retries: 2,
                error: Some(PageError::OcrFailed {
                    page: 2,
                    retries: 2,
                    detail: "exit status 1".into(),
                }),
            },
        ];
        let xml = read_part(&build_ocr_document(&pages).unwrap(), "word/document.xml");
        assert!(xml.contains("--- Page 1 ---"));
        assert!(xml.contains("--- Page 2 ---"));
        assert!(xml.contains("First para"));
        assert!(xml.contains("Second para"));
        assert!(xml.contains("exit status 1"));
        assert_eq!(xml.matches(r#"w:type="page""#).count(), 1);
    }
}
