//! Input handling: classify uploaded files and stage them on disk.
//!
//! ## Why stage to a temp directory?
//!
//! pdfium opens documents most reliably from a file-system path, and every
//! intermediate artefact (the PDF made from an image, the rendered page
//! PNGs handed to tesseract) needs a path too. The batch owns one `TempDir`;
//! each file gets its own subdirectory so no two files ever share a path,
//! and everything disappears when the `TempDir` is dropped — even on panic.

use crate::error::ConvertError;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A named byte blob received from the upload boundary.
///
/// Immutable once constructed. The extension of `name` decides how it is
/// converted; any declared content type is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    name: String,
    bytes: Vec<u8>,
}

/// What kind of source a file is, as far as dispatch is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image(ImageFormat),
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file; the file name (not the full path) becomes the name.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self { name, bytes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lower-cased extension without the dot, or "" when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// File name without its extension, used to name outputs.
    pub fn stem(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Classify by extension.
    pub fn kind(&self) -> Result<InputKind, ConvertError> {
        let ext = self.extension();
        let kind = match ext.as_str() {
            "pdf" => InputKind::Pdf,
            "png" => InputKind::Image(ImageFormat::Png),
            "jpg" | "jpeg" => InputKind::Image(ImageFormat::Jpeg),
            _ => return Err(ConvertError::UnsupportedType { extension: ext }),
        };

        if kind == InputKind::Pdf && self.bytes.len() >= 4 && &self.bytes[..4] != b"%PDF" {
            // Dispatch stays extension-driven; the structural tier reports the real error.
            warn!(
                "'{}' has a .pdf extension but starts with {:?}",
                self.name,
                &self.bytes[..4]
            );
        }
        Ok(kind)
    }

    /// Write the bytes into `dir` (created if needed) and return the path.
    pub fn stage(&self, dir: &Path) -> Result<PathBuf, ConvertError> {
        let staging_err = |e: std::io::Error| ConvertError::Staging {
            file: self.name.clone(),
            detail: e.to_string(),
        };
        std::fs::create_dir_all(dir).map_err(staging_err)?;
        let path = dir.join(safe_file_name(&self.name));
        std::fs::write(&path, &self.bytes).map_err(staging_err)?;
        debug!("Staged '{}' at {}", self.name, path.display());
        Ok(path)
    }
}

/// Name of the produced artefact: `<stem>.<ext>`.
pub fn output_name(file: &InputFile, extension: &str) -> String {
    format!("{}.{}", file.stem(), extension)
}

/// Strip directory components and characters that are unsafe on common
/// file systems, keeping the extension intact.
fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_dispatch_is_extension_driven() {
        assert_eq!(
            InputFile::new("a.PDF", b"%PDF-1.7".to_vec()).kind().unwrap(),
            InputKind::Pdf
        );
        assert_eq!(
            InputFile::new("scan.png", vec![]).kind().unwrap(),
            InputKind::Image(ImageFormat::Png)
        );
        assert_eq!(
            InputFile::new("photo.JPEG", vec![]).kind().unwrap(),
            InputKind::Image(ImageFormat::Jpeg)
        );
        assert_eq!(
            InputFile::new("photo.jpg", vec![]).kind().unwrap(),
            InputKind::Image(ImageFormat::Jpeg)
        );
    }

    #[test]
    fn test_unsupported_extensions() {
        let err = InputFile::new("report.rtf", vec![]).kind().unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedType { ref extension } if extension == "rtf"));
        assert!(InputFile::new("README", vec![]).kind().is_err());
    }

    #[test]
    fn test_stem_and_output_name() {
        let f = InputFile::new("Quarterly Report.v2.pdf", vec![]);
        assert_eq!(f.stem(), "Quarterly Report.v2");
        assert_eq!(output_name(&f, "docx"), "Quarterly Report.v2.docx");
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name("C:\\docs\\a?.pdf"), "a_.pdf");
        assert_eq!(safe_file_name(".."), "upload");
    }

    #[test]
    fn test_stage_writes_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let f = InputFile::new("a.pdf", b"%PDF-1.4 test".to_vec());
        let path = f.stage(&dir.path().join("file-1")).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 test");
        assert!(path.ends_with("file-1/a.pdf"));
    }
}
