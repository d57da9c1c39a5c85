//! ZIP bundle of every successful output in a batch.
//!
//! Two inputs can share a stem (`report.pdf` and `report.png` both become
//! `report.docx`). Rather than letting the later entry silently overwrite the
//! earlier one, the second occurrence is renamed `report_2.docx`, the third
//! `report_3.docx`, and so on, in upload order.

use crate::batch::BatchResult;
use crate::error::ConvertError;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// File name offered for the archive download.
pub const ARCHIVE_NAME: &str = "converted_docs.zip";

/// `(file_name, bytes)` pairs built from successful outcomes only.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBundle {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBundle {
    /// Collect the successful entries of `result`, resolving name collisions.
    pub fn from_batch(result: &BatchResult) -> Self {
        let mut bundle = Self::default();
        for entry in result.entries() {
            if let Some(bytes) = entry.outcome.output() {
                bundle.push(&entry.output_name, bytes.to_vec());
            }
        }
        bundle
    }

    /// Add an entry, suffixing its stem with `_<n>` if the name is taken.
    pub fn push(&mut self, name: &str, bytes: Vec<u8>) {
        let taken: HashSet<&str> = self.entries.iter().map(|(n, _)| n.as_str()).collect();
        let unique = unique_name(name, &taken);
        self.entries.push((unique, bytes));
    }

    pub fn entries(&self) -> &[(String, Vec<u8>)] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialise as a deflate-compressed ZIP.
    pub fn to_zip(&self) -> Result<Vec<u8>, ConvertError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in &self.entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes).map_err(|e| ConvertError::Archive {
                detail: format!("{}: {}", name, e),
            })?;
        }
        Ok(zip.finish()?.into_inner())
    }
}

fn unique_name(name: &str, taken: &HashSet<&str>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (2..)
        .map(|n| format!("{stem}_{n}{ext}"))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| name.to_string())
}
