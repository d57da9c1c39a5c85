//! Progress-sink trait for per-file batch events.
//!
//! Inject an [`Arc<dyn ProgressSink>`] via
//! [`crate::config::ConversionConfigBuilder::progress_sink`] to receive
//! events as the batch processes each file. The UI layer (the `pdf2docx`
//! progress bar, a web form, a log shipper) is the only implementer; the
//! library never needs to know how the host application renders them.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2docx::{ConversionConfig, FileStatus, ProgressSink};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingSink {
//!     done: AtomicUsize,
//! }
//!
//! impl ProgressSink for CountingSink {
//!     fn notify(&self, index: usize, total: usize, status: &FileStatus) {
//!         if status.is_finished() {
//!             self.done.fetch_add(1, Ordering::SeqCst);
//!         }
//!         eprintln!("[{index}/{total}] {status}");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_sink(Arc::new(CountingSink { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::Strategy;
use std::fmt;
use std::sync::Arc;

/// Status of one file as reported to a [`ProgressSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Conversion of the file is about to begin.
    Started { file_name: String },
    /// The file converted; `strategy` names the tier that produced it.
    Converted { file_name: String, strategy: Strategy },
    /// The file failed; `reason` is the human-readable failure reason.
    Failed { file_name: String, reason: String },
}

impl FileStatus {
    pub fn file_name(&self) -> &str {
        match self {
            FileStatus::Started { file_name }
            | FileStatus::Converted { file_name, .. }
            | FileStatus::Failed { file_name, .. } => file_name,
        }
    }

    /// `true` once the file has a final outcome.
    pub fn is_finished(&self) -> bool {
        !matches!(self, FileStatus::Started { .. })
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Started { file_name } => write!(f, "Started: {file_name}"),
            FileStatus::Converted {
                file_name,
                strategy,
            } => write!(f, "Converted: {file_name} ({strategy})"),
            FileStatus::Failed { file_name, reason } => write!(f, "Error: {file_name} — {reason}"),
        }
    }
}

/// Receives progress events from [`crate::batch::BatchOrchestrator`].
///
/// Files are processed sequentially, so calls never overlap, but the sink
/// is shared through an `Arc` and must be `Send + Sync`. Only `notify` is
/// required; the batch-level hooks default to no-ops.
pub trait ProgressSink: Send + Sync {
    /// Called once before the first file.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when file `index` (1-based) of `total` starts and again when it finishes.
    fn notify(&self, index: usize, total: usize, status: &FileStatus);

    /// Called once after every file has an outcome.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A sink that drops every event. Used when no sink is configured.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn notify(&self, _index: usize, _total: usize, _status: &FileStatus) {}
}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type SharedProgressSink = Arc<dyn ProgressSink>;
