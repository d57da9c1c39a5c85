//! Batch orchestration: convert every uploaded file, in order, in isolation.
//!
//! The orchestrator owns the batch's temporary working area: one
//! [`tempfile::TempDir`] created when the batch starts and removed when it is
//! dropped, on every exit path. File `i` works in `file-<i>/` inside it, so
//! intermediate files of different inputs never share a path.
//!
//! Each file runs in its own Tokio task. A panic anywhere inside the
//! pipeline surfaces as a `JoinError` and is recorded as that file's
//! `Failure`; the batch continues with the next file.

use crate::archive::ArchiveBundle;
use crate::config::OutputKind;
use crate::convert::{ConversionPipeline, ConversionRequest};
use crate::error::ConvertError;
use crate::output::ConversionOutcome;
use crate::pipeline::input::{output_name, InputFile};
use crate::progress::{FileStatus, NoopProgressSink, ProgressSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{info, warn};

/// Shown when a non-empty batch produced no output at all.
pub const OCR_INSTALL_HINT: &str = "No file could be converted. Scanned documents and images \
need the OCR toolchain: install tesseract (apt install tesseract-ocr, brew install tesseract) \
and pdfium (set PDFIUM_LIB_PATH), then try again.";

/// One input and its outcome.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Name of the uploaded file.
    pub file_name: String,
    /// `<stem>.docx` or `<stem>.txt`.
    pub output_name: String,
    pub outcome: ConversionOutcome,
}

/// Outcomes in upload order; always one entry per input.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    entries: Vec<BatchEntry>,
}

impl BatchResult {
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<BatchEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// Archive of the successful outputs; `None` when there are none.
    pub fn archive(&self) -> Option<ArchiveBundle> {
        let bundle = ArchiveBundle::from_batch(self);
        (!bundle.is_empty()).then_some(bundle)
    }

    /// Installation hint for a non-empty batch with zero successes.
    pub fn hint(&self) -> Option<&'static str> {
        (!self.is_empty() && self.success_count() == 0).then_some(OCR_INSTALL_HINT)
    }
}

/// A local input that could not be read.
#[derive(Debug)]
struct Unreadable {
    name: String,
    detail: String,
}

/// Runs a [`ConversionPipeline`] over an ordered set of files.
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    pipeline: Arc<ConversionPipeline>,
}

impl BatchOrchestrator {
    pub fn new(pipeline: ConversionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &ConversionPipeline {
        &self.pipeline
    }

    /// Convert every file, sequentially and in order.
    ///
    /// Never fails: every problem, including a temp directory that cannot be
    /// created, ends up as a per-file `Failure`.
    pub async fn run(&self, files: Vec<InputFile>, kind: OutputKind) -> BatchResult {
        self.run_sources(files.into_iter().map(Ok).collect(), kind).await
    }

    /// Read each path and convert it like [`run`](Self::run).
    ///
    /// A path that cannot be read becomes that file's `Failure`; the other
    /// files are still converted.
    pub async fn run_paths(&self, paths: &[PathBuf], kind: OutputKind) -> BatchResult {
        let sources = paths
            .iter()
            .map(|path| {
                InputFile::from_path(path).map_err(|e| Unreadable {
                    name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string()),
                    detail: e.to_string(),
                })
            })
            .collect();
        self.run_sources(sources, kind).await
    }

    async fn run_sources(
        &self,
        sources: Vec<Result<InputFile, Unreadable>>,
        kind: OutputKind,
    ) -> BatchResult {
        let total = sources.len();
        let start = Instant::now();
        let noop: Arc<dyn ProgressSink> = Arc::new(NoopProgressSink);
        let sink = self
            .pipeline
            .config()
            .progress_sink
            .clone()
            .unwrap_or(noop);

        sink.on_batch_start(total);
        info!("Batch of {} files → {}", total, kind.extension());

        let workspace = tempfile::Builder::new().prefix("pdf2docx-").tempdir();
        let mut entries = Vec::with_capacity(total);

        for (i, source) in sources.into_iter().enumerate() {
            let index = i + 1;
            let (file_name, out_name) = match &source {
                Ok(file) => (file.name().to_string(), output_name(file, kind.extension())),
                Err(unreadable) => {
                    let placeholder = InputFile::new(unreadable.name.as_str(), Vec::new());
                    (unreadable.name.clone(), output_name(&placeholder, kind.extension()))
                }
            };
            sink.notify(
                index,
                total,
                &FileStatus::Started {
                    file_name: file_name.clone(),
                },
            );

            let outcome = match (&workspace, source) {
                _ if self.pipeline.cancellation().is_cancelled() => ConversionOutcome::Failure {
                    error: ConvertError::Cancelled,
                    attempts: Vec::new(),
                },
                (_, Err(unreadable)) => ConversionOutcome::Failure {
                    error: ConvertError::Staging {
                        file: unreadable.name,
                        detail: format!("could not be read: {}", unreadable.detail),
                    },
                    attempts: Vec::new(),
                },
                (Err(e), _) => ConversionOutcome::Failure {
                    error: ConvertError::Staging {
                        file: file_name.clone(),
                        detail: format!("could not create temp directory: {}", e),
                    },
                    attempts: Vec::new(),
                },
                (Ok(dir), Ok(file)) => {
                    let workdir = dir.path().join(format!("file-{}", index));
                    let pipeline = Arc::clone(&self.pipeline);
                    let request = ConversionRequest::new(file, kind);
                    let task = tokio::spawn(async move {
                        pipeline.convert(request, &workdir).await
                    });
                    outcome_from_join(task.await)
                }
            };

            let status = match &outcome {
                ConversionOutcome::Success { strategy, .. } => FileStatus::Converted {
                    file_name: file_name.clone(),
                    strategy: *strategy,
                },
                ConversionOutcome::Failure { .. } => FileStatus::Failed {
                    file_name: file_name.clone(),
                    reason: outcome.reason().unwrap_or_default(),
                },
            };
            info!("[{}/{}] {}", index, total, status);
            sink.notify(index, total, &status);

            entries.push(BatchEntry {
                file_name,
                output_name: out_name,
                outcome,
            });
        }

        let result = BatchResult { entries };
        let successes = result.success_count();
        info!(
            "Batch complete: {}/{} converted in {}ms",
            successes,
            total,
            start.elapsed().as_millis()
        );
        if let Some(hint) = result.hint() {
            warn!("{}", hint);
        }
        sink.on_batch_complete(total, successes);
        result
    }

    /// Synchronous wrapper around [`run`](Self::run) for non-async callers.
    ///
    /// Creates a new Tokio runtime internally. Do not call from within an
    /// existing Tokio runtime; use `run` there.
    ///
    /// Returns as soon as the batch result is ready: a pdfium call abandoned
    /// on timeout is left running on a detached thread.
    pub fn run_blocking(
        &self,
        files: Vec<InputFile>,
        kind: OutputKind,
    ) -> Result<BatchResult, ConvertError> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ConvertError::Unexpected(format!("failed to create tokio runtime: {}", e)))?;
        let result = rt.block_on(self.run(files, kind));
        rt.shutdown_background();
        Ok(result)
    }
}

/// Turn a finished file task into an outcome; a panic becomes a `Failure`.
pub fn outcome_from_join(joined: Result<ConversionOutcome, JoinError>) -> ConversionOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            let detail = if e.is_panic() {
                let payload = e.into_panic();
                payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "task panicked".to_string())
            } else {
                e.to_string()
            };
            ConversionOutcome::Failure {
                error: ConvertError::Unexpected(detail),
                attempts: Vec::new(),
            }
        }
    }
}
