//! Pipeline stages for PDF/image conversion.
//!
//! Each submodule implements one transformation step behind a trait, so
//! the orchestration in [`crate::convert`] can be tested with fakes and a
//! backend (pdfium, tesseract) can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──────────── document ────────────┐
//! input ──▶ normalize ──▶ structural ──(fail)──▶ render ──▶ ocr ──▶ docx
//! (stage)   (image→PDF)   (pdfium→docx)          (pdfium)  (tesseract)
//!            └──────────── plain text ──────────┘
//!                         extract ──(empty)──▶ render ──▶ ocr ──▶ text
//! ```
//!
//! 1. [`input`]       — classify by extension, stage bytes in the batch temp dir
//! 2. [`normalize`]   — decode PNG/JPEG, force RGB, embed on a one-page PDF
//! 3. [`structural`]  — read text/image objects and rebuild them as DOCX
//! 4. [`extract`]     — embedded text per page, no rasterisation
//! 5. [`render`]      — rasterise pages via pdfium (CPU-bound, blocking pool)
//! 6. [`ocr`]         — per-page recognition with retry and page isolation
//! 7. [`docx`]        — WordprocessingML writer and OCR document assembly
//! 8. [`postprocess`] — deterministic OCR text cleanup

pub mod docx;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod ocr;
pub mod pdfium;
pub mod postprocess;
pub mod render;
pub mod structural;

use crate::error::ConvertError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Cooperative cancellation shared between the caller and a running batch.
///
/// Checked before each file and before each OCR page; work already running
/// on the blocking pool finishes but its result is discarded.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run a blocking stage on the blocking pool with a timeout.
///
/// pdfium is blocking; running it via `spawn_blocking` keeps the runtime
/// responsive for the timer. On expiry the task is abandoned (a blocking
/// thread cannot be interrupted) and [`ConvertError::Timeout`] is returned.
/// A panic inside the stage becomes [`ConvertError::Unexpected`] so the
/// caller can still fall back.
pub async fn run_blocking<T, F>(stage: &str, timeout_secs: u64, f: F) -> Result<T, ConvertError>
where
    F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
    T: Send + 'static,
{
    let mut task = tokio::task::spawn_blocking(f);
    await_stage(stage, timeout_secs, &mut task).await
}

async fn await_stage<T>(
    stage: &str,
    timeout_secs: u64,
    task: &mut JoinHandle<Result<T, ConvertError>>,
) -> Result<T, ConvertError> {
    match tokio::time::timeout(Duration::from_secs(timeout_secs), task).await {
        Err(_) => Err(ConvertError::Timeout {
            stage: stage.to_string(),
            secs: timeout_secs,
        }),
        Ok(Err(join_err)) => Err(ConvertError::Unexpected(format!(
            "{} task panicked: {}",
            stage, join_err
        ))),
        Ok(Ok(result)) => result,
    }
}

/// Blocking calls into one backend that serialises its callers.
///
/// pdfium (with `thread_safe`) holds a process-wide lock for as long as a
/// binding lives, so a call abandoned on timeout keeps every later call
/// waiting on that lock. The lane counts abandoned calls that are still
/// running; while there is one, new stages fail at once with
/// [`ConvertError::BackendBusy`] instead of queueing behind it.
#[derive(Debug, Clone)]
pub struct BlockingLane {
    backend: &'static str,
    stalled: Arc<AtomicUsize>,
}

impl BlockingLane {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            stalled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Abandoned calls still holding the backend.
    pub fn stalled(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }

    /// Like [`run_blocking`], but refuses to start while an earlier call on
    /// this lane is still stuck, and tracks a timed-out call until it returns.
    pub async fn run<T, F>(&self, stage: &str, timeout_secs: u64, f: F) -> Result<T, ConvertError>
    where
        F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
        T: Send + 'static,
    {
        if self.stalled() > 0 {
            return Err(ConvertError::BackendBusy {
                stage: stage.to_string(),
                backend: self.backend.to_string(),
            });
        }

        let mut task = tokio::task::spawn_blocking(f);
        let result = await_stage(stage, timeout_secs, &mut task).await;
        if matches!(result, Err(ConvertError::Timeout { .. })) {
            self.stalled.fetch_add(1, Ordering::SeqCst);
            warn!(
                "{} abandoned after {}s; {} is blocked until it returns",
                stage, timeout_secs, self.backend
            );
            let stalled = Arc::clone(&self.stalled);
            let backend = self.backend;
            tokio::spawn(async move {
                let _ = task.await;
                stalled.fetch_sub(1, Ordering::SeqCst);
                debug!("abandoned {} call returned", backend);
            });
        }
        result
    }
}
