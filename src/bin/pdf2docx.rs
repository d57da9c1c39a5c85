//! CLI binary for edgequake-pdf2docx.
//!
//! A thin shim over the library crate: maps CLI flags to `ConversionConfig`,
//! runs one batch, writes each output plus the ZIP archive, and prints a
//! per-file report.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2docx::{
    BatchOrchestrator, BatchResult, CancellationFlag, ConversionConfig, ConversionPipeline,
    FileStatus, OutputKind, PageSeparator, ProgressSink, ARCHIVE_NAME,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Terminal progress sink: one bar for the batch, one log line per file.
struct CliProgressSink {
    bar: ProgressBar,
    started: std::sync::Mutex<Option<Instant>>,
    failures: AtomicUsize,
}

impl CliProgressSink {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: std::sync::Mutex::new(None),
            failures: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl ProgressSink for CliProgressSink {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} files…"))
        ));
    }

    fn notify(&self, index: usize, total: usize, status: &FileStatus) {
        match status {
            FileStatus::Started { file_name } => {
                if let Ok(mut s) = self.started.lock() {
                    *s = Some(Instant::now());
                }
                self.bar.set_message(file_name.clone());
            }
            FileStatus::Converted {
                file_name,
                strategy,
            } => {
                self.bar.println(format!(
                    "  {} [{index}/{total}] {:<32} {}  {}",
                    green("✓"),
                    file_name,
                    dim(strategy.as_str()),
                    self.elapsed(),
                ));
                self.bar.inc(1);
            }
            FileStatus::Failed { file_name, reason } => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                let reason = truncate(reason, 100);
                self.bar.println(format!(
                    "  {} [{index}/{total}] {:<32} {}  {}",
                    red("✗"),
                    file_name,
                    red(&reason),
                    self.elapsed(),
                ));
                self.bar.inc(1);
            }
        }
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert PDFs and screenshots to DOCX in ./out, plus out/converted_docs.zip
  pdf2docx report.pdf scan.png photo.jpg -o out

  # Plain text instead of DOCX
  pdf2docx --format txt invoice.pdf

  # German + English OCR at higher resolution
  pdf2docx --lang deu+eng --dpi 300 scan.pdf

  # Machine-readable summary, no archive
  pdf2docx --json --no-zip *.pdf > summary.json

HOW IT WORKS:
  DOCX output  structural conversion of the text layer; OCR when it fails
  TXT output   embedded text of the PDF; OCR when it is empty
  Images       normalised to a one-page PDF (DOCX) or recognised directly (TXT)

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         pdfium library file or directory
  PDF2DOCX_TESSERACT      tesseract executable (default: tesseract on PATH)
  PDF2DOCX_LANG           OCR language(s), e.g. eng or deu+eng
  RUST_LOG                tracing filter, overrides -v / -q

SETUP:
  Debian/Ubuntu:  apt install tesseract-ocr   (+ tesseract-ocr-<lang> packs)
  macOS:          brew install tesseract
  pdfium:         download from bblanchon/pdfium-binaries and set PDFIUM_LIB_PATH
"#;

/// Convert PDF and image files to editable DOCX or plain text.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2docx",
    version,
    about = "Convert PDF and image files to editable DOCX or plain text",
    long_about = "Convert PDF, PNG and JPEG files to editable Word documents or plain text. \
Documents with a text layer are converted structurally; scans and photos fall back to \
OCR with tesseract. Every file is reported independently and successes are bundled into \
a ZIP archive.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files (.pdf, .png, .jpg, .jpeg), converted in the given order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output kind: docx or txt.
    #[arg(short, long, env = "PDF2DOCX_FORMAT", value_enum, default_value = "docx")]
    format: FormatArg,

    /// Directory for converted files and the archive.
    #[arg(short, long, env = "PDF2DOCX_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Do not write converted_docs.zip.
    #[arg(long, env = "PDF2DOCX_NO_ZIP")]
    no_zip: bool,

    /// Only write the archive, not the individual files.
    #[arg(long, env = "PDF2DOCX_ZIP_ONLY", conflicts_with = "no_zip")]
    zip_only: bool,

    /// OCR language(s) passed to tesseract `-l`.
    #[arg(long, env = "PDF2DOCX_LANG", default_value = "eng")]
    lang: String,

    /// Rendering DPI for OCR (72–600).
    #[arg(long, env = "PDF2DOCX_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Resolution assumed when placing an image on a PDF page.
    #[arg(long, env = "PDF2DOCX_IMAGE_DPI", default_value_t = 100.0)]
    image_dpi: f32,

    /// Retries per OCR call after the first attempt.
    #[arg(long, env = "PDF2DOCX_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Timeout for one OCR call, in seconds.
    #[arg(long, env = "PDF2DOCX_OCR_TIMEOUT", default_value_t = 120)]
    ocr_timeout: u64,

    /// Timeout for structural conversion and text extraction, in seconds.
    #[arg(long, env = "PDF2DOCX_STRUCTURAL_TIMEOUT", default_value_t = 300)]
    structural_timeout: u64,

    /// pdfium library file or directory.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// tesseract executable.
    #[arg(long, env = "PDF2DOCX_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Page separator for text output: heading, blank, formfeed, or a custom string.
    #[arg(long, env = "PDF2DOCX_SEPARATOR", default_value = "heading")]
    separator: String,

    /// Print a JSON summary on stdout.
    #[arg(long, env = "PDF2DOCX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2DOCX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2DOCX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2DOCX_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Docx,
    Txt,
}

impl From<FormatArg> for OutputKind {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Docx => OutputKind::Document,
            FormatArg::Txt => OutputKind::PlainText,
        }
    }
}

/// `--json` output.
#[derive(Serialize)]
struct Summary {
    succeeded: usize,
    failed: usize,
    archive: Option<PathBuf>,
    files: Vec<FileSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

#[derive(Serialize)]
struct FileSummary {
    file: String,
    output: Option<PathBuf>,
    success: bool,
    strategy: Option<String>,
    attempted: Vec<String>,
    message: String,
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let result = runtime.block_on(run(Cli::parse()));
    // A pdfium call abandoned on timeout must not keep the process alive.
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> Result<()> {

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar already reports every file; keep library logs quiet
    // underneath it unless -v asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config + pipeline ──────────────────────────────────────────
    let progress: Option<Arc<dyn ProgressSink>> = if show_progress {
        Some(CliProgressSink::new() as Arc<dyn ProgressSink>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    let cancel = CancellationFlag::new();
    let pipeline = ConversionPipeline::detect(config).with_cancellation(cancel.clone());
    if !pipeline.toolchain().ocr.is_available() && !cli.quiet && !cli.json {
        eprintln!(
            "{} OCR fallback unavailable: scanned documents will fail",
            yellow("⚠")
        );
    }

    // Ctrl-C finishes the current step and fails the remaining files.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} cancelling after the current step…", yellow("⚠"));
            cancel.cancel();
        }
    });

    // ── Run batch ────────────────────────────────────────────────────────
    let kind: OutputKind = cli.format.into();
    // Unreadable inputs are reported as failed files, not a fatal error.
    let result = BatchOrchestrator::new(pipeline)
        .run_paths(&cli.inputs, kind)
        .await;

    // ── Write outputs ────────────────────────────────────────────────────
    let (written, archive_path) = write_outputs(&cli, &result)?;

    if cli.json {
        let summary = summarize(&result, &written, archive_path);
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        report(&result, &written, show_progress);
        if let Some(ref path) = archive_path {
            eprintln!("   archive  →  {}", bold(&path.display().to_string()));
        }
    }

    if let Some(hint) = result.hint() {
        if !cli.json {
            eprintln!("\n{} {}", yellow("hint:"), hint);
        }
        anyhow::bail!("no file could be converted");
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<Arc<dyn ProgressSink>>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .render_dpi(cli.dpi)
        .image_dpi(cli.image_dpi)
        .ocr_language(cli.lang.clone())
        .tesseract_path(cli.tesseract.clone())
        .ocr_max_retries(cli.max_retries)
        .ocr_timeout_secs(cli.ocr_timeout)
        .structural_timeout_secs(cli.structural_timeout)
        .page_separator(parse_separator(&cli.separator));

    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(lib.clone());
    }
    if let Some(sink) = progress {
        builder = builder.progress_sink(sink);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "heading" => PageSeparator::Heading,
        "blank" | "none" => PageSeparator::Blank,
        "formfeed" | "ff" => PageSeparator::FormFeed,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

/// Write each success (unique names, in upload order) and the archive.
///
/// Returns the written path per batch entry and the archive path.
fn write_outputs(cli: &Cli, result: &BatchResult) -> Result<(Vec<Option<PathBuf>>, Option<PathBuf>)> {
    let mut written = vec![None; result.len()];
    let Some(bundle) = result.archive() else {
        return Ok((written, None));
    };

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("Failed to create {}", cli.output_dir.display()))?;

    if !cli.zip_only {
        let successes = result
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.outcome.is_success())
            .map(|(i, _)| i);
        for (slot, (name, bytes)) in successes.zip(bundle.entries()) {
            let path = cli.output_dir.join(name);
            write_file(&path, bytes)?;
            written[slot] = Some(path);
        }
    }

    let archive = if cli.no_zip {
        None
    } else {
        let path = cli.output_dir.join(ARCHIVE_NAME);
        let zip = bundle.to_zip().context("Failed to build archive")?;
        write_file(&path, &zip)?;
        Some(path)
    };

    Ok((written, archive))
}

/// Atomic write: temp file in the same directory, then rename.
fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    io::Write::write_all(&mut tmp, bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move output to {}", path.display()))?;
    Ok(())
}

/// Per-file report when the progress bar did not already print one.
fn report(result: &BatchResult, written: &[Option<PathBuf>], show_progress: bool) {
    if !show_progress {
        for (i, entry) in result.entries().iter().enumerate() {
            let mark = if entry.outcome.is_success() {
                green("✓")
            } else {
                red("✗")
            };
            eprintln!(
                "{} [{}/{}] {}: {}",
                mark,
                i + 1,
                result.len(),
                entry.file_name,
                entry.outcome.message()
            );
        }
        eprintln!(
            "Converted {}/{} files",
            result.success_count(),
            result.len()
        );
    }
    for path in written.iter().flatten() {
        eprintln!("   {}  {}", dim("→"), path.display());
    }
}

fn summarize(result: &BatchResult, written: &[Option<PathBuf>], archive: Option<PathBuf>) -> Summary {
    Summary {
        succeeded: result.success_count(),
        failed: result.failure_count(),
        archive,
        hint: result.hint(),
        files: result
            .entries()
            .iter()
            .zip(written)
            .map(|(entry, path)| FileSummary {
                file: entry.file_name.clone(),
                output: path.clone(),
                success: entry.outcome.is_success(),
                strategy: entry.outcome.strategy_used().map(|s| s.to_string()),
                attempted: entry
                    .outcome
                    .strategies()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                message: entry.outcome.message(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_parsing() {
        assert!(matches!(parse_separator("heading"), PageSeparator::Heading));
        assert!(matches!(parse_separator("FormFeed"), PageSeparator::FormFeed));
        assert!(matches!(parse_separator("none"), PageSeparator::Blank));
        match parse_separator("=== next ===") {
            PageSeparator::Custom(s) => assert_eq!(s, "=== next ==="),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        let long = "é".repeat(20);
        let t = truncate(&long, 5);
        assert_eq!(t.chars().count(), 5);
        assert!(t.ends_with('\u{2026}'));
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["pdf2docx", "a.pdf"]).unwrap();
        assert!(matches!(cli.format, FormatArg::Docx));
        assert_eq!(cli.dpi, 200);
        assert!(!cli.no_zip);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.ocr_language, "eng");
        assert_eq!(config.ocr_max_retries, 2);
    }
}
