//! Result types shared by the pipeline, the batch and the UI boundary.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One tier of the fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Layout-preserving conversion from the PDF structure.
    Structural,
    /// Rasterise + OCR after a higher tier failed.
    OcrFallback,
    /// Embedded-text extraction (plain-text output).
    Direct,
    /// OCR as the first and only tier (image input, plain-text output).
    Ocr,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Structural => "structural",
            Strategy::OcrFallback => "ocr-fallback",
            Strategy::Direct => "direct",
            Strategy::Ocr => "ocr",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one tier having been tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: Strategy,
    /// `None` if this tier produced the output.
    pub error: Option<String>,
}

impl StrategyAttempt {
    pub fn succeeded(strategy: Strategy) -> Self {
        Self {
            strategy,
            error: None,
        }
    }

    pub fn failed(strategy: Strategy, error: &ConvertError) -> Self {
        Self {
            strategy,
            error: Some(error.to_string()),
        }
    }
}

/// Outcome of converting one file. Exactly one variant exists per file.
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    Success {
        output: Vec<u8>,
        strategy: Strategy,
        attempts: Vec<StrategyAttempt>,
    },
    Failure {
        error: ConvertError,
        attempts: Vec<StrategyAttempt>,
    },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }

    pub fn attempts(&self) -> &[StrategyAttempt] {
        match self {
            ConversionOutcome::Success { attempts, .. }
            | ConversionOutcome::Failure { attempts, .. } => attempts,
        }
    }

    /// Strategies in the order they were tried.
    pub fn strategies(&self) -> Vec<Strategy> {
        self.attempts().iter().map(|a| a.strategy).collect()
    }

    /// Output bytes, if the conversion succeeded.
    pub fn output(&self) -> Option<&[u8]> {
        match self {
            ConversionOutcome::Success { output, .. } => Some(output),
            ConversionOutcome::Failure { .. } => None,
        }
    }

    pub fn strategy_used(&self) -> Option<Strategy> {
        match self {
            ConversionOutcome::Success { strategy, .. } => Some(*strategy),
            ConversionOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ConvertError> {
        match self {
            ConversionOutcome::Success { .. } => None,
            ConversionOutcome::Failure { error, .. } => Some(error),
        }
    }

    /// Human-readable reason for a failure.
    ///
    /// When more than one tier failed, every tier's error is listed in order
    /// (`structural: …; ocr-fallback: …`); otherwise it is the terminal error.
    pub fn reason(&self) -> Option<String> {
        let ConversionOutcome::Failure { error, attempts } = self else {
            return None;
        };
        let failed: Vec<String> = attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| format!("{}: {}", a.strategy, e)))
            .collect();
        if failed.len() > 1 {
            Some(format!("all strategies failed — {}", failed.join("; ")))
        } else {
            Some(error.to_string())
        }
    }

    /// Short status message in the style of the per-file report.
    pub fn message(&self) -> String {
        match self {
            ConversionOutcome::Success { strategy, .. } => match strategy {
                Strategy::Structural => "Converted by structural conversion".to_string(),
                Strategy::OcrFallback => "Converted by OCR fallback".to_string(),
                Strategy::Direct => "Extracted embedded text".to_string(),
                Strategy::Ocr => "Extracted text by OCR".to_string(),
            },
            ConversionOutcome::Failure { .. } => self.reason().unwrap_or_default(),
        }
    }
}
