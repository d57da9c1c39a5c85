//! Post-processing: deterministic cleanup of recognised and extracted text.
//!
//! Tesseract output carries a few predictable artefacts — a trailing form
//! feed per page, CRLF line endings on Windows builds, zero-width characters
//! picked up from dithering, ragged trailing spaces and long runs of blank
//! lines where the page had whitespace. Each rule below is a pure
//! `&str → String` pass so the order is explicit and each is testable.
//!
//! Rules (applied in order):
//! 1. Normalise line endings (CRLF / CR → LF)
//! 2. Remove form feeds and invisible Unicode
//! 3. Trim trailing whitespace per line
//! 4. Collapse 3+ consecutive blank lines down to one
//! 5. Trim leading/trailing blank lines

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a page of OCR text.
pub fn clean_ocr_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Split text into paragraphs on blank lines, dropping empty blocks.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    static BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());
    BLANK_LINE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// `true` if the text carries no visible characters.
pub fn is_blank(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || INVISIBLE.contains(&c))
}

// ── Rule 1: Line endings ─────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Invisible characters ─────────────────────────────────────────────

const INVISIBLE: [char; 7] = [
    '\u{000C}', // form feed (tesseract page terminator)
    '\u{200B}', // zero-width space
    '\u{200C}', // zero-width non-joiner
    '\u{200D}', // zero-width joiner
    '\u{2060}', // word joiner
    '\u{FEFF}', // BOM
    '\u{00AD}', // soft hyphen
];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

// ── Rule 3: Trailing whitespace ──────────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Blank-line runs ──────────────────────────────────────────────────

fn collapse_blank_lines(input: &str) -> String {
    static RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
    RUNS.replace_all(input, "\n\n").into_owned()
}
