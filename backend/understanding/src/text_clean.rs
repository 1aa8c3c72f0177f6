//! OCR text cleanup applied before heuristic extraction.

use once_cell::sync::Lazy;
use regex::Regex;

const MIN_LINE_LENGTH: usize = 2;

static SYMBOL_ONLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^a-zA-Z0-9]+$").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Drop blank, symbol-only and single-character lines and collapse runs of
/// whitespace. Line structure is preserved.
pub fn clean_block(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !SYMBOL_ONLY_RE.is_match(line))
        .filter(|line| line.chars().count() >= MIN_LINE_LENGTH)
        .map(|line| WHITESPACE_RE.replace_all(line, " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether cleaned text carries enough characters to be worth extracting from.
pub fn has_readable_text(text: &str) -> bool {
    text.trim().chars().count() >= 5
}
