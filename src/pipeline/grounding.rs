//! First hallucination filter: a proposed excerpt must occur in the source.
//!
//! Matching is case- and whitespace-insensitive. Invisible characters are
//! dropped on both sides, so a zero-width space inside the source cannot
//! hide an otherwise verbatim excerpt. Leading/trailing quotes and ellipses
//! that models wrap around quotations are ignored.

use super::sanitize::remove_invisible_chars;

/// Normalize text for excerpt matching: lowercase, whitespace runs
/// collapsed to a single space, invisible characters removed.
pub fn normalize_for_match(text: &str) -> String {
    let visible = remove_invisible_chars(text);
    let mut out = String::with_capacity(visible.len());
    for word in visible.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Strip wrapping quotes, ellipses and whitespace a model adds around a quote.
fn strip_quote_wrapping(excerpt: &str) -> &str {
    const WRAPPERS: &[char] = &['"', '\'', '`', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '\u{2026}'];
    excerpt
        .trim()
        .trim_start_matches("...")
        .trim_end_matches("...")
        .trim_matches(WRAPPERS)
        .trim()
}

/// Pre-normalized source text, built once per chunk and queried per candidate.
pub struct SourceIndex {
    normalized: String,
}

impl SourceIndex {
    pub fn new(source: &str) -> Self {
        Self {
            normalized: normalize_for_match(source),
        }
    }

    /// True when `excerpt` is a non-empty normalized substring of the source.
    pub fn contains_excerpt(&self, excerpt: &str) -> bool {
        let needle = normalize_for_match(strip_quote_wrapping(excerpt));
        !needle.is_empty() && self.normalized.contains(&needle)
    }
}

/// One-shot form of [`SourceIndex::contains_excerpt`].
pub fn excerpt_in_source(source: &str, excerpt: &str) -> bool {
    SourceIndex::new(source).contains_excerpt(excerpt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "The misa CSR is a WARL read-write register.\n\nThe MXL field encodes\n   the native base integer ISA width.";

    #[test]
    fn exact_excerpt_found() {
        assert!(excerpt_in_source(SOURCE, "The misa CSR is a WARL read-write register"));
    }

    #[test]
    fn case_insensitive() {
        assert!(excerpt_in_source(SOURCE, "the MISA csr is a warl READ-WRITE register"));
    }

    #[test]
    fn whitespace_insensitive_across_lines() {
        assert!(excerpt_in_source(SOURCE, "The MXL field encodes the native base integer ISA width"));
    }

    #[test]
    fn fabricated_excerpt_rejected() {
        assert!(!excerpt_in_source(SOURCE, "The misa CSR is a read-only register"));
    }

    #[test]
    fn empty_excerpt_rejected() {
        assert!(!excerpt_in_source(SOURCE, ""));
        assert!(!excerpt_in_source(SOURCE, "   \n "));
        assert!(!excerpt_in_source(SOURCE, "\"\""));
    }

    #[test]
    fn quotes_and_ellipses_ignored() {
        assert!(excerpt_in_source(SOURCE, "\"a WARL read-write register\""));
        assert!(excerpt_in_source(SOURCE, "...encodes the native base..."));
        assert!(excerpt_in_source(SOURCE, "\u{201C}MXL field\u{201D}"));
    }

    #[test]
    fn zero_width_in_source_does_not_hide_match() {
        let source = "The mis\u{200B}a CSR";
        assert!(excerpt_in_source(source, "misa CSR"));
    }

    #[test]
    fn index_reused_across_queries() {
        let index = SourceIndex::new(SOURCE);
        assert!(index.contains_excerpt("misa"));
        assert!(index.contains_excerpt("ISA width"));
        assert!(!index.contains_excerpt("mstatus"));
    }

    #[test]
    fn normalization_collapses_whitespace() {
        assert_eq!(normalize_for_match("  A\t\tB \n C  "), "a b c");
    }
}
