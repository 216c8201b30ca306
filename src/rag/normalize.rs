//! Canonical text form used as cache key and knowledge-trigger probe.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lower-case, fold accents, drop punctuation and collapse whitespace.
///
/// Pure and idempotent: `normalize(&normalize(x)) == normalize(x)`.
/// Empty or punctuation-only input yields an empty key.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| is_word_char(*c) || c.is_whitespace())
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a normalized key into its token set.
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(' ').filter(|t| !t.is_empty())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
