//! Text scanning utilities shared by the validator and extractors
//!
//! Tokenization is intentionally narrow: the vocabularies are Russian, so
//! only Cyrillic runs count as words. Everything operates on lowercased
//! input; callers that need original casing keep their own copy.

use std::sync::LazyLock;

use regex::Regex;

/// Plain Cyrillic words, hyphens excluded ("я-образ" splits into two)
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[а-яё]+").unwrap());

/// Cyrillic tokens with internal hyphens preserved ("я-образ" stays whole)
static HYPHEN_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[а-яё]+(?:-[а-яё]+)*").unwrap());

/// Split lowercased text into plain Cyrillic words
pub fn words(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_RE.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

/// Split lowercased text into tokens, keeping internal hyphens
pub fn hyphen_tokens(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    HYPHEN_TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Split text into sentences on `.`, `!`, `?`
///
/// Sentences shorter than `min_chars` characters after trimming are dropped.
pub fn sentences(text: &str, min_chars: usize) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.chars().count() >= min_chars)
        .map(str::to_string)
        .collect()
}

/// Truncate to at most `max_chars` characters, never splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Count characters, not bytes (Cyrillic is two bytes per letter in UTF-8)
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
