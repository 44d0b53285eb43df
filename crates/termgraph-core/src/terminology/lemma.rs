//! Lemmatization seam for vocabulary matching
//!
//! Matching inflected Russian word forms against the vocabulary needs a
//! morphological analyzer. None is assumed to exist: the default
//! [`CaseFold`] implementation degrades to case-insensitive exact matching,
//! which loses recall on inflected forms but keeps the pipeline available.
//! A dictionary-backed analyzer can be injected without touching any
//! matching logic.

use std::collections::HashMap;

/// Reduces a single word to its dictionary form
pub trait Lemmatizer: Send + Sync {
    /// Lemma of one word (no separators). Implementations must lowercase.
    fn lemma_of(&self, word: &str) -> String;

    /// Lemma of a term that may contain spaces or hyphens
    ///
    /// Each component word is lemmatized independently and rejoined with
    /// the original separator, so "поле внимания" and "Я-образ" both keep
    /// their shape.
    fn lemmatize_term(&self, term: &str) -> String {
        if term.contains(' ') {
            return term
                .split(' ')
                .map(|part| self.lemmatize_term(part))
                .collect::<Vec<_>>()
                .join(" ");
        }
        if term.contains('-') {
            return term
                .split('-')
                .map(|part| self.lemma_of(part))
                .collect::<Vec<_>>()
                .join("-");
        }
        self.lemma_of(term)
    }
}

/// Availability fallback: lowercase only, no morphology
///
/// This is the default. Recall on inflected forms is reduced; the trade-off
/// is documented in the validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseFold;

impl Lemmatizer for CaseFold {
    fn lemma_of(&self, word: &str) -> String {
        word.to_lowercase()
    }
}

/// Dictionary-backed lemmatizer
///
/// Maps known inflected forms to their normal form; unknown words fall back
/// to lowercasing. Useful for tests and for wiring in an externally built
/// morphological dictionary.
#[derive(Debug, Clone, Default)]
pub struct DictionaryLemmatizer {
    forms: HashMap<String, String>,
}

impl DictionaryLemmatizer {
    pub fn new(forms: HashMap<String, String>) -> Self {
        let forms = forms
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
            .collect();
        Self { forms }
    }
}

impl Lemmatizer for DictionaryLemmatizer {
    fn lemma_of(&self, word: &str) -> String {
        let lower = word.to_lowercase();
        self.forms.get(&lower).cloned().unwrap_or(lower)
    }
}
