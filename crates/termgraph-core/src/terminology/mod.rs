//! Terminology vocabulary, lemmatization and the validation gate
//!
//! The index loads three vocabularies once and answers lemma-normalized
//! membership queries; the validator gates every downstream extractor by
//! measuring domain-term density. The lemmatizer is a trait seam so a
//! morphological analyzer can be plugged in later; the shipped default
//! degrades to case-insensitive exact matching.

mod index;
mod lemma;
mod validator;

pub use index::{
    DomainTerms, ForbiddenTerms, TermCategories, TermInfo, TermLevel, TermTier, TerminologyIndex,
};
pub use lemma::{CaseFold, DictionaryLemmatizer, Lemmatizer};
pub use validator::{
    FoundTerm, TerminologyValidator, ValidationMode, ValidationOptions, ValidationResult,
    SMART_MIN_DENSITY, STRICT_MIN_DENSITY,
};
