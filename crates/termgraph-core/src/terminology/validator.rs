//! Terminology gate
//!
//! No extractor runs on unvalidated text. The validator measures the density
//! of domain vocabulary over the significant words of a text and, depending
//! on the mode, blocks forbidden general-psychology vocabulary. Only the
//! density floor is unconditional; forbidden-term blocking is opt-in
//! (strict), contextual (soft) or disabled (smart/off).

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::text;

use super::index::TerminologyIndex;

/// Density floor used by the relaxed (smart) mode all extractors run in
pub const SMART_MIN_DENSITY: f64 = 0.15;

/// Density floor used by the strict mode
pub const STRICT_MIN_DENSITY: f64 = 0.25;

/// Above this density, forbidden usage in soft mode counts as explanatory
const CONTEXTUAL_DENSITY_THRESHOLD: f64 = 0.35;

/// Max char distance between a forbidden term and its replacement (soft mode)
const REPLACEMENT_PROXIMITY_CHARS: usize = 100;

/// Max char distance between a forbidden term and an explanation marker
const MARKER_PROXIMITY_CHARS: usize = 50;

const STOP_WORDS: &[&str] = &[
    "и", "в", "не", "на", "с", "что", "а", "это", "как", "по", "для", "но", "от", "к", "за",
    "из", "или", "то", "же", "так", "вы", "он", "она", "они", "мы", "весь", "уже", "еще",
    "бы", "вот", "когда", "может", "быть", "есть", "был", "была", "были",
];

const EXPLANATION_MARKERS: &[&str] = &[
    "имею в виду",
    "на самом деле",
    "это называется",
    "вместо",
    "заменить на",
    "правильнее говорить",
    "отличие",
    "разница",
    "объясняю",
];

/// Validation mode
///
/// Strict blocks any forbidden term; soft tolerates forbidden terms used in
/// an explanatory context; smart and off ignore forbidden terms entirely.
/// The density floor applies in every mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Strict,
    Smart,
    Soft,
    Off,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Smart => "smart",
            Self::Soft => "soft",
            Self::Off => "off",
        }
    }
}

/// Options for a single validation call
#[derive(Debug, Clone, Copy)]
pub struct ValidationOptions {
    pub min_density: f64,
    pub mode: ValidationMode,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            min_density: STRICT_MIN_DENSITY,
            mode: ValidationMode::Strict,
        }
    }
}

impl ValidationOptions {
    /// The relaxed mode used by all extractors
    pub fn smart() -> Self {
        Self {
            min_density: SMART_MIN_DENSITY,
            mode: ValidationMode::Smart,
        }
    }

    /// Strict forbidden-term blocking with the high density floor
    pub fn strict() -> Self {
        Self {
            min_density: STRICT_MIN_DENSITY,
            mode: ValidationMode::Strict,
        }
    }

    pub fn with_min_density(mut self, min_density: f64) -> Self {
        self.min_density = min_density;
        self
    }
}

/// One matched domain term with its occurrence count and tier
#[derive(Debug, Clone, Serialize)]
pub struct FoundTerm {
    pub term: String,
    pub count: usize,
    pub tier: Option<u8>,
}

/// Outcome of one validation call
///
/// Created fresh per call, never mutated after return. Rejection is a normal
/// outcome: callers branch on `is_valid`, never on errors.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub reason: String,
    pub density: f64,
    pub occurrences: usize,
    pub significant_word_count: usize,
    pub found_terms: Vec<FoundTerm>,
    pub forbidden_terms_found: Vec<String>,
    /// Domain terms present in the text, original casing, first-seen order
    pub entities: Vec<String>,
    /// Soft mode only: forbidden terms were tolerated as explanatory usage
    pub is_contextual: bool,
}

impl ValidationResult {
    fn rejected(reason: String) -> Self {
        Self {
            is_valid: false,
            reason,
            density: 0.0,
            occurrences: 0,
            significant_word_count: 0,
            found_terms: Vec::new(),
            forbidden_terms_found: Vec::new(),
            entities: Vec::new(),
            is_contextual: false,
        }
    }
}

/// The terminology gate
pub struct TerminologyValidator {
    index: Arc<TerminologyIndex>,
}

impl TerminologyValidator {
    pub fn new(index: Arc<TerminologyIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<TerminologyIndex> {
        &self.index
    }

    /// Validate a text against the density floor and the mode's forbidden
    /// policy
    pub fn validate(&self, input: &str, options: ValidationOptions) -> ValidationResult {
        debug!(
            mode = options.mode.as_str(),
            min_density = options.min_density,
            "validating text"
        );

        let tokens = text::hyphen_tokens(input);
        let lemmas: Vec<String> = tokens
            .iter()
            .map(|t| self.index.lemmatizer().lemmatize_term(t))
            .collect();
        let joined_lemmas = lemmas.join(" ");
        let lemma_set: HashSet<&str> = lemmas.iter().map(String::as_str).collect();

        // Strict short-circuits before the density computation: density is
        // expensive and moot once the text is rejected.
        if options.mode == ValidationMode::Strict {
            let forbidden = self.find_forbidden(&joined_lemmas, &lemma_set);
            if !forbidden.is_empty() {
                warn!(?forbidden, "text rejected: forbidden terms (strict)");
                let mut result =
                    ValidationResult::rejected(format!("forbidden terms found: {}", forbidden.join(", ")));
                result.forbidden_terms_found = forbidden;
                return result;
            }
        }

        let significant_word_count = self.count_significant_words(input);
        if significant_word_count == 0 {
            info!("text rejected: no significant words");
            return ValidationResult::rejected("no significant words in text".to_string());
        }

        let found_terms = self.count_term_occurrences(&lemmas, &joined_lemmas);
        let occurrences: usize = found_terms.iter().map(|t| t.count).sum();
        let density = occurrences as f64 / significant_word_count as f64;

        if density < options.min_density {
            info!(density, min_density = options.min_density, "text rejected: low density");
            let mut result = ValidationResult::rejected(format!(
                "insufficient term density: {:.1}% < {:.1}%",
                density * 100.0,
                options.min_density * 100.0
            ));
            result.density = density;
            result.occurrences = occurrences;
            result.significant_word_count = significant_word_count;
            result.found_terms = found_terms;
            return result;
        }

        let entities = self.extract_entities(&joined_lemmas, &lemma_set);
        let forbidden = match options.mode {
            // Already known clean in strict; still recorded for statistics in
            // the other modes.
            ValidationMode::Strict => Vec::new(),
            _ => self.find_forbidden(&joined_lemmas, &lemma_set),
        };

        if options.mode == ValidationMode::Soft && !forbidden.is_empty() {
            if !self.is_contextual_usage(input, &forbidden, density) {
                warn!(?forbidden, "text rejected: forbidden terms outside context (soft)");
                let mut result = ValidationResult::rejected(format!(
                    "forbidden terms outside explanatory context: {}",
                    forbidden.join(", ")
                ));
                result.density = density;
                result.occurrences = occurrences;
                result.significant_word_count = significant_word_count;
                result.found_terms = found_terms;
                result.forbidden_terms_found = forbidden;
                result.entities = entities;
                return result;
            }
            info!(density, "text accepted: forbidden terms in explanatory context");
            return ValidationResult {
                is_valid: true,
                reason: "valid text (forbidden terms used in explanatory context)".to_string(),
                density,
                occurrences,
                significant_word_count,
                found_terms,
                forbidden_terms_found: forbidden,
                entities,
                is_contextual: true,
            };
        }

        info!(density, entities = entities.len(), "text accepted");
        ValidationResult {
            is_valid: true,
            reason: format!(
                "valid text (density: {:.1}%, mode: {})",
                density * 100.0,
                options.mode.as_str()
            ),
            density,
            occurrences,
            significant_word_count,
            found_terms,
            forbidden_terms_found: forbidden,
            entities,
            is_contextual: false,
        }
    }

    /// Whole-word, case-insensitive substitution from the replacement map
    ///
    /// Remediation utility; not part of the gating path.
    pub fn replace_forbidden_terms(&self, input: &str) -> String {
        let mut result = input.to_string();
        for (forbidden, replacement) in self.index.replacements() {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(forbidden));
            if let Ok(re) = Regex::new(&pattern) {
                result = re.replace_all(&result, replacement.as_str()).into_owned();
            }
        }
        result
    }

    fn count_significant_words(&self, input: &str) -> usize {
        text::words(input)
            .iter()
            .filter(|w| !STOP_WORDS.contains(&w.as_str()) && text::char_len(w) > 2)
            .count()
    }

    /// Count lemma occurrences per domain term
    ///
    /// Single-word terms count exact tokens; multi-word terms count
    /// substring matches over the space-joined lemma stream. The substring
    /// scan can collide with accidentally adjacent single-word lemmas; that
    /// behavior is pinned by a regression test.
    fn count_term_occurrences(&self, lemmas: &[String], joined: &str) -> Vec<FoundTerm> {
        let mut found = Vec::new();
        for (lemma, term) in self.index.domain_lemmas() {
            let count = if lemma.contains(' ') || lemma.contains('-') {
                joined.matches(lemma.as_str()).count()
            } else {
                lemmas.iter().filter(|l| *l == lemma).count()
            };
            if count > 0 {
                found.push(FoundTerm {
                    term: term.clone(),
                    count,
                    tier: self.index.term_tier(term),
                });
            }
        }
        found
    }

    /// Domain terms present in the text, longest lemma first so multi-word
    /// terms are not shadowed by their component words
    fn extract_entities(&self, joined: &str, lemma_set: &HashSet<&str>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut entities = Vec::new();
        for (lemma, term) in self.index.domain_lemmas() {
            let present = if lemma.contains(' ') || lemma.contains('-') {
                joined.contains(lemma.as_str())
            } else {
                lemma_set.contains(lemma.as_str())
            };
            if present && seen.insert(term.to_lowercase()) {
                entities.push(term.clone());
            }
        }
        entities
    }

    fn find_forbidden(&self, joined: &str, lemma_set: &HashSet<&str>) -> Vec<String> {
        let mut found = Vec::new();
        for (lemma, term) in self.index.forbidden_lemmas() {
            let present = if lemma.contains(' ') || lemma.contains('-') {
                joined.contains(lemma.as_str())
            } else {
                lemma_set.contains(lemma.as_str())
            };
            if present {
                found.push(term.clone());
            }
        }
        found
    }

    /// Soft mode: is the forbidden usage explanatory rather than doctrinal?
    fn is_contextual_usage(&self, input: &str, forbidden: &[String], density: f64) -> bool {
        if density >= CONTEXTUAL_DENSITY_THRESHOLD {
            return true;
        }

        let lower = input.to_lowercase();

        for term in forbidden {
            let Some(replacement) = self.index.replacements().get(term) else {
                continue;
            };
            if let (Some(term_pos), Some(repl_pos)) = (
                char_position(&lower, &term.to_lowercase()),
                char_position(&lower, &replacement.to_lowercase()),
            ) {
                if term_pos.abs_diff(repl_pos) < REPLACEMENT_PROXIMITY_CHARS {
                    return true;
                }
            }
        }

        for marker in EXPLANATION_MARKERS {
            let Some(marker_pos) = char_position(&lower, marker) else {
                continue;
            };
            for term in forbidden {
                if let Some(term_pos) = char_position(&lower, &term.to_lowercase()) {
                    if marker_pos.abs_diff(term_pos) < MARKER_PROXIMITY_CHARS {
                        return true;
                    }
                }
            }
        }

        false
    }
}

/// First occurrence of `needle` in `haystack`, as a character offset
fn char_position(haystack: &str, needle: &str) -> Option<usize> {
    let byte_pos = haystack.find(needle)?;
    Some(haystack[..byte_pos].chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TerminologyValidator {
        TerminologyValidator::new(Arc::new(TerminologyIndex::builtin().unwrap()))
    }

    const VALID_TEXT: &str = "Ищущий практикует метанаблюдение и разотождествление. \
        Я-образ появляется в поле внимания, но свободное внимание открывает чистое осознавание. \
        Центрирование на присутствии ведёт к ясности.";

    #[test]
    fn test_valid_text_passes_with_high_density() {
        let result = validator().validate(VALID_TEXT, ValidationOptions::default());

        assert!(result.is_valid, "{}", result.reason);
        assert!(result.density >= 0.25, "density was {}", result.density);
        assert!(result.entities.len() >= 5);
        assert!(result.forbidden_terms_found.is_empty());
    }

    #[test]
    fn test_strict_mode_rejects_forbidden_terms() {
        let text = "Клиент испытывает стресс из-за активности эго. \
            Медитация помогает работать с этим состоянием.";
        let result = validator().validate(text, ValidationOptions::strict());

        assert!(!result.is_valid);
        assert!(!result.forbidden_terms_found.is_empty());
        assert!(result.reason.starts_with("forbidden terms found"));
        // Short-circuit: density is not computed on strict rejection.
        assert_eq!(result.density, 0.0);
        assert_eq!(result.significant_word_count, 0);
    }

    #[test]
    fn test_smart_mode_ignores_forbidden_terms() {
        let text = "Клиент практикует метанаблюдение и разотождествление. \
            Я-образ появляется в поле внимания, но свободное внимание открывает чистое осознавание.";
        let result = validator().validate(text, ValidationOptions::smart());

        assert!(result.is_valid, "{}", result.reason);
        // Still recorded for statistics.
        assert_eq!(result.forbidden_terms_found, vec!["клиент".to_string()]);
    }

    #[test]
    fn test_low_density_text_is_rejected() {
        let text = "Человек пришел на встречу и долго рассказывал о своих делах. \
            Он чувствует неудовлетворенность жизнью и хочет перемен. \
            Возможно метанаблюдение поможет, но это лишь одна возможность среди многих.";
        let result = validator().validate(text, ValidationOptions::default().with_min_density(0.25));

        assert!(!result.is_valid);
        assert!(result.density < 0.25);
        assert!(result.reason.starts_with("insufficient term density"));
    }

    #[test]
    fn test_density_monotone_in_threshold() {
        let v = validator();
        let low = v.validate(VALID_TEXT, ValidationOptions::smart().with_min_density(0.1));
        let high = v.validate(VALID_TEXT, ValidationOptions::smart().with_min_density(0.99));

        assert!(low.is_valid);
        assert!(!high.is_valid);
        // Raising the floor never turns an invalid result valid.
        assert!(low.density == high.density);
    }

    #[test]
    fn test_empty_text_is_rejected() {
        let result = validator().validate("", ValidationOptions::smart());
        assert!(!result.is_valid);
        assert_eq!(result.reason, "no significant words in text");

        let result = validator().validate("и на в по", ValidationOptions::smart());
        assert!(!result.is_valid);
    }

    #[test]
    fn test_entities_first_seen_order_and_longest_first() {
        let result = validator().validate(VALID_TEXT, ValidationOptions::smart());

        assert!(result.entities.contains(&"центрирование на присутствии".to_string()));
        assert!(result.entities.contains(&"метанаблюдение".to_string()));
        assert!(result.entities.contains(&"Я-образ".to_string()));

        let mut deduped = result.entities.clone();
        deduped.dedup_by_key(|e| e.to_lowercase());
        assert_eq!(deduped.len(), result.entities.len());
    }

    #[test]
    fn density_counts_multiword_terms_via_joined_stream() {
        // "сталкинг" and "ума" are adjacent tokens once punctuation is
        // stripped, so the joined lemma stream contains the multi-word lemma
        // "сталкинг ума" even though the text never uses the term. Pinned as
        // a regression guard, not an endorsement.
        let text = "Осознавание ведёт к ясности. Практикуя сталкинг, ума достигает присутствие.";
        let result = validator().validate(text, ValidationOptions::smart().with_min_density(0.0));

        assert!(result.found_terms.iter().any(|t| t.term == "сталкинг ума"));
    }

    #[test]
    fn test_soft_mode_accepts_contextual_forbidden_usage() {
        // Replacement ("метанаблюдение" for "медитация") appears right next
        // to the forbidden term.
        let text = "Вместо слова медитация правильнее говорить метанаблюдение. \
            Ищущий практикует разотождествление, и Я-образ растворяется в поле внимания.";
        let options = ValidationOptions {
            min_density: SMART_MIN_DENSITY,
            mode: ValidationMode::Soft,
        };
        let result = validator().validate(text, options);

        assert!(result.is_valid, "{}", result.reason);
        assert!(result.is_contextual);
        assert!(result.forbidden_terms_found.contains(&"медитация".to_string()));
    }

    #[test]
    fn test_soft_mode_rejects_plain_forbidden_usage() {
        let text = "Эго мешает человеку. Практикуйте осознавание и метанаблюдение, \
            чтобы прийти к присутствию и ясности.";
        let options = ValidationOptions {
            min_density: 0.1,
            mode: ValidationMode::Soft,
        };
        let result = validator().validate(text, options);

        assert!(!result.is_valid);
        assert!(result.reason.starts_with("forbidden terms outside explanatory context"));
    }

    #[test]
    fn test_replace_forbidden_terms() {
        let v = validator();
        let replaced = v.replace_forbidden_terms("Медитация успокаивает. Клиент доволен эго.");

        assert!(replaced.contains("метанаблюдение") || replaced.contains("Метанаблюдение"));
        assert!(replaced.contains("Ищущий"));
        assert!(replaced.contains("Я-образ"));
        assert!(!replaced.to_lowercase().contains("клиент"));
    }

    #[test]
    fn test_found_terms_carry_tiers() {
        let result = validator().validate(VALID_TEXT, ValidationOptions::smart());
        let meta = result
            .found_terms
            .iter()
            .find(|t| t.term == "метанаблюдение")
            .unwrap();
        assert_eq!(meta.tier, Some(3));
    }
}
