//! Narrative pattern extraction
//!
//! Recognizes instances of a small closed set of narrative patterns
//! (observation-awareness-transformation triads, attention work,
//! disidentification, awareness states) inside validated text. Rule-based:
//! a category is relevant when at least one of its key terms was validated
//! as an entity, and a sentence yields a pattern when at least two category
//! terms and two entities meet in it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::terminology::{
    TerminologyIndex, TerminologyValidator, ValidationOptions, ValidationResult,
};
use crate::text;

/// Sentences shorter than this are ignored
const MIN_SENTENCE_CHARS: usize = 10;

/// Minimum category key terms that must co-occur in one sentence
const MIN_MATCHING_TERMS: usize = 2;

/// Minimum validated entities that must co-occur in one sentence
const MIN_SENTENCE_ENTITIES: usize = 2;

/// The closed set of pattern categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    /// Observation -> awareness -> transformation
    TransformationTriad,
    /// Capture, release and widening of the attention field
    AttentionWork,
    /// Separation from the self-image
    Disidentification,
    /// States of pure awareness and presence
    AwarenessStates,
}

impl PatternCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransformationTriad => "transformation_triad",
            Self::AttentionWork => "attention_work",
            Self::Disidentification => "disidentification",
            Self::AwarenessStates => "awareness_states",
        }
    }

    pub fn all() -> &'static [PatternCategory] {
        &[
            Self::TransformationTriad,
            Self::AttentionWork,
            Self::Disidentification,
            Self::AwarenessStates,
        ]
    }
}

impl std::fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct CategoryRule {
    category: PatternCategory,
    key_terms: &'static [&'static str],
    typical_context: &'static str,
    marker_keywords: &'static [&'static str],
}

const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: PatternCategory::TransformationTriad,
        key_terms: &["наблюдение", "осознавание", "трансформация", "метанаблюдение"],
        typical_context: "В процессе практики метанаблюдения",
        marker_keywords: &["наблюдать", "осознавать", "замечать", "видеть"],
    },
    CategoryRule {
        category: PatternCategory::AttentionWork,
        key_terms: &[
            "поле внимания",
            "свободное внимание",
            "захват внимания",
            "расширение поля",
            "поле восприятия",
        ],
        typical_context: "При работе с полем внимания",
        marker_keywords: &["внимание", "поле", "расширяется", "сужается"],
    },
    CategoryRule {
        category: PatternCategory::Disidentification,
        key_terms: &[
            "разотождествление",
            "Я-образ",
            "идентификация",
            "наблюдающее сознание",
            "ложная самость",
        ],
        typical_context: "В процессе разотождествления с Я-образом",
        marker_keywords: &["отделение", "дистанция", "наблюдатель"],
    },
    CategoryRule {
        category: PatternCategory::AwarenessStates,
        key_terms: &[
            "чистое осознавание",
            "присутствие",
            "живое переживание",
            "здесь-и-сейчас",
            "пробуждение",
            "прозрение",
        ],
        typical_context: "В состоянии чистого присутствия",
        marker_keywords: &["присутствие", "ясность", "пробуждение"],
    },
];

/// Practices a pattern can relate to
const PRACTICE_TERMS: &[&str] = &[
    "метанаблюдение",
    "разотождествление",
    "центрирование",
    "интеграция опыта",
    "центрирование на присутствии",
];

/// One recognized pattern instance
#[derive(Debug, Clone, Serialize)]
pub struct Pattern {
    pub category: PatternCategory,
    pub name: String,
    pub description: String,
    pub key_terms: Vec<String>,
    pub context: String,
    pub recognition_markers: Vec<String>,
    pub related_practices: Vec<String>,
    pub source_quote: String,
    pub confidence: f64,
}

/// Result of one pattern extraction call
#[derive(Debug, Clone, Serialize)]
pub struct PatternExtraction {
    pub valid: bool,
    pub reason: String,
    pub patterns: Vec<Pattern>,
    pub density: f64,
    pub categories_found: Vec<PatternCategory>,
}

impl PatternExtraction {
    fn rejected(reason: String, density: f64) -> Self {
        Self {
            valid: false,
            reason,
            patterns: Vec::new(),
            density,
            categories_found: Vec::new(),
        }
    }
}

/// Rule-based pattern extractor
pub struct PatternExtractor {
    validator: TerminologyValidator,
}

impl PatternExtractor {
    pub fn new(index: Arc<TerminologyIndex>) -> Self {
        Self {
            validator: TerminologyValidator::new(index),
        }
    }

    /// Gate the text (smart mode) and extract patterns
    pub fn extract(
        &self,
        input: &str,
        min_density: f64,
        categories: Option<&[PatternCategory]>,
    ) -> PatternExtraction {
        let validation = self
            .validator
            .validate(input, ValidationOptions::smart().with_min_density(min_density));
        self.extract_validated(input, &validation, categories)
    }

    /// Extract patterns from already-validated text
    ///
    /// The orchestrator validates once and feeds the same result to all
    /// three extractors.
    pub fn extract_validated(
        &self,
        input: &str,
        validation: &ValidationResult,
        categories: Option<&[PatternCategory]>,
    ) -> PatternExtraction {
        if !validation.is_valid {
            warn!(reason = %validation.reason, "pattern extraction skipped: validation failed");
            return PatternExtraction::rejected(validation.reason.clone(), validation.density);
        }

        let entities_lower: Vec<String> =
            validation.entities.iter().map(|e| e.to_lowercase()).collect();

        let relevant: Vec<&CategoryRule> = CATEGORY_RULES
            .iter()
            .filter(|rule| {
                categories
                    .map(|wanted| wanted.contains(&rule.category))
                    .unwrap_or(true)
            })
            .filter(|rule| {
                rule.key_terms
                    .iter()
                    .any(|term| entities_lower.contains(&term.to_lowercase()))
            })
            .collect();

        if relevant.is_empty() {
            debug!("no relevant pattern categories");
            return PatternExtraction {
                valid: true,
                reason: "no relevant pattern categories found".to_string(),
                patterns: Vec::new(),
                density: validation.density,
                categories_found: Vec::new(),
            };
        }

        let sentences = text::sentences(input, MIN_SENTENCE_CHARS);
        let mut patterns = Vec::new();

        for rule in &relevant {
            for sentence in &sentences {
                let sentence_lower = sentence.to_lowercase();

                let matching: Vec<&str> = rule
                    .key_terms
                    .iter()
                    .copied()
                    .filter(|term| sentence_lower.contains(&term.to_lowercase()))
                    .collect();
                if matching.len() < MIN_MATCHING_TERMS {
                    continue;
                }

                if let Some(pattern) =
                    self.pattern_from_sentence(sentence, &sentence_lower, rule, &validation.entities)
                {
                    patterns.push(pattern);
                }
            }
        }

        let mut categories_found = Vec::new();
        for pattern in &patterns {
            if !categories_found.contains(&pattern.category) {
                categories_found.push(pattern.category);
            }
        }

        info!(
            patterns = patterns.len(),
            categories = categories_found.len(),
            "pattern extraction complete"
        );

        PatternExtraction {
            valid: true,
            reason: format!("extracted {} patterns", patterns.len()),
            patterns,
            density: validation.density,
            categories_found,
        }
    }

    fn pattern_from_sentence(
        &self,
        sentence: &str,
        sentence_lower: &str,
        rule: &CategoryRule,
        entities: &[String],
    ) -> Option<Pattern> {
        let sentence_entities: Vec<String> = entities
            .iter()
            .filter(|e| sentence_lower.contains(&e.to_lowercase()))
            .cloned()
            .collect();
        if sentence_entities.len() < MIN_SENTENCE_ENTITIES {
            return None;
        }

        let matching: Vec<&str> = rule
            .key_terms
            .iter()
            .copied()
            .filter(|term| sentence_lower.contains(&term.to_lowercase()))
            .collect();

        let name = match matching.as_slice() {
            [first, second, ..] => format!("{first} и {second}"),
            [only] => (*only).to_string(),
            [] => "паттерн нейро-сталкинга".to_string(),
        };

        let recognition_markers = {
            let markers: Vec<String> = rule
                .marker_keywords
                .iter()
                .filter(|kw| sentence_lower.contains(**kw))
                .map(|kw| format!("присутствует '{kw}'"))
                .collect();
            if markers.is_empty() {
                vec!["прямое описание процесса".to_string()]
            } else {
                markers
            }
        };

        let related_practices = {
            let practices: Vec<String> = sentence_entities
                .iter()
                .filter(|e| {
                    PRACTICE_TERMS
                        .iter()
                        .any(|p| p.to_lowercase() == e.to_lowercase())
                })
                .cloned()
                .collect();
            if practices.is_empty() {
                vec!["метанаблюдение".to_string()]
            } else {
                practices
            }
        };

        let confidence = (0.15 * sentence_entities.len() as f64).min(0.7)
            + (0.1 * matching.len() as f64).min(0.3);

        Some(Pattern {
            category: rule.category,
            name,
            description: sentence.trim().to_string(),
            key_terms: sentence_entities,
            context: rule.typical_context.to_string(),
            recognition_markers,
            related_practices,
            source_quote: sentence.trim().to_string(),
            confidence: confidence.min(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> PatternExtractor {
        PatternExtractor::new(Arc::new(TerminologyIndex::builtin().unwrap()))
    }

    const TRIAD_TEXT: &str = "Наблюдение переходит в осознавание, и осознавание завершается \
        трансформацией всего восприятия. Ищущий практикует метанаблюдение в поле внимания.";

    #[test]
    fn test_extracts_triad_pattern() {
        let result = extractor().extract(TRIAD_TEXT, 0.15, None);

        assert!(result.valid, "{}", result.reason);
        assert!(!result.patterns.is_empty());
        assert!(result
            .categories_found
            .contains(&PatternCategory::TransformationTriad));

        let pattern = &result.patterns[0];
        assert_eq!(pattern.name, "наблюдение и осознавание");
        assert!(pattern.key_terms.len() >= 2);
        assert!(pattern.confidence > 0.0 && pattern.confidence <= 1.0);
        assert!(!pattern.related_practices.is_empty());
    }

    #[test]
    fn test_invalid_text_returns_validator_reason() {
        let result = extractor().extract("Сегодня хорошая погода для прогулки по парку", 0.15, None);

        assert!(!result.valid);
        assert!(result.patterns.is_empty());
        assert!(result.reason.starts_with("insufficient term density"));
    }

    #[test]
    fn test_category_filter_excludes_others() {
        let result = extractor().extract(TRIAD_TEXT, 0.15, Some(&[PatternCategory::AttentionWork]));

        assert!(result.valid);
        assert!(result
            .patterns
            .iter()
            .all(|p| p.category == PatternCategory::AttentionWork));
    }

    #[test]
    fn test_confidence_formula() {
        let result = extractor().extract(TRIAD_TEXT, 0.15, None);
        let pattern = &result.patterns[0];

        let expected = (0.15 * pattern.key_terms.len() as f64).min(0.7)
            + (0.1_f64 * 2.0).min(0.3);
        assert!((pattern.confidence - expected.min(1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_single_category_term_sentence_yields_nothing() {
        // Dense enough to validate, but no sentence carries two key terms of
        // one category together with two entities.
        let text = "Ищущий осваивает центрирование. Свидетель наблюдает спокойно.";
        let result = extractor().extract(text, 0.15, None);

        assert!(result.valid, "{}", result.reason);
        assert!(result.patterns.is_empty());
    }
}
