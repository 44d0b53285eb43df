//! Causal chain extraction
//!
//! Finds multi-stage process descriptions and expresses them as a stage
//! lattice, not a strict linear chain: each stage records predecessor and
//! successor links (`emerges_from`/`enables`), supports cyclical processes
//! and carries wholeness markers. The rule-based builder only ever produces
//! adjacency links, but the data model permits non-linear lattices so a
//! richer builder can populate it without a schema change.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::terminology::{
    TerminologyIndex, TerminologyValidator, ValidationOptions, ValidationResult,
};
use crate::text;

/// A chain must accumulate this many distinct domain terms across stages
const MIN_CHAIN_TERMS: usize = 3;

/// Sentences shorter than this are ignored
const MIN_SENTENCE_CHARS: usize = 10;

/// Context excerpt length in characters
const CONTEXT_CHARS: usize = 200;

/// Source quote cap in characters
const QUOTE_CHARS: usize = 500;

/// The closed set of process categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessCategory {
    TransformationTriad,
    AttentionWork,
    Disidentification,
    Awakening,
    WholenessIntegration,
}

impl ProcessCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransformationTriad => "transformation_triad",
            Self::AttentionWork => "attention_work",
            Self::Disidentification => "disidentification",
            Self::Awakening => "awakening",
            Self::WholenessIntegration => "wholeness_integration",
        }
    }

    pub fn all() -> &'static [ProcessCategory] {
        &[
            Self::TransformationTriad,
            Self::AttentionWork,
            Self::Disidentification,
            Self::Awakening,
            Self::WholenessIntegration,
        ]
    }
}

impl std::fmt::Display for ProcessCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct CategoryRule {
    category: ProcessCategory,
    key_terms: &'static [&'static str],
}

const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: ProcessCategory::TransformationTriad,
        key_terms: &[
            "метанаблюдение",
            "наблюдение",
            "осознавание",
            "трансформация",
            "чистое осознавание",
            "свидетельствование",
        ],
    },
    CategoryRule {
        category: ProcessCategory::AttentionWork,
        key_terms: &[
            "поле внимания",
            "свободное внимание",
            "захват внимания",
            "центрирование",
            "присутствие",
            "расширение поля",
            "поле восприятия",
        ],
    },
    CategoryRule {
        category: ProcessCategory::Disidentification,
        key_terms: &[
            "разотождествление",
            "Я-образ",
            "идентификация",
            "ложная самость",
            "автоматизмы психики",
            "наблюдающее сознание",
        ],
    },
    CategoryRule {
        category: ProcessCategory::Awakening,
        key_terms: &[
            "пробуждение",
            "реализация",
            "прозрение",
            "ясность",
            "живое переживание",
            "бытие",
        ],
    },
    CategoryRule {
        category: ProcessCategory::WholenessIntegration,
        key_terms: &[
            "интеграция",
            "целостность",
            "самодостаточность",
            "гомеостаз",
            "эмерджентность",
            "интеграция опыта",
        ],
    },
];

struct PracticeRule {
    name: &'static str,
    triggers: &'static [&'static str],
    outcome: &'static str,
}

const PRACTICE_RULES: &[PracticeRule] = &[
    PracticeRule {
        name: "метанаблюдение",
        triggers: &["автоматическая реакция", "захват внимания", "отождествление"],
        outcome: "выход из автоматизма в осознанность",
    },
    PracticeRule {
        name: "центрирование",
        triggers: &["потеря присутствия", "рассеянность", "захваченность"],
        outcome: "возвращение к центру, стабилизация внимания",
    },
    PracticeRule {
        name: "разотождествление",
        triggers: &["отождествление с Я-образом", "эмоциональная захваченность"],
        outcome: "свобода от ложной идентификации",
    },
    PracticeRule {
        name: "интеграция опыта",
        triggers: &["инсайт", "новое осознание", "трансформативный опыт"],
        outcome: "укоренение нового понимания в практике",
    },
    PracticeRule {
        name: "свидетельствование",
        triggers: &["внутренний процесс", "эмоция", "мысль"],
        outcome: "непривязанное наблюдение, ясность",
    },
];

const CYCLICAL_MARKERS: &[&str] = &[
    "снова",
    "возвращается",
    "спираль",
    "цикл",
    "вновь",
    "повторяется",
    "периодически",
    "раз за разом",
    "каждый раз",
];

const WHOLENESS_MARKERS: &[&str] = &[
    "целостность",
    "интеграция",
    "эмерджентность",
    "единство",
    "всё вместе",
    "как одно",
    "нераздельность",
    "полнота",
];

/// One stage of a process
///
/// `emerges_from`/`enables` hold 1-based stage indices. The builder writes
/// only the adjacent neighbors, but the fields are lists on purpose.
#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    pub index: usize,
    pub name: String,
    pub description: String,
    pub terms: Vec<String>,
    pub emerges_from: Option<Vec<usize>>,
    pub enables: Option<Vec<usize>>,
}

/// A practice applicable at a specific stage
#[derive(Debug, Clone, Serialize)]
pub struct InterventionPoint {
    pub stage_index: usize,
    pub practice_name: String,
    pub triggers: Vec<String>,
    pub expected_outcome: String,
}

/// A systemic transformation process
#[derive(Debug, Clone, Serialize)]
pub struct CausalChain {
    pub process_name: String,
    pub category: ProcessCategory,
    pub stages: Vec<Stage>,
    pub intervention_points: Vec<InterventionPoint>,
    pub context: String,
    pub source_quote: String,
    pub confidence: f64,
    pub is_cyclical: bool,
    pub wholeness_markers: Vec<String>,
    pub term_density: f64,
}

/// Result of one chain extraction call
#[derive(Debug, Clone, Serialize)]
pub struct ChainExtraction {
    pub valid: bool,
    pub reason: String,
    pub chains: Vec<CausalChain>,
    pub density: f64,
}

/// Options for one extraction call
#[derive(Debug, Clone, Copy)]
pub struct ChainOptions {
    pub specific_category: Option<ProcessCategory>,
    pub min_stages: usize,
    pub max_stages: usize,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            specific_category: None,
            min_stages: 2,
            max_stages: 10,
        }
    }
}

/// Rule-based causal chain extractor
pub struct CausalChainExtractor {
    validator: TerminologyValidator,
}

impl CausalChainExtractor {
    pub fn new(index: Arc<TerminologyIndex>) -> Self {
        Self {
            validator: TerminologyValidator::new(index),
        }
    }

    /// Gate the text (smart mode: forbidden terms never block chain
    /// extraction) and extract chains
    pub fn extract(&self, input: &str, options: ChainOptions) -> ChainExtraction {
        let validation = self.validator.validate(input, ValidationOptions::smart());
        self.extract_validated(input, &validation, options)
    }

    /// Extract chains from already-validated text
    pub fn extract_validated(
        &self,
        input: &str,
        validation: &ValidationResult,
        options: ChainOptions,
    ) -> ChainExtraction {
        if !validation.is_valid {
            warn!(reason = %validation.reason, "chain extraction skipped: validation failed");
            return ChainExtraction {
                valid: false,
                reason: validation.reason.clone(),
                chains: Vec::new(),
                density: validation.density,
            };
        }

        let entities_lower: HashSet<String> =
            validation.entities.iter().map(|e| e.to_lowercase()).collect();

        let relevant: Vec<&CategoryRule> = CATEGORY_RULES
            .iter()
            .filter(|rule| {
                options
                    .specific_category
                    .map(|wanted| wanted == rule.category)
                    .unwrap_or(true)
            })
            .filter(|rule| {
                let matches = rule
                    .key_terms
                    .iter()
                    .filter(|term| entities_lower.contains(&term.to_lowercase()))
                    .count();
                matches >= 2
            })
            .collect();

        if relevant.is_empty() {
            debug!("no relevant process categories");
            return ChainExtraction {
                valid: true,
                reason: "no relevant process categories found".to_string(),
                chains: Vec::new(),
                density: validation.density,
            };
        }

        let sentences = text::sentences(input, MIN_SENTENCE_CHARS);
        let mut chains = Vec::new();

        for rule in &relevant {
            let category_sentences: Vec<&String> = sentences
                .iter()
                .filter(|sentence| {
                    let lower = sentence.to_lowercase();
                    let has_category_term = rule
                        .key_terms
                        .iter()
                        .any(|term| lower.contains(&term.to_lowercase()));
                    let has_entity = validation
                        .entities
                        .iter()
                        .any(|e| lower.contains(&e.to_lowercase()));
                    has_category_term || has_entity
                })
                .collect();

            if category_sentences.len() < options.min_stages {
                debug!(
                    category = rule.category.as_str(),
                    sentences = category_sentences.len(),
                    "not enough sentences for a chain"
                );
                continue;
            }

            let taken: Vec<&String> = category_sentences
                .into_iter()
                .take(options.max_stages)
                .collect();

            if let Some(chain) =
                self.build_chain(&taken, rule, input, &validation.entities, validation.density)
            {
                if chain.stages.len() >= options.min_stages && self.chain_has_enough_terms(&chain) {
                    debug!(
                        category = rule.category.as_str(),
                        stages = chain.stages.len(),
                        "chain built"
                    );
                    chains.push(chain);
                }
            }
        }

        info!(chains = chains.len(), "chain extraction complete");
        ChainExtraction {
            valid: true,
            reason: format!("extracted {} chains", chains.len()),
            chains,
            density: validation.density,
        }
    }

    fn build_chain(
        &self,
        sentences: &[&String],
        rule: &CategoryRule,
        full_text: &str,
        entities: &[String],
        density: f64,
    ) -> Option<CausalChain> {
        if sentences.is_empty() {
            return None;
        }

        let total = sentences.len();
        let mut stages = Vec::with_capacity(total);
        let mut all_terms = Vec::new();

        for (i, sentence) in sentences.iter().enumerate() {
            let index = i + 1;
            let lower = sentence.to_lowercase();
            let stage_terms: Vec<String> = entities
                .iter()
                .filter(|e| lower.contains(&e.to_lowercase()))
                .cloned()
                .collect();
            all_terms.extend(stage_terms.clone());

            let name = self.stage_name(&stage_terms, rule);

            stages.push(Stage {
                index,
                name,
                description: sentence.trim().to_string(),
                terms: stage_terms,
                emerges_from: (index > 1).then(|| vec![index - 1]),
                enables: (index < total).then(|| vec![index + 1]),
            });
        }

        let intervention_points = self.find_intervention_points(&stages, &all_terms);
        let joined = sentences
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let joined_lower = joined.to_lowercase();

        let is_cyclical = CYCLICAL_MARKERS.iter().any(|m| joined_lower.contains(m));
        let wholeness_markers: Vec<String> = WHOLENESS_MARKERS
            .iter()
            .filter(|m| joined_lower.contains(**m))
            .map(|m| m.to_string())
            .collect();

        let confidence = self.chain_confidence(&stages, &all_terms);

        Some(CausalChain {
            process_name: self.process_name(&stages, rule.category),
            category: rule.category,
            stages,
            intervention_points,
            context: text::truncate_chars(full_text, CONTEXT_CHARS).trim().to_string(),
            source_quote: text::truncate_chars(&joined, QUOTE_CHARS).to_string(),
            confidence,
            is_cyclical,
            wholeness_markers,
            term_density: density,
        })
    }

    /// Stage name: prefer a category term, then any term, then a generic
    /// label
    fn stage_name(&self, stage_terms: &[String], rule: &CategoryRule) -> String {
        for term in stage_terms {
            if rule
                .key_terms
                .iter()
                .any(|kt| kt.to_lowercase() == term.to_lowercase())
            {
                return term.clone();
            }
        }
        stage_terms
            .first()
            .cloned()
            .unwrap_or_else(|| "этап процесса".to_string())
    }

    fn find_intervention_points(
        &self,
        stages: &[Stage],
        all_terms: &[String],
    ) -> Vec<InterventionPoint> {
        let all_terms_lower: HashSet<String> =
            all_terms.iter().map(|t| t.to_lowercase()).collect();

        let mut points = Vec::new();
        for practice in PRACTICE_RULES {
            if !all_terms_lower.contains(practice.name) {
                continue;
            }
            // Attach at the first stage mentioning the practice.
            let first_stage = stages.iter().find(|stage| {
                stage
                    .terms
                    .iter()
                    .any(|t| t.to_lowercase() == practice.name)
            });
            if let Some(stage) = first_stage {
                points.push(InterventionPoint {
                    stage_index: stage.index,
                    practice_name: practice.name.to_string(),
                    triggers: practice.triggers.iter().map(|t| t.to_string()).collect(),
                    expected_outcome: practice.outcome.to_string(),
                });
            }
        }
        points
    }

    fn process_name(&self, stages: &[Stage], category: ProcessCategory) -> String {
        let names: Vec<&str> = stages.iter().take(3).map(|s| s.name.as_str()).collect();
        match names.as_slice() {
            [first, second, ..] => format!("{first} → {second}"),
            [only] => format!("Процесс: {only}"),
            [] => format!("Процесс {}", category.as_str()),
        }
    }

    /// Confidence: 0.5 base, +0.05 per stage (cap 0.2), +0.02 per term
    /// (cap 0.2), +0.05 per stage with systemic links (cap 0.1)
    fn chain_confidence(&self, stages: &[Stage], all_terms: &[String]) -> f64 {
        let stages_bonus = (stages.len() as f64 * 0.05).min(0.2);
        let terms_bonus = (all_terms.len() as f64 * 0.02).min(0.2);
        let systemic_links = stages
            .iter()
            .filter(|s| s.emerges_from.is_some() || s.enables.is_some())
            .count();
        let systemic_bonus = (systemic_links as f64 * 0.05).min(0.1);

        (0.5 + stages_bonus + terms_bonus + systemic_bonus).min(1.0)
    }

    /// A chain needs at least three distinct domain terms across its stages,
    /// counted chain-wide rather than per sentence
    fn chain_has_enough_terms(&self, chain: &CausalChain) -> bool {
        let distinct: HashSet<String> = chain
            .stages
            .iter()
            .flat_map(|s| s.terms.iter())
            .map(|t| t.to_lowercase())
            .collect();

        if distinct.len() < MIN_CHAIN_TERMS {
            debug!(
                terms = distinct.len(),
                "chain rejected: not enough distinct terms"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> CausalChainExtractor {
        CausalChainExtractor::new(Arc::new(TerminologyIndex::builtin().unwrap()))
    }

    const PROCESS_TEXT: &str = "Сначала Ищущий практикует метанаблюдение за потоком восприятия. \
        Затем приходит осознавание, и захват внимания ослабевает. \
        Через разотождествление раскрывается чистое осознавание. \
        Каждый раз процесс повторяется снова, как спираль, и целостность углубляется.";

    #[test]
    fn test_extracts_chain_with_adjacent_links() {
        let result = extractor().extract(PROCESS_TEXT, ChainOptions::default());

        assert!(result.valid, "{}", result.reason);
        assert!(!result.chains.is_empty());

        let chain = &result.chains[0];
        assert!(chain.stages.len() >= 2);

        let first = &chain.stages[0];
        let last = chain.stages.last().unwrap();
        assert_eq!(first.emerges_from, None);
        assert_eq!(first.enables, Some(vec![2]));
        assert_eq!(last.enables, None);
        assert_eq!(last.emerges_from, Some(vec![last.index - 1]));

        for window in chain.stages.windows(2) {
            assert_eq!(window[1].emerges_from, Some(vec![window[0].index]));
        }
    }

    #[test]
    fn test_detects_cyclicality_and_wholeness() {
        let result = extractor().extract(PROCESS_TEXT, ChainOptions::default());
        let chain = &result.chains[0];

        assert!(chain.is_cyclical);
        assert!(chain.wholeness_markers.contains(&"целостность".to_string()));
    }

    #[test]
    fn test_intervention_points_attach_to_first_mention() {
        let result = extractor().extract(PROCESS_TEXT, ChainOptions::default());
        let chain = &result.chains[0];

        let meta = chain
            .intervention_points
            .iter()
            .find(|p| p.practice_name == "метанаблюдение")
            .expect("метанаблюдение intervention point");
        let first_mention = chain
            .stages
            .iter()
            .find(|s| s.terms.iter().any(|t| t == "метанаблюдение"))
            .unwrap();
        assert_eq!(meta.stage_index, first_mention.index);
        assert!(!meta.triggers.is_empty());
    }

    #[test]
    fn test_confidence_formula() {
        let result = extractor().extract(PROCESS_TEXT, ChainOptions::default());
        let chain = &result.chains[0];

        let term_count: usize = chain.stages.iter().map(|s| s.terms.len()).sum();
        let expected = 0.5
            + (chain.stages.len() as f64 * 0.05).min(0.2)
            + (term_count as f64 * 0.02).min(0.2)
            + (chain.stages.len() as f64 * 0.05).min(0.1);
        assert!((chain.confidence - expected.min(1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_specific_category_filter() {
        let result = extractor().extract(
            PROCESS_TEXT,
            ChainOptions {
                specific_category: Some(ProcessCategory::Disidentification),
                ..Default::default()
            },
        );

        assert!(result.valid);
        assert!(result
            .chains
            .iter()
            .all(|c| c.category == ProcessCategory::Disidentification));
    }

    #[test]
    fn test_invalid_text_yields_no_chains() {
        let result = extractor().extract("Обычный рассказ о погоде и планах на выходные без темы", ChainOptions::default());

        assert!(!result.valid);
        assert!(result.chains.is_empty());
    }

    #[test]
    fn test_sparse_chain_is_discarded() {
        // Enough qualifying sentences but fewer than three distinct terms.
        let text = "Метанаблюдение раскрывается постепенно. \
            Метанаблюдение углубляется ежедневно. Практикуется свидетельствование.";
        let result = extractor().extract(text, ChainOptions::default());

        assert!(result.valid, "{}", result.reason);
        assert!(result.chains.is_empty());
    }

    #[test]
    fn test_max_stages_is_respected() {
        let result = extractor().extract(
            PROCESS_TEXT,
            ChainOptions {
                max_stages: 2,
                ..Default::default()
            },
        );

        for chain in &result.chains {
            assert!(chain.stages.len() <= 2);
        }
    }
}
