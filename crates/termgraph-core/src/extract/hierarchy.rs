//! Concept hierarchy extraction
//!
//! Builds a strict five-level tree (root -> domain -> practice -> technique
//! -> exercise) plus same-level cross-connections, and rejects any result
//! violating the tree invariants instead of repairing it. The root may only
//! be one of three canonical terms.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::terminology::{
    TermLevel, TerminologyIndex, TerminologyValidator, ValidationOptions, ValidationResult,
};
use crate::text;

/// The only names a hierarchy root may carry
pub const ALLOWED_ROOTS: &[&str] = &["нейро-сталкинг", "нео-сталкинг", "сталкинг ума"];

/// A hierarchy must reference at least this many distinct domain terms
const MIN_HIERARCHY_TERMS: usize = 3;

/// Russian duration phrasing, e.g. "10 минут", "1.5 часа"
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d\-.]*\s*(?:минут|час|секунд)[а-яё]*)").unwrap());

/// Russian frequency phrasing, e.g. "3 раза в день"
static FREQUENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\s*раза?\s*(?:в|на)\s*(?:день|неделю|месяц))").unwrap());

/// Markers of an imperative exercise sentence
const EXERCISE_MARKERS: &[&str] = &[
    "практикуй",
    "делай",
    "попробуй",
    "упражнение",
    "тренируй",
    "выполняй",
    "наблюдай",
];

/// Level of a node within the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    Root,
    Domain,
    Practice,
    Technique,
    Exercise,
}

impl HierarchyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Domain => "domain",
            Self::Practice => "practice",
            Self::Technique => "technique",
            Self::Exercise => "exercise",
        }
    }
}

impl std::fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relation of a cross-connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossRelation {
    Enables,
    Requires,
    LeadsTo,
    TransformsInto,
}

impl CrossRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enables => "enables",
            Self::Requires => "requires",
            Self::LeadsTo => "leads_to",
            Self::TransformsInto => "transforms_into",
        }
    }
}

struct RelationRule {
    relation: CrossRelation,
    markers: &'static [&'static str],
}

const RELATION_RULES: &[RelationRule] = &[
    RelationRule {
        relation: CrossRelation::Enables,
        markers: &["делает возможным", "позволяет", "открывает путь к"],
    },
    RelationRule {
        relation: CrossRelation::Requires,
        markers: &["требует", "необходимо", "нужно сначала"],
    },
    RelationRule {
        relation: CrossRelation::LeadsTo,
        markers: &["ведёт к", "приводит к", "результат"],
    },
    RelationRule {
        relation: CrossRelation::TransformsInto,
        markers: &["трансформируется в", "переходит в", "становится"],
    },
];

/// A node in the concept hierarchy
///
/// Every non-root node names exactly one parent (tree, not DAG). Exercise
/// nodes additionally carry duration, frequency and instructions.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptNode {
    pub name: String,
    pub level: HierarchyLevel,
    pub parent: Option<String>,
    pub relation_type: String,
    pub description: String,
    pub terms: Vec<String>,
    pub tier: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// A same-level, non-hierarchical relation between two concepts
#[derive(Debug, Clone, Serialize)]
pub struct CrossConnection {
    pub from: String,
    pub to: String,
    pub relation: CrossRelation,
    pub explanation: String,
    pub context: String,
}

/// The full five-level hierarchy
#[derive(Debug, Clone, Serialize)]
pub struct ConceptHierarchy {
    pub root: ConceptNode,
    pub domains: Vec<ConceptNode>,
    pub practices: Vec<ConceptNode>,
    pub techniques: Vec<ConceptNode>,
    pub exercises: Vec<ConceptNode>,
    pub cross_connections: Vec<CrossConnection>,
    pub confidence: f64,
    pub term_density: f64,
}

impl ConceptHierarchy {
    /// Root plus every level node, in level order
    pub fn all_nodes(&self) -> Vec<&ConceptNode> {
        std::iter::once(&self.root)
            .chain(self.domains.iter())
            .chain(self.practices.iter())
            .chain(self.techniques.iter())
            .chain(self.exercises.iter())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        1 + self.domains.len() + self.practices.len() + self.techniques.len() + self.exercises.len()
    }
}

/// Result of one hierarchy extraction call
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyExtraction {
    pub valid: bool,
    pub reason: String,
    pub hierarchy: Option<ConceptHierarchy>,
    pub density: f64,
}

impl HierarchyExtraction {
    fn rejected(reason: String, density: f64) -> Self {
        Self {
            valid: false,
            reason,
            hierarchy: None,
            density,
        }
    }
}

/// Pluggable secondary lookup for technique-level terms
///
/// The base vocabulary under-represents the technique tier, so technique
/// names come from this ordered fallback list rather than the index. The
/// list can be extended without touching extraction logic.
#[derive(Debug, Clone)]
pub struct TechniqueLexicon {
    terms: Vec<String>,
}

impl Default for TechniqueLexicon {
    fn default() -> Self {
        Self {
            terms: [
                "наблюдение мыслительного потока",
                "наблюдение за мыслительным потоком",
                "отслеживание автоматизмов",
                "остановка внутреннего диалога",
                "центрирование на дыхании",
                "сканирование телесных ощущений",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        }
    }
}

impl TechniqueLexicon {
    pub fn new(terms: Vec<String>) -> Self {
        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn contains(&self, term: &str) -> bool {
        let lower = term.to_lowercase();
        self.terms.iter().any(|t| t.to_lowercase() == lower)
    }
}

/// Rule-based hierarchy extractor
pub struct HierarchyExtractor {
    validator: TerminologyValidator,
    index: Arc<TerminologyIndex>,
    techniques: TechniqueLexicon,
}

impl HierarchyExtractor {
    pub fn new(index: Arc<TerminologyIndex>) -> Self {
        Self::with_techniques(index, TechniqueLexicon::default())
    }

    pub fn with_techniques(index: Arc<TerminologyIndex>, techniques: TechniqueLexicon) -> Self {
        Self {
            validator: TerminologyValidator::new(index.clone()),
            index,
            techniques,
        }
    }

    /// Gate the text (smart mode) and extract the hierarchy
    pub fn extract(&self, input: &str, expected_root: Option<&str>) -> HierarchyExtraction {
        let validation = self.validator.validate(input, ValidationOptions::smart());
        self.extract_validated(input, &validation, expected_root)
    }

    /// Extract the hierarchy from already-validated text
    pub fn extract_validated(
        &self,
        input: &str,
        validation: &ValidationResult,
        expected_root: Option<&str>,
    ) -> HierarchyExtraction {
        if !validation.is_valid {
            warn!(reason = %validation.reason, "hierarchy extraction skipped: validation failed");
            return HierarchyExtraction::rejected(validation.reason.clone(), validation.density);
        }

        let input_lower = input.to_lowercase();
        let sentences = text::sentences(input, 1);

        // Technique terms live in the supplementary lexicon, not the index,
        // so merge the ones present in the text into the entity list.
        let mut entities = validation.entities.clone();
        for technique in self.techniques.terms() {
            if input_lower.contains(&technique.to_lowercase())
                && !entities
                    .iter()
                    .any(|e| e.to_lowercase() == technique.to_lowercase())
            {
                entities.push(technique.clone());
            }
        }

        let Some(root) = self.identify_root(&input_lower, &sentences, &entities, expected_root)
        else {
            info!("hierarchy rejected: no root concept in text");
            return HierarchyExtraction::rejected(
                format!("no root concept found (allowed: {})", ALLOWED_ROOTS.join(", ")),
                validation.density,
            );
        };

        let hierarchy = self.build_hierarchy(root, &sentences, &entities, validation.density);

        if let Err(reason) = self.validate_hierarchy(&hierarchy) {
            info!(reason = %reason, "hierarchy rejected: tree invariant violated");
            return HierarchyExtraction::rejected(
                format!("hierarchy failed validation: {reason}"),
                validation.density,
            );
        }

        info!(
            domains = hierarchy.domains.len(),
            practices = hierarchy.practices.len(),
            techniques = hierarchy.techniques.len(),
            exercises = hierarchy.exercises.len(),
            "hierarchy extracted"
        );

        HierarchyExtraction {
            valid: true,
            reason: format!("extracted hierarchy with {} domains", hierarchy.domains.len()),
            hierarchy: Some(hierarchy),
            density: validation.density,
        }
    }

    fn identify_root(
        &self,
        input_lower: &str,
        sentences: &[String],
        entities: &[String],
        expected_root: Option<&str>,
    ) -> Option<ConceptNode> {
        let make_root = |name: &str| ConceptNode {
            name: name.to_string(),
            level: HierarchyLevel::Root,
            parent: None,
            relation_type: String::new(),
            description: self.description_for_term(sentences, name),
            terms: vec![name.to_string()],
            tier: 1,
            duration: None,
            frequency: None,
            instructions: None,
        };

        if let Some(expected) = expected_root {
            if ALLOWED_ROOTS.contains(&expected) && input_lower.contains(&expected.to_lowercase()) {
                return Some(make_root(expected));
            }
        }

        ALLOWED_ROOTS
            .iter()
            .copied()
            .find(|root| {
                input_lower.contains(&root.to_lowercase())
                    || entities.iter().any(|e| e.to_lowercase() == root.to_lowercase())
            })
            .map(make_root)
    }

    fn build_hierarchy(
        &self,
        root: ConceptNode,
        sentences: &[String],
        entities: &[String],
        density: f64,
    ) -> ConceptHierarchy {
        let domains = self.extract_level_nodes(
            sentences,
            entities,
            HierarchyLevel::Domain,
            std::slice::from_ref(&root),
            "is_core_component_of",
        );

        let practices = self.extract_level_nodes(
            sentences,
            entities,
            HierarchyLevel::Practice,
            &domains,
            "is_practice_for",
        );

        let techniques = self.extract_level_nodes(
            sentences,
            entities,
            HierarchyLevel::Technique,
            &practices,
            "is_technique_for",
        );

        let mut exercises = Vec::new();
        for technique in &techniques {
            exercises.extend(self.extract_exercises(sentences, technique));
        }

        let mut connectable: Vec<&ConceptNode> = Vec::new();
        connectable.extend(domains.iter());
        connectable.extend(practices.iter());
        connectable.extend(techniques.iter());
        let cross_connections = self.extract_cross_connections(sentences, &connectable);

        let confidence = self.hierarchy_confidence(&domains, &practices, &techniques);

        ConceptHierarchy {
            root,
            domains,
            practices,
            techniques,
            exercises,
            cross_connections,
            confidence,
            term_density: density,
        }
    }

    /// Extract the nodes of one level and wire each to its nearest parent
    ///
    /// The parent is searched in the sentence where the term first appears,
    /// then in preceding sentences, nearest first; a term whose sentence
    /// never mentions a parent falls back to the first parent node. A level
    /// with no parents extracts nothing (strict structure).
    fn extract_level_nodes(
        &self,
        sentences: &[String],
        entities: &[String],
        level: HierarchyLevel,
        parents: &[ConceptNode],
        relation_type: &str,
    ) -> Vec<ConceptNode> {
        if parents.is_empty() {
            return Vec::new();
        }

        let level_terms: Vec<&String> = entities
            .iter()
            .filter(|term| self.term_hierarchy_level(term) == Some(level))
            .collect();

        let mut nodes = Vec::new();
        for term in level_terms {
            let description = self.description_for_term(sentences, term);
            let desc_lower = description.to_lowercase();
            let desc_terms: Vec<String> = entities
                .iter()
                .filter(|e| desc_lower.contains(&e.to_lowercase()))
                .cloned()
                .collect();

            let parent = self
                .nearest_parent(sentences, term, parents)
                .unwrap_or(&parents[0]);

            nodes.push(ConceptNode {
                name: term.clone(),
                level,
                parent: Some(parent.name.clone()),
                relation_type: relation_type.to_string(),
                description,
                terms: desc_terms,
                tier: self.index.term_tier(term).unwrap_or(4),
                duration: None,
                frequency: None,
                instructions: None,
            });
        }
        nodes
    }

    /// Map a term to its hierarchy level via the index, with the technique
    /// lexicon as the ordered fallback
    fn term_hierarchy_level(&self, term: &str) -> Option<HierarchyLevel> {
        match self.index.term_level(term) {
            Some(TermLevel::Domain) => Some(HierarchyLevel::Domain),
            Some(TermLevel::Practice) => Some(HierarchyLevel::Practice),
            Some(TermLevel::Root) => Some(HierarchyLevel::Root),
            Some(_) => None,
            None if self.techniques.contains(term) => Some(HierarchyLevel::Technique),
            None => None,
        }
    }

    /// First sentence mentioning the term, falling back to the term itself
    fn description_for_term(&self, sentences: &[String], term: &str) -> String {
        let term_lower = term.to_lowercase();
        sentences
            .iter()
            .find(|s| s.to_lowercase().contains(&term_lower))
            .cloned()
            .unwrap_or_else(|| term.to_string())
    }

    /// Nearest parent mentioned in the term's sentence or an earlier one
    fn nearest_parent<'a>(
        &self,
        sentences: &[String],
        term: &str,
        parents: &'a [ConceptNode],
    ) -> Option<&'a ConceptNode> {
        let term_lower = term.to_lowercase();
        let term_sentence = sentences
            .iter()
            .position(|s| s.to_lowercase().contains(&term_lower))?;

        for idx in (0..=term_sentence).rev() {
            let sentence_lower = sentences[idx].to_lowercase();
            if let Some(parent) = parents
                .iter()
                .find(|p| sentence_lower.contains(&p.name.to_lowercase()))
            {
                return Some(parent);
            }
        }
        None
    }

    /// Exercises are imperative sentences referencing the parent technique
    /// in the same or immediately preceding sentence
    fn extract_exercises(
        &self,
        sentences: &[String],
        technique: &ConceptNode,
    ) -> Vec<ConceptNode> {
        let technique_lower = technique.name.to_lowercase();
        let mut exercises = Vec::new();

        for (i, sentence) in sentences.iter().enumerate() {
            let sentence_lower = sentence.to_lowercase();
            if !EXERCISE_MARKERS.iter().any(|m| sentence_lower.contains(m)) {
                continue;
            }

            let mut related = sentence_lower.contains(&technique_lower);
            if !related && i > 0 {
                related = sentences[i - 1].to_lowercase().contains(&technique_lower);
            }
            if !related {
                continue;
            }

            debug!(technique = %technique.name, "exercise sentence found");
            exercises.push(ConceptNode {
                name: format!("Упражнение для {}", technique.name),
                level: HierarchyLevel::Exercise,
                parent: Some(technique.name.clone()),
                relation_type: "is_exercise_for".to_string(),
                description: sentence.clone(),
                terms: Vec::new(),
                tier: 5,
                duration: self.extract_duration(&sentence_lower),
                frequency: self.extract_frequency(&sentence_lower),
                instructions: Some(sentence.clone()),
            });
        }
        exercises
    }

    fn extract_duration(&self, sentence_lower: &str) -> Option<String> {
        DURATION_RE
            .captures(sentence_lower)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    }

    fn extract_frequency(&self, sentence_lower: &str) -> Option<String> {
        if let Some(captures) = FREQUENCY_RE.captures(sentence_lower) {
            if let Some(m) = captures.get(1) {
                return Some(m.as_str().trim().to_string());
            }
        }
        if sentence_lower.contains("ежедневно") {
            return Some("ежедневно".to_string());
        }
        None
    }

    /// A sentence naming two known concepts plus a relation marker yields a
    /// cross-connection between the first two mentions
    fn extract_cross_connections(
        &self,
        sentences: &[String],
        nodes: &[&ConceptNode],
    ) -> Vec<CrossConnection> {
        let mut connections = Vec::new();

        for sentence in sentences {
            let sentence_lower = sentence.to_lowercase();
            let mentioned: Vec<&&ConceptNode> = nodes
                .iter()
                .filter(|n| sentence_lower.contains(&n.name.to_lowercase()))
                .collect();
            if mentioned.len() < 2 {
                continue;
            }

            let matched = RELATION_RULES
                .iter()
                .find(|rule| rule.markers.iter().any(|m| sentence_lower.contains(m)));
            if let Some(rule) = matched {
                connections.push(CrossConnection {
                    from: mentioned[0].name.clone(),
                    to: mentioned[1].name.clone(),
                    relation: rule.relation,
                    explanation: sentence.clone(),
                    context: sentence.clone(),
                });
            }
        }
        connections
    }

    /// Confidence: 0.5 base, +0.1 per domain (cap 0.2), +0.05 per practice
    /// (cap 0.15), +0.02 per technique (cap 0.1), +0.05 when all three
    /// middle levels are populated
    fn hierarchy_confidence(
        &self,
        domains: &[ConceptNode],
        practices: &[ConceptNode],
        techniques: &[ConceptNode],
    ) -> f64 {
        let mut confidence = 0.5;
        confidence += (domains.len() as f64 * 0.1).min(0.2);
        confidence += (practices.len() as f64 * 0.05).min(0.15);
        confidence += (techniques.len() as f64 * 0.02).min(0.1);
        if !domains.is_empty() && !practices.is_empty() && !techniques.is_empty() {
            confidence += 0.05;
        }
        confidence.min(1.0)
    }

    /// Tree invariants: allow-listed root, every parent resolvable, enough
    /// distinct terms. Violations reject the hierarchy, they never repair it.
    fn validate_hierarchy(&self, hierarchy: &ConceptHierarchy) -> Result<(), String> {
        if !ALLOWED_ROOTS.contains(&hierarchy.root.name.as_str()) {
            return Err(format!("invalid root: {}", hierarchy.root.name));
        }

        let all_nodes = hierarchy.all_nodes();
        let names: HashSet<&str> = all_nodes.iter().map(|n| n.name.as_str()).collect();

        for node in &all_nodes {
            if node.level == HierarchyLevel::Root {
                continue;
            }
            match &node.parent {
                None => return Err(format!("node {} has no parent", node.name)),
                Some(parent) if !names.contains(parent.as_str()) => {
                    return Err(format!("parent {} for node {} not found", parent, node.name));
                }
                Some(_) => {}
            }
        }

        let distinct_terms: HashSet<String> = all_nodes
            .iter()
            .flat_map(|n| n.terms.iter())
            .map(|t| t.to_lowercase())
            .collect();
        if distinct_terms.len() < MIN_HIERARCHY_TERMS {
            return Err(format!(
                "not enough domain terms: {} < {}",
                distinct_terms.len(),
                MIN_HIERARCHY_TERMS
            ));
        }

        Ok(())
    }
}
