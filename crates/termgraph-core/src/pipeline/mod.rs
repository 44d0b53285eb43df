//! Single entry point: gate, extract, merge
//!
//! The orchestrator runs the validator once per text and feeds the same
//! validated entity list to all three extractors, then folds their outputs
//! into one cumulative knowledge graph. A rejected text leaves the graph
//! (and the co-occurrence statistics) untouched. Parents are resolved by
//! name lookup in the graph, which may have been populated by an earlier
//! text: cross-document concept linking is intended, not an accident.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::extract::{
    CausalChain, CausalChainExtractor, ChainOptions, ConceptHierarchy, ConceptNode,
    CrossRelation, HierarchyExtractor, Pattern, PatternExtractor,
};
use crate::graph::{
    EdgeType, GraphEdge, GraphNode, GraphWeightCalculator, KnowledgeGraph, Metadata, NodeType,
};
use crate::terminology::{TerminologyIndex, TerminologyValidator, ValidationOptions};

/// Outcome of processing one text
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub text_id: String,
    pub is_valid: bool,
    pub validation_reason: String,
    pub density: f64,
    pub patterns: Vec<Pattern>,
    pub chains: Vec<CausalChain>,
    pub hierarchy: Option<ConceptHierarchy>,
    pub total_concepts: usize,
    pub total_patterns: usize,
    pub total_chains: usize,
    pub metadata: Metadata,
}

/// A practice recommended for a symptom
#[derive(Debug, Clone, Serialize)]
pub struct PracticeRecommendation {
    pub practice: String,
    pub relation: EdgeType,
    pub explanation: String,
    pub confidence: f64,
}

/// An exercise recommended for a practice
#[derive(Debug, Clone, Serialize)]
pub struct ExerciseRecommendation {
    pub exercise: String,
    pub technique: String,
    pub practice: String,
    pub duration: Option<String>,
    pub frequency: Option<String>,
    pub instructions: Option<String>,
}

/// Orchestrates the gate, the three extractors and the graph merge
pub struct GraphOrchestrator {
    validator: TerminologyValidator,
    pattern_extractor: PatternExtractor,
    chain_extractor: CausalChainExtractor,
    hierarchy_extractor: HierarchyExtractor,
    graph: KnowledgeGraph,
    weights: GraphWeightCalculator,
    blocks_processed: usize,
}

impl GraphOrchestrator {
    pub fn new(index: Arc<TerminologyIndex>) -> Self {
        Self {
            validator: TerminologyValidator::new(index.clone()),
            pattern_extractor: PatternExtractor::new(index.clone()),
            chain_extractor: CausalChainExtractor::new(index.clone()),
            hierarchy_extractor: HierarchyExtractor::new(index),
            graph: KnowledgeGraph::new(),
            weights: GraphWeightCalculator::new(),
            blocks_processed: 0,
        }
    }

    /// Resume accumulation over a previously persisted graph
    pub fn with_graph(index: Arc<TerminologyIndex>, graph: KnowledgeGraph) -> Self {
        let mut orchestrator = Self::new(index);
        orchestrator.graph = graph;
        orchestrator
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn into_graph(self) -> KnowledgeGraph {
        self.graph
    }

    /// Process one text: gate, run all three extractors over the same
    /// validated entity list, merge into the graph
    ///
    /// On validation failure the result carries `is_valid: false`, all
    /// counts zero, and no graph mutation happens.
    pub fn process_text(
        &mut self,
        input: &str,
        text_id: Option<String>,
        metadata: Metadata,
    ) -> Result<ProcessingResult> {
        let text_id = text_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let validation = self.validator.validate(input, ValidationOptions::smart());
        if !validation.is_valid {
            info!(text_id = %text_id, reason = %validation.reason, "text rejected by gate");
            return Ok(ProcessingResult {
                text_id,
                is_valid: false,
                validation_reason: validation.reason,
                density: validation.density,
                patterns: Vec::new(),
                chains: Vec::new(),
                hierarchy: None,
                total_concepts: 0,
                total_patterns: 0,
                total_chains: 0,
                metadata,
            });
        }

        // One gate, three consumers: extractors reuse the validation instead
        // of re-validating independently.
        let patterns = self
            .pattern_extractor
            .extract_validated(input, &validation, None);
        let chains =
            self.chain_extractor
                .extract_validated(input, &validation, ChainOptions::default());
        let hierarchy = self
            .hierarchy_extractor
            .extract_validated(input, &validation, None);

        if let Some(h) = &hierarchy.hierarchy {
            self.merge_hierarchy(h, &text_id)?;
        }
        self.merge_patterns(&patterns.patterns, &text_id)?;
        self.merge_chains(&chains.chains, &text_id)?;
        self.merge_cooccurrence(input, &validation.entities)?;

        let total_concepts = hierarchy.hierarchy.as_ref().map(ConceptHierarchy::node_count).unwrap_or(0);

        info!(
            text_id = %text_id,
            patterns = patterns.patterns.len(),
            chains = chains.chains.len(),
            concepts = total_concepts,
            "text processed"
        );

        Ok(ProcessingResult {
            text_id,
            is_valid: true,
            validation_reason: validation.reason,
            density: validation.density,
            total_patterns: patterns.patterns.len(),
            total_chains: chains.chains.len(),
            total_concepts,
            patterns: patterns.patterns,
            chains: chains.chains,
            hierarchy: hierarchy.hierarchy,
            metadata,
        })
    }

    fn merge_hierarchy(&mut self, hierarchy: &ConceptHierarchy, text_id: &str) -> Result<()> {
        let root = &hierarchy.root;
        let root_id = self.graph.add_node(
            GraphNode::new(
                format!("{text_id}_root_{}", root.name),
                root.name.clone(),
                NodeType::Concept,
            )
            .with_description(root.description.clone())
            .with_terms(root.terms.clone())
            .with_tier(1)
            .insert_metadata("source", serde_json::json!(text_id))
            .insert_metadata("level", serde_json::json!("root")),
        );

        for domain in &hierarchy.domains {
            let domain_id = self.add_level_node(domain, text_id, NodeType::Concept);
            self.graph.add_edge(
                GraphEdge::new(domain_id, root_id.clone(), EdgeType::IsCoreComponentOf)
                    .with_explanation(format!("{} is core component of {}", domain.name, root.name)),
            )?;
        }

        for practice in &hierarchy.practices {
            let practice_id = self.add_level_node(practice, text_id, NodeType::Practice);
            self.link_to_parent(&practice_id, practice, EdgeType::IsPracticeFor)?;
        }

        for technique in &hierarchy.techniques {
            let technique_id = self.add_level_node(technique, text_id, NodeType::Technique);
            self.link_to_parent(&technique_id, technique, EdgeType::IsTechniqueFor)?;
        }

        for exercise in &hierarchy.exercises {
            let exercise_id = self.graph.add_node(
                GraphNode::new(
                    format!("{text_id}_exercise_{}", exercise.name),
                    exercise.name.clone(),
                    NodeType::Exercise,
                )
                .with_description(exercise.description.clone())
                .insert_metadata("source", serde_json::json!(text_id))
                .insert_metadata("level", serde_json::json!("exercise"))
                .insert_metadata("duration", serde_json::json!(exercise.duration))
                .insert_metadata("frequency", serde_json::json!(exercise.frequency))
                .insert_metadata("instructions", serde_json::json!(exercise.instructions)),
            );
            self.link_to_parent(&exercise_id, exercise, EdgeType::IsExerciseFor)?;
        }

        for connection in &hierarchy.cross_connections {
            let from = self.graph.get_node_by_name(&connection.from).map(|n| n.id.clone());
            let to = self.graph.get_node_by_name(&connection.to).map(|n| n.id.clone());
            if let (Some(from_id), Some(to_id)) = (from, to) {
                self.graph.add_edge(
                    GraphEdge::new(from_id, to_id, cross_relation_edge(connection.relation))
                        .with_explanation(connection.explanation.clone()),
                )?;
            }
        }

        Ok(())
    }

    fn add_level_node(&mut self, node: &ConceptNode, text_id: &str, node_type: NodeType) -> String {
        let level = node.level.as_str();
        self.graph.add_node(
            GraphNode::new(
                format!("{text_id}_{level}_{}", node.name),
                node.name.clone(),
                node_type,
            )
            .with_description(node.description.clone())
            .with_terms(node.terms.clone())
            .with_tier(node.tier)
            .insert_metadata("source", serde_json::json!(text_id))
            .insert_metadata("level", serde_json::json!(level)),
        )
    }

    /// Link a hierarchy node to its parent, resolved by name in the graph
    ///
    /// The parent may have been created by a previous `process_text` call on
    /// a different text.
    fn link_to_parent(&mut self, node_id: &str, node: &ConceptNode, edge_type: EdgeType) -> Result<()> {
        let Some(parent_name) = &node.parent else {
            return Ok(());
        };
        let Some(parent) = self.graph.get_node_by_name(parent_name) else {
            debug!(node = %node.name, parent = %parent_name, "parent not in graph yet");
            return Ok(());
        };
        let parent_id = parent.id.clone();
        self.graph.add_edge(
            GraphEdge::new(node_id.to_string(), parent_id, edge_type)
                .with_explanation(format!("{} {} {}", node.name, edge_type.as_str(), parent_name)),
        )?;
        Ok(())
    }

    fn merge_patterns(&mut self, patterns: &[Pattern], text_id: &str) -> Result<()> {
        for pattern in patterns {
            let pattern_id = self.graph.add_node(
                GraphNode::new(
                    format!("{text_id}_pattern_{}", pattern.name),
                    pattern.name.clone(),
                    NodeType::Pattern,
                )
                .with_description(pattern.description.clone())
                .with_terms(pattern.key_terms.clone())
                .with_confidence(pattern.confidence)
                .insert_metadata("source", serde_json::json!(text_id))
                .insert_metadata("category", serde_json::json!(pattern.category.as_str()))
                .insert_metadata("context", serde_json::json!(pattern.context))
                .insert_metadata(
                    "related_practices",
                    serde_json::json!(pattern.related_practices),
                ),
            );

            for practice_name in &pattern.related_practices {
                let Some(practice) = self.graph.get_node_by_name(practice_name) else {
                    continue;
                };
                let practice_id = practice.id.clone();
                self.graph.add_edge(
                    GraphEdge::new(pattern_id.clone(), practice_id, EdgeType::RelatedTo)
                        .with_explanation(format!(
                            "pattern {} relates to {}",
                            pattern.name, practice_name
                        )),
                )?;
            }
        }
        Ok(())
    }

    fn merge_chains(&mut self, chains: &[CausalChain], text_id: &str) -> Result<()> {
        for (chain_idx, chain) in chains.iter().enumerate() {
            let mut stage_ids = Vec::with_capacity(chain.stages.len());
            for stage in &chain.stages {
                let stage_id = self.graph.add_node(
                    GraphNode::new(
                        format!("{text_id}_chain{chain_idx}_stage{}", stage.index),
                        stage.name.clone(),
                        NodeType::ProcessStage,
                    )
                    .with_description(stage.description.clone())
                    .with_terms(stage.terms.clone())
                    .insert_metadata("source", serde_json::json!(text_id))
                    .insert_metadata("chain_category", serde_json::json!(chain.category.as_str()))
                    .insert_metadata("stage_number", serde_json::json!(stage.index)),
                );
                stage_ids.push((stage.index, stage_id));
            }

            for pair in stage_ids.windows(2) {
                let (current_number, current_id) = &pair[0];
                let (next_number, next_id) = &pair[1];
                self.graph.add_edge(
                    GraphEdge::new(current_id.clone(), next_id.clone(), EdgeType::EmergesFrom)
                        .with_explanation(format!(
                            "stage {next_number} emerges from stage {current_number}"
                        ))
                        .with_confidence(chain.confidence),
                )?;
            }
        }
        Ok(())
    }

    /// Record the block for co-occurrence statistics and add weighted
    /// `RelatedTo` edges between graphed concepts that co-occur in it
    fn merge_cooccurrence(&mut self, input: &str, entities: &[String]) -> Result<()> {
        self.weights.observe(input, entities, self.blocks_processed);
        self.blocks_processed += 1;

        for (i, first) in entities.iter().enumerate() {
            for second in &entities[i + 1..] {
                let from = self.graph.get_node_by_name(first).map(|n| n.id.clone());
                let to = self.graph.get_node_by_name(second).map(|n| n.id.clone());
                let (Some(from_id), Some(to_id)) = (from, to) else {
                    continue;
                };
                let weight = self
                    .weights
                    .combined_weight(first, second, self.blocks_processed);
                self.graph.add_edge(
                    GraphEdge::new(from_id, to_id, EdgeType::RelatedTo)
                        .with_explanation(format!("{first} and {second} co-occur"))
                        .with_confidence(weight),
                )?;
            }
        }
        Ok(())
    }

    /// Practices reachable from a symptom node through requires/enables
    /// edges; empty when nothing matches
    pub fn find_practices_for_symptom(&self, symptom: &str) -> Vec<PracticeRecommendation> {
        let Some(symptom_node) = self.graph.get_node_by_name(symptom) else {
            return Vec::new();
        };

        let mut practices = Vec::new();
        for edge in self.graph.get_outgoing(&symptom_node.id) {
            if !matches!(edge.edge_type, EdgeType::Requires | EdgeType::Enables) {
                continue;
            }
            let Some(target) = self.graph.get_node(&edge.to_id) else {
                continue;
            };
            if target.node_type == NodeType::Practice {
                practices.push(PracticeRecommendation {
                    practice: target.name.clone(),
                    relation: edge.edge_type,
                    explanation: edge.explanation.clone(),
                    confidence: edge.confidence,
                });
            }
        }
        practices
    }

    /// First exercise found under the practice's first technique, optionally
    /// filtered by duration; `None` when nothing matches
    pub fn recommend_exercise(
        &self,
        practice: &str,
        duration: Option<&str>,
    ) -> Option<ExerciseRecommendation> {
        let practice_node = self.graph.get_node_by_name(practice)?;

        let technique = self
            .graph
            .get_incoming(&practice_node.id)
            .into_iter()
            .filter(|e| e.edge_type == EdgeType::IsTechniqueFor)
            .find_map(|e| self.graph.get_node(&e.from_id))?;

        for edge in self.graph.get_incoming(&technique.id) {
            if edge.edge_type != EdgeType::IsExerciseFor {
                continue;
            }
            let Some(exercise) = self.graph.get_node(&edge.from_id) else {
                continue;
            };

            let exercise_duration = metadata_string(exercise, "duration");
            if let (Some(wanted), Some(actual)) = (duration, exercise_duration.as_deref()) {
                if !actual.contains(wanted) {
                    continue;
                }
            }

            return Some(ExerciseRecommendation {
                exercise: exercise.name.clone(),
                technique: technique.name.clone(),
                practice: practice.to_string(),
                duration: exercise_duration,
                frequency: metadata_string(exercise, "frequency"),
                instructions: metadata_string(exercise, "instructions"),
            });
        }
        None
    }
}

fn cross_relation_edge(relation: CrossRelation) -> EdgeType {
    match relation {
        CrossRelation::Enables => EdgeType::Enables,
        CrossRelation::Requires => EdgeType::Requires,
        CrossRelation::LeadsTo => EdgeType::LeadsTo,
        CrossRelation::TransformsInto => EdgeType::TransformsInto,
    }
}

fn metadata_string(node: &GraphNode, key: &str) -> Option<String> {
    node.metadata
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator() -> GraphOrchestrator {
        GraphOrchestrator::new(Arc::new(TerminologyIndex::builtin().unwrap()))
    }

    const LECTURE_TEXT: &str = "Нейро-сталкинг раскрывается через работу с вниманием и пробуждение сознания. \
        Работа с вниманием опирается на метанаблюдение и центрирование. \
        Метанаблюдение требует остановка внутреннего диалога как базовой опоры. \
        Практикуй остановка внутреннего диалога 10 минут ежедневно, удерживая поток восприятия. \
        Центрирование позволяет разотождествление, и приходит чистое осознавание.";

    #[test]
    fn test_process_text_builds_graph() {
        let mut orchestrator = orchestrator();
        let result = orchestrator
            .process_text(LECTURE_TEXT, Some("t1".to_string()), Metadata::new())
            .unwrap();

        assert!(result.is_valid, "{}", result.validation_reason);
        assert!(result.total_concepts > 0);
        assert!(result.hierarchy.is_some());
        assert!(orchestrator.graph().node_count() > 0);
        assert!(orchestrator.graph().edge_count() > 0);

        let root = orchestrator.graph().get_node_by_name("нейро-сталкинг").unwrap();
        assert_eq!(root.node_type, NodeType::Concept);
    }

    #[test]
    fn test_rejected_text_leaves_graph_unchanged() {
        let mut orchestrator = orchestrator();
        orchestrator
            .process_text(LECTURE_TEXT, Some("t1".to_string()), Metadata::new())
            .unwrap();
        let before = orchestrator.graph().statistics();

        let result = orchestrator
            .process_text(
                "Обычный разговор о погоде и посторонних делах без всякой темы",
                Some("t2".to_string()),
                Metadata::new(),
            )
            .unwrap();

        assert!(!result.is_valid);
        assert_eq!(result.total_concepts, 0);
        assert_eq!(result.total_patterns, 0);
        assert_eq!(result.total_chains, 0);
        assert_eq!(orchestrator.graph().statistics(), before);
    }

    #[test]
    fn test_cross_document_concept_linking() {
        let mut orchestrator = orchestrator();
        orchestrator
            .process_text(LECTURE_TEXT, Some("t1".to_string()), Metadata::new())
            .unwrap();
        let nodes_after_first = orchestrator.graph().node_count();

        // The second text mentions the same practice; its node must merge
        // with the existing one rather than duplicate it.
        let second = "Нейро-сталкинг живёт в работе с вниманием. \
            Работа с вниманием раскрывает метанаблюдение и свидетельствование.";
        orchestrator
            .process_text(second, Some("t2".to_string()), Metadata::new())
            .unwrap();

        let node = orchestrator.graph().get_node_by_name("метанаблюдение").unwrap();
        assert!(node.id.starts_with("t1_"), "id was {}", node.id);

        let names: Vec<&str> = ["метанаблюдение", "нейро-сталкинг", "работа с вниманием"]
            .to_vec();
        for name in names {
            let count = orchestrator
                .graph()
                .to_document()
                .nodes
                .iter()
                .filter(|n| n.name == name)
                .count();
            assert_eq!(count, 1, "duplicate node for {name}");
        }
        assert!(orchestrator.graph().node_count() > nodes_after_first - 1);
    }

    #[test]
    fn test_find_practices_for_symptom() {
        let mut orchestrator = orchestrator();
        orchestrator
            .process_text(LECTURE_TEXT, Some("t1".to_string()), Metadata::new())
            .unwrap();

        let practices = orchestrator.find_practices_for_symptom("разотождествление");
        assert!(!practices.is_empty());
        assert_eq!(practices[0].practice, "центрирование");
        assert_eq!(practices[0].relation, EdgeType::Enables);

        assert!(orchestrator.find_practices_for_symptom("неизвестное").is_empty());
    }

    #[test]
    fn test_recommend_exercise() {
        let mut orchestrator = orchestrator();
        orchestrator
            .process_text(LECTURE_TEXT, Some("t1".to_string()), Metadata::new())
            .unwrap();

        let recommendation = orchestrator.recommend_exercise("метанаблюдение", None).unwrap();
        assert_eq!(recommendation.technique, "остановка внутреннего диалога");
        assert_eq!(recommendation.duration.as_deref(), Some("10 минут"));
        assert_eq!(recommendation.frequency.as_deref(), Some("ежедневно"));

        // Duration filter excludes mismatches.
        assert!(orchestrator.recommend_exercise("метанаблюдение", Some("45")).is_none());
        assert!(orchestrator.recommend_exercise("неизвестная практика", None).is_none());
    }

    #[test]
    fn test_auto_generated_text_id() {
        let mut orchestrator = orchestrator();
        let result = orchestrator
            .process_text(LECTURE_TEXT, None, Metadata::new())
            .unwrap();
        assert!(!result.text_id.is_empty());
    }

    #[test]
    fn test_chain_stages_connected_with_emerges_from() {
        let mut orchestrator = orchestrator();
        let result = orchestrator
            .process_text(LECTURE_TEXT, Some("t1".to_string()), Metadata::new())
            .unwrap();

        assert!(result.total_chains > 0);
        let emerges: Vec<_> = orchestrator
            .graph()
            .edges()
            .iter()
            .filter(|e| e.edge_type == EdgeType::EmergesFrom)
            .collect();
        assert!(!emerges.is_empty());
        for edge in emerges {
            assert!(orchestrator.graph().get_node(&edge.from_id).is_some());
            assert!(orchestrator.graph().get_node(&edge.to_id).is_some());
        }
    }
}
