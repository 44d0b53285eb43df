//! Node and edge types for the knowledge graph

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Types of nodes in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Concept from the hierarchy (root and domain levels)
    Concept,
    /// Recognized narrative pattern
    Pattern,
    /// Stage of a transformation process
    ProcessStage,
    /// Named practice
    Practice,
    /// Technique within a practice
    Technique,
    /// Concrete exercise
    Exercise,
}

impl NodeType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Pattern => "pattern",
            Self::ProcessStage => "process_stage",
            Self::Practice => "practice",
            Self::Technique => "technique",
            Self::Exercise => "exercise",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "concept" => Some(Self::Concept),
            "pattern" => Some(Self::Pattern),
            "process_stage" => Some(Self::ProcessStage),
            "practice" => Some(Self::Practice),
            "technique" => Some(Self::Technique),
            "exercise" => Some(Self::Exercise),
            _ => None,
        }
    }

    /// All node types
    pub fn all() -> &'static [NodeType] {
        &[
            Self::Concept,
            Self::Pattern,
            Self::ProcessStage,
            Self::Practice,
            Self::Technique,
            Self::Exercise,
        ]
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Types of edges in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    // Hierarchical (vertical)
    IsCoreComponentOf,
    IsPracticeFor,
    IsTechniqueFor,
    IsExerciseFor,

    // Process
    EmergesFrom,
    Enables,
    Requires,
    LeadsTo,
    TransformsInto,

    // Patterns
    RelatedTo,
    PartOfPattern,
}

impl EdgeType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsCoreComponentOf => "is_core_component_of",
            Self::IsPracticeFor => "is_practice_for",
            Self::IsTechniqueFor => "is_technique_for",
            Self::IsExerciseFor => "is_exercise_for",
            Self::EmergesFrom => "emerges_from",
            Self::Enables => "enables",
            Self::Requires => "requires",
            Self::LeadsTo => "leads_to",
            Self::TransformsInto => "transforms_into",
            Self::RelatedTo => "related_to",
            Self::PartOfPattern => "part_of_pattern",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "is_core_component_of" => Some(Self::IsCoreComponentOf),
            "is_practice_for" => Some(Self::IsPracticeFor),
            "is_technique_for" => Some(Self::IsTechniqueFor),
            "is_exercise_for" => Some(Self::IsExerciseFor),
            "emerges_from" => Some(Self::EmergesFrom),
            "enables" => Some(Self::Enables),
            "requires" => Some(Self::Requires),
            "leads_to" => Some(Self::LeadsTo),
            "transforms_into" => Some(Self::TransformsInto),
            "related_to" => Some(Self::RelatedTo),
            "part_of_pattern" => Some(Self::PartOfPattern),
            _ => None,
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Open key-value metadata attached to nodes and edges
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A node in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Globally unique, caller-assigned id
    pub id: String,
    /// Natural dedup key: two nodes with the same name merge
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub description: String,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub tier: Option<u8>,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            description: String::new(),
            terms: Vec::new(),
            tier: None,
            confidence: 1.0,
            metadata: Metadata::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_terms(mut self, terms: Vec<String>) -> Self {
        self.terms = terms;
        self
    }

    pub fn with_tier(mut self, tier: u8) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn insert_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A directed edge in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from_id: String,
    pub to_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub explanation: String,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl GraphEdge {
    pub fn new(
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        edge_type: EdgeType,
    ) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            edge_type,
            explanation: String::new(),
            confidence: 1.0,
            metadata: Metadata::new(),
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}
