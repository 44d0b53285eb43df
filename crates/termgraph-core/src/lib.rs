//! Termgraph Core Library
//!
//! This crate turns lecture transcripts into a validated, structured
//! knowledge graph for a single lecturer's terminology system:
//! - Terminology index and validation gate (density scoring, forbidden
//!   vocabulary, lemma-normalized matching)
//! - Rule-based extractors (narrative patterns, causal stage chains,
//!   strict five-level concept hierarchy)
//! - Knowledge graph (dedup-by-name merge, adjacency indices, BFS
//!   reasoning chains, JSON round-trip)
//! - Orchestrator folding all extractor outputs into one cumulative graph
//!   with co-occurrence edge weighting
//!
//! Subtitle acquisition, LLM prompting and vector-database indexing are
//! external collaborators: they supply text and consume the graph through
//! the types exported here.

pub mod error;
pub mod extract;
pub mod graph;
pub mod pipeline;
pub mod terminology;
pub mod text;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::extract::{
        CausalChainExtractor, ChainOptions, HierarchyExtractor, PatternExtractor,
    };
    pub use crate::graph::{GraphEdge, GraphNode, KnowledgeGraph};
    pub use crate::pipeline::{GraphOrchestrator, ProcessingResult};
    pub use crate::terminology::{
        TerminologyIndex, TerminologyValidator, ValidationOptions, ValidationResult,
    };
}
