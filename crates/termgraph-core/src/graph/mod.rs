//! Knowledge graph: typed nodes and edges, dedup-by-name merge, adjacency
//! indices, BFS path queries and JSON round-trip, plus co-occurrence edge
//! weighting.

mod node;
mod store;
mod weight;

pub use node::{EdgeType, GraphEdge, GraphNode, Metadata, NodeType};
pub use store::{GraphDocument, GraphStatistics, KnowledgeGraph, ReasoningChain, ReasoningStep};
pub use weight::GraphWeightCalculator;
