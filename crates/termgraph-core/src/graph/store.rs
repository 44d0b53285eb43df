//! Typed node/edge store with name-based dedup and path queries
//!
//! Nodes deduplicate by name: adding a node whose name already exists merges
//! metadata, keeps the higher confidence and returns the existing id. Edges
//! require both endpoints to exist and silently ignore exact
//! (from, to, type) duplicates. The graph grows monotonically across texts
//! and round-trips losslessly through JSON.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::node::{EdgeType, GraphEdge, GraphNode, NodeType};

/// Graph statistics, computed on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub avg_connections_per_node: f64,
}

/// Serializable snapshot of the whole graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub statistics: GraphStatistics,
}

/// One hop of a reasoning chain
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningStep {
    pub from: String,
    pub to: String,
    pub relation: EdgeType,
    pub explanation: String,
}

/// A named path between two concepts with edge-labeled hops
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningChain {
    pub from: String,
    pub to: String,
    pub steps: Vec<ReasoningStep>,
    pub length: usize,
}

/// The knowledge graph
#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    nodes: HashMap<String, GraphNode>,
    edges: Vec<GraphEdge>,

    // Indices
    edge_keys: HashSet<(String, String, EdgeType)>,
    edges_from: HashMap<String, Vec<usize>>,
    edges_to: HashMap<String, Vec<usize>>,
    nodes_by_type: HashMap<NodeType, HashSet<String>>,
    nodes_by_name: HashMap<String, String>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, merging on duplicate name
    ///
    /// Name equality, not content equality, is the dedup key: the same
    /// concept mentioned by different texts must land on one node. Returns
    /// the id of the stored node, which is the existing id on a merge.
    pub fn add_node(&mut self, node: GraphNode) -> String {
        if let Some(existing_id) = self.nodes_by_name.get(&node.name).cloned() {
            if let Some(existing) = self.nodes.get_mut(&existing_id) {
                existing.metadata.extend(node.metadata);
                existing.confidence = existing.confidence.max(node.confidence);
                debug!(name = %existing.name, id = %existing_id, "node merged by name");
            }
            return existing_id;
        }

        let id = node.id.clone();
        self.nodes_by_name.insert(node.name.clone(), id.clone());
        self.nodes_by_type
            .entry(node.node_type)
            .or_default()
            .insert(id.clone());
        self.nodes.insert(id.clone(), node);
        id
    }

    /// Add an edge between existing nodes
    ///
    /// Errors on a dangling endpoint (a caller bug — the orchestrator must
    /// create nodes before linking them). An exact (from, to, type)
    /// duplicate is silently ignored.
    pub fn add_edge(&mut self, edge: GraphEdge) -> Result<()> {
        if !self.nodes.contains_key(&edge.from_id) {
            return Err(Error::UnknownNode(edge.from_id));
        }
        if !self.nodes.contains_key(&edge.to_id) {
            return Err(Error::UnknownNode(edge.to_id));
        }

        let key = (edge.from_id.clone(), edge.to_id.clone(), edge.edge_type);
        if !self.edge_keys.insert(key) {
            return Ok(());
        }

        let idx = self.edges.len();
        self.edges_from.entry(edge.from_id.clone()).or_default().push(idx);
        self.edges_to.entry(edge.to_id.clone()).or_default().push(idx);
        self.edges.push(edge);
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn get_node_by_name(&self, name: &str) -> Option<&GraphNode> {
        self.nodes_by_name.get(name).and_then(|id| self.nodes.get(id))
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<&GraphNode> {
        self.nodes_by_type
            .get(&node_type)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    /// Outgoing edges of a node, O(1) amortized via the adjacency index
    pub fn get_outgoing(&self, id: &str) -> Vec<&GraphEdge> {
        self.edges_from
            .get(id)
            .map(|indices| indices.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Incoming edges of a node, O(1) amortized via the adjacency index
    pub fn get_incoming(&self, id: &str) -> Vec<&GraphEdge> {
        self.edges_to
            .get(id)
            .map(|indices| indices.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Breadth-first shortest path over outgoing edges only
    ///
    /// Returns the node ids along the first-found shortest path, or `None`
    /// if `to_id` is unreachable within `max_depth` hops. `from == to`
    /// returns a single-element path immediately.
    pub fn find_path(&self, from_id: &str, to_id: &str, max_depth: usize) -> Option<Vec<String>> {
        if from_id == to_id {
            return Some(vec![from_id.to_string()]);
        }

        let mut queue = VecDeque::new();
        let mut visited = HashSet::new();
        queue.push_back((from_id.to_string(), vec![from_id.to_string()]));
        visited.insert(from_id.to_string());

        while let Some((current, path)) = queue.pop_front() {
            if path.len() > max_depth {
                continue;
            }

            for edge in self.get_outgoing(&current) {
                if edge.to_id == to_id {
                    let mut found = path.clone();
                    found.push(edge.to_id.clone());
                    return Some(found);
                }
                if visited.insert(edge.to_id.clone()) {
                    let mut next_path = path.clone();
                    next_path.push(edge.to_id.clone());
                    queue.push_back((edge.to_id.clone(), next_path));
                }
            }
        }

        None
    }

    /// Resolve two concept names and project the path between them into
    /// edge-labeled steps
    pub fn build_reasoning_chain(&self, from_name: &str, to_name: &str) -> Option<ReasoningChain> {
        let from_node = self.get_node_by_name(from_name)?;
        let to_node = self.get_node_by_name(to_name)?;

        let path = self.find_path(&from_node.id, &to_node.id, 5)?;

        let mut steps = Vec::new();
        for pair in path.windows(2) {
            let edge = self
                .get_outgoing(&pair[0])
                .into_iter()
                .find(|e| e.to_id == pair[1]);
            let current = &self.nodes[&pair[0]];
            let next = &self.nodes[&pair[1]];
            steps.push(ReasoningStep {
                from: current.name.clone(),
                to: next.name.clone(),
                relation: edge.map(|e| e.edge_type).unwrap_or(EdgeType::RelatedTo),
                explanation: edge.map(|e| e.explanation.clone()).unwrap_or_default(),
            });
        }

        Some(ReasoningChain {
            from: from_name.to_string(),
            to: to_name.to_string(),
            length: steps.len(),
            steps,
        })
    }

    /// Statistics computed on demand, never cached
    pub fn statistics(&self) -> GraphStatistics {
        let mut nodes_by_type = BTreeMap::new();
        for node_type in NodeType::all() {
            let count = self
                .nodes_by_type
                .get(node_type)
                .map(HashSet::len)
                .unwrap_or(0);
            nodes_by_type.insert(node_type.as_str().to_string(), count);
        }

        GraphStatistics {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.len(),
            nodes_by_type,
            avg_connections_per_node: if self.nodes.is_empty() {
                0.0
            } else {
                self.edges.len() as f64 / self.nodes.len() as f64
            },
        }
    }

    /// Serializable snapshot, nodes ordered by id for determinism
    pub fn to_document(&self) -> GraphDocument {
        let mut nodes: Vec<GraphNode> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        GraphDocument {
            nodes,
            edges: self.edges.clone(),
            statistics: self.statistics(),
        }
    }

    /// Rebuild a graph from a snapshot
    pub fn from_document(document: GraphDocument) -> Result<Self> {
        let mut graph = Self::new();
        for node in document.nodes {
            graph.add_node(node);
        }
        for edge in document.edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    /// Write the graph as a JSON document
    pub fn to_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_document())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a graph from a JSON document
    pub fn from_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let document: GraphDocument = serde_json::from_str(&raw)?;
        Self::from_document(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: &str, name: &str) -> GraphNode {
        GraphNode::new(id, name, NodeType::Concept)
    }

    #[test]
    fn test_add_node_dedup_by_name_is_idempotent() {
        let mut graph = KnowledgeGraph::new();

        let first = graph.add_node(concept("a1", "присутствие").with_confidence(0.4));
        let second = graph.add_node(
            concept("a2", "присутствие")
                .with_confidence(0.9)
                .insert_metadata("source", serde_json::json!("t2")),
        );

        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);

        let node = graph.get_node_by_name("присутствие").unwrap();
        assert_eq!(node.confidence, 0.9);
        assert_eq!(node.metadata["source"], "t2");
    }

    #[test]
    fn test_add_edge_requires_existing_nodes() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(concept("a", "а"));

        let result = graph.add_edge(GraphEdge::new("a", "missing", EdgeType::Enables));
        assert!(matches!(result, Err(Error::UnknownNode(id)) if id == "missing"));
    }

    #[test]
    fn test_duplicate_edge_is_ignored() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(concept("a", "а"));
        graph.add_node(concept("b", "б"));

        graph.add_edge(GraphEdge::new("a", "b", EdgeType::Enables)).unwrap();
        graph.add_edge(GraphEdge::new("a", "b", EdgeType::Enables)).unwrap();
        assert_eq!(graph.edge_count(), 1);

        // A different type between the same endpoints is not a duplicate.
        graph.add_edge(GraphEdge::new("a", "b", EdgeType::Requires)).unwrap();
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_find_path_directed() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(concept("a", "а"));
        graph.add_node(concept("b", "б"));
        graph.add_node(concept("c", "в"));
        graph.add_edge(GraphEdge::new("a", "b", EdgeType::LeadsTo)).unwrap();
        graph.add_edge(GraphEdge::new("b", "c", EdgeType::LeadsTo)).unwrap();

        assert_eq!(
            graph.find_path("a", "c", 5),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        // Wrong direction: unreachable.
        assert_eq!(graph.find_path("c", "a", 5), None);
        // Identity path.
        assert_eq!(graph.find_path("a", "a", 5), Some(vec!["a".to_string()]));
    }

    #[test]
    fn test_find_path_respects_max_depth() {
        let mut graph = KnowledgeGraph::new();
        for i in 0..6 {
            graph.add_node(concept(&format!("n{i}"), &format!("узел {i}")));
        }
        for i in 0..5 {
            graph
                .add_edge(GraphEdge::new(
                    format!("n{i}"),
                    format!("n{}", i + 1),
                    EdgeType::LeadsTo,
                ))
                .unwrap();
        }

        assert!(graph.find_path("n0", "n5", 5).is_some());
        assert!(graph.find_path("n0", "n5", 2).is_none());
    }

    #[test]
    fn test_reasoning_chain_labels_hops() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(concept("a", "захват внимания"));
        graph.add_node(concept("b", "метанаблюдение"));
        graph
            .add_edge(
                GraphEdge::new("a", "b", EdgeType::Requires)
                    .with_explanation("захват внимания требует метанаблюдения"),
            )
            .unwrap();

        let chain = graph
            .build_reasoning_chain("захват внимания", "метанаблюдение")
            .unwrap();
        assert_eq!(chain.length, 1);
        assert_eq!(chain.steps[0].relation, EdgeType::Requires);
        assert_eq!(chain.steps[0].from, "захват внимания");

        assert!(graph.build_reasoning_chain("захват внимания", "неизвестно").is_none());
    }

    #[test]
    fn test_statistics() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(concept("a", "а"));
        graph.add_node(GraphNode::new("b", "б", NodeType::Practice));
        graph.add_edge(GraphEdge::new("a", "b", EdgeType::RelatedTo)).unwrap();

        let stats = graph.statistics();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.total_edges, 1);
        assert_eq!(stats.nodes_by_type["concept"], 1);
        assert_eq!(stats.nodes_by_type["practice"], 1);
        assert_eq!(stats.nodes_by_type["exercise"], 0);
        assert_eq!(stats.avg_connections_per_node, 0.5);
    }

    #[test]
    fn test_document_round_trip() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(
            concept("a", "присутствие")
                .with_tier(6)
                .with_confidence(0.8)
                .insert_metadata("source", serde_json::json!("t1")),
        );
        graph.add_node(GraphNode::new("b", "метанаблюдение", NodeType::Practice));
        graph
            .add_edge(
                GraphEdge::new("b", "a", EdgeType::LeadsTo)
                    .with_explanation("практика ведёт к состоянию")
                    .with_confidence(0.7),
            )
            .unwrap();

        let restored = KnowledgeGraph::from_document(graph.to_document()).unwrap();

        assert_eq!(restored.node_count(), graph.node_count());
        assert_eq!(restored.edge_count(), graph.edge_count());
        assert_eq!(restored.statistics(), graph.statistics());

        let node = restored.get_node("a").unwrap();
        assert_eq!(node.tier, Some(6));
        assert_eq!(node.confidence, 0.8);
        assert_eq!(node.metadata["source"], "t1");

        let edge = &restored.edges()[0];
        assert_eq!(edge.edge_type, EdgeType::LeadsTo);
        assert_eq!(edge.explanation, "практика ведёт к состоянию");
    }
}
