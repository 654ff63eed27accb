//! KnowledgeGraph: the canonical, per-query typed multigraph

use super::entity::{Entity, EntityId};
use super::relation::{EdgeKey, Relation};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Per-node scores attached to the graph for one ranking pass.
///
/// Overwritten on every re-rank; never accumulated across queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationScore {
    pub relevance: f64,
    pub novelty: f64,
    pub robust_score: f64,
}

/// A canonical graph: no two nodes share an id, at most one edge per
/// `(source, target, relation_type)`, and every edge's endpoints exist.
///
/// Storage is ordered by id so equality and iteration never depend on the
/// order in which fragments were merged. Cycles are legal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<EntityId, Entity>,
    edges: BTreeMap<EdgeKey, Relation>,
    scores: BTreeMap<EntityId, ActivationScore>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble from already-merged parts. Edges with a missing endpoint
    /// are dropped; returns the graph and the number dropped.
    pub(crate) fn from_parts(
        nodes: BTreeMap<EntityId, Entity>,
        edges: impl IntoIterator<Item = Relation>,
    ) -> (Self, usize) {
        let mut dropped = 0;
        let mut kept = BTreeMap::new();
        for edge in edges {
            if nodes.contains_key(&edge.source) && nodes.contains_key(&edge.target) {
                kept.insert(edge.key(), edge);
            } else {
                dropped += 1;
            }
        }
        (
            Self {
                nodes,
                edges: kept,
                scores: BTreeMap::new(),
            },
            dropped,
        )
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_node(&self, id: &EntityId) -> Option<&Entity> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &EntityId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get_edge(&self, key: &EdgeKey) -> Option<&Relation> {
        self.edges.get(key)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Entity> {
        self.nodes.values()
    }

    /// Edges in key order.
    pub fn edges(&self) -> impl Iterator<Item = &Relation> {
        self.edges.values()
    }

    pub fn node_ids(&self) -> BTreeSet<EntityId> {
        self.nodes.keys().cloned().collect()
    }

    /// Label for display, falling back to the id.
    pub fn label_of<'a>(&'a self, id: &'a EntityId) -> &'a str {
        self.nodes
            .get(id)
            .map(|n| n.label.as_str())
            .unwrap_or_else(|| id.as_str())
    }

    /// Replace the transient scores with those of a new ranking pass.
    pub fn attach_scores(&mut self, scores: impl IntoIterator<Item = (EntityId, ActivationScore)>) {
        self.scores = scores
            .into_iter()
            .filter(|(id, _)| self.nodes.contains_key(id))
            .collect();
    }

    pub fn score(&self, id: &EntityId) -> Option<&ActivationScore> {
        self.scores.get(id)
    }

    /// Build an undirected adjacency index for traversal.
    pub fn adjacency(&self) -> AdjacencyIndex<'_> {
        AdjacencyIndex::build(self)
    }
}

/// Undirected adjacency over a graph, ordered for deterministic traversal.
///
/// Each relation appears in the lists of both endpoints; a self-loop
/// appears once.
pub struct AdjacencyIndex<'a> {
    neighbors: BTreeMap<&'a EntityId, Vec<(&'a EntityId, &'a Relation)>>,
}

impl<'a> AdjacencyIndex<'a> {
    fn build(graph: &'a KnowledgeGraph) -> Self {
        let mut neighbors: BTreeMap<&EntityId, Vec<(&EntityId, &Relation)>> = BTreeMap::new();
        for edge in graph.edges.values() {
            neighbors.entry(&edge.source).or_default().push((&edge.target, edge));
            if edge.source != edge.target {
                neighbors.entry(&edge.target).or_default().push((&edge.source, edge));
            }
        }
        for list in neighbors.values_mut() {
            list.sort_by(|(a, ea), (b, eb)| a.cmp(b).then_with(|| ea.relation_type.cmp(&eb.relation_type)));
        }
        Self { neighbors }
    }

    /// Incident relations of a node, ordered by neighbor id.
    pub fn neighbors(&self, id: &EntityId) -> &[(&'a EntityId, &'a Relation)] {
        self.neighbors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct neighbors (self excluded).
    pub fn degree(&self, id: &EntityId) -> usize {
        let distinct: BTreeSet<&EntityId> = self
            .neighbors(id)
            .iter()
            .map(|(n, _)| *n)
            .filter(|n| *n != id)
            .collect();
        distinct.len()
    }
}

#[derive(Serialize)]
struct ScoredNode<'a> {
    #[serde(flatten)]
    entity: &'a Entity,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<&'a ActivationScore>,
}

#[derive(Serialize)]
struct GraphRepr<'a> {
    nodes: Vec<ScoredNode<'a>>,
    edges: Vec<&'a Relation>,
    node_count: usize,
    edge_count: usize,
}

impl Serialize for KnowledgeGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        GraphRepr {
            nodes: self
                .nodes
                .values()
                .map(|entity| ScoredNode {
                    entity,
                    score: self.scores.get(&entity.id),
                })
                .collect(),
            edges: self.edges.values().collect(),
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
        }
        .serialize(serializer)
    }
}
