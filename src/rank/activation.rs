//! ActivationRanker: query-seeded spreading activation
//!
//! Layered breadth-first propagation from every seed at once. A node is
//! entered on the first layer that reaches it and never re-entered, which
//! bounds the walk on cyclic graphs and prevents double counting. Signals
//! arriving on the same layer from several parents add up.

use crate::graph::{ActivationScore, EntityId, KnowledgeGraph, Polarity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Ranker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Hops activation may travel from a seed
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    /// Per-hop attenuation, multiplied with the edge weight
    #[serde(default = "default_decay")]
    pub decay: f64,
    /// How strongly hub-like connectivity suppresses novelty (0 disables)
    #[serde(default = "default_hub_penalty")]
    pub hub_penalty: f64,
}

fn default_max_hops() -> usize {
    3
}
fn default_decay() -> f64 {
    0.5
}
fn default_hub_penalty() -> f64 {
    1.0
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            decay: default_decay(),
            hub_penalty: default_hub_penalty(),
        }
    }
}

/// One reached node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedNode {
    pub id: EntityId,
    pub score: ActivationScore,
    /// Hops from the nearest seed
    pub hops: usize,
}

/// Reached nodes, best first. Unreached nodes are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ranking {
    pub nodes: Vec<RankedNode>,
}

impl Ranking {
    /// Sort by `key` descending, ties by id ascending.
    pub(crate) fn from_nodes(mut nodes: Vec<RankedNode>, key: impl Fn(&ActivationScore) -> f64) -> Self {
        nodes.sort_by(|a, b| {
            key(&b.score)
                .total_cmp(&key(&a.score))
                .then_with(|| a.id.cmp(&b.id))
        });
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn top(&self, k: usize) -> &[RankedNode] {
        &self.nodes[..k.min(self.nodes.len())]
    }

    pub fn get(&self, id: &EntityId) -> Option<&RankedNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Zero-based rank of a node.
    pub fn position(&self, id: &EntityId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }

    /// Relevance of a node, 0 when unreached.
    pub fn relevance_of(&self, id: &EntityId) -> f64 {
        self.get(id).map_or(0.0, |n| n.score.relevance)
    }

    pub fn ids(&self) -> Vec<&EntityId> {
        self.nodes.iter().map(|n| &n.id).collect()
    }

    /// Write this ranking's scores onto the graph, replacing earlier ones.
    pub fn apply_to(&self, graph: &mut KnowledgeGraph) {
        graph.attach_scores(self.nodes.iter().map(|n| (n.id.clone(), n.score)));
    }
}

/// Spreading-activation ranker.
#[derive(Debug, Clone, Default)]
pub struct ActivationRanker {
    config: RankerConfig,
}

impl ActivationRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Rank every node reachable from `seeds` within `max_hops`.
    ///
    /// Seeds absent from the graph are ignored. Deterministic for a fixed
    /// graph and seed set.
    pub fn rank(&self, graph: &KnowledgeGraph, seeds: &[EntityId]) -> Ranking {
        let max_hops = self.config.max_hops;
        let adjacency = graph.adjacency();

        // node -> remaining hop budget when first reached
        let mut budget: BTreeMap<EntityId, usize> = BTreeMap::new();
        let mut activation: BTreeMap<EntityId, f64> = BTreeMap::new();
        let mut hops: BTreeMap<EntityId, usize> = BTreeMap::new();

        let mut frontier: BTreeMap<EntityId, f64> = BTreeMap::new();
        for seed in seeds.iter().filter(|s| graph.contains_node(s)) {
            frontier.insert(seed.clone(), 1.0);
            budget.insert(seed.clone(), max_hops);
            activation.insert(seed.clone(), 1.0);
            hops.insert(seed.clone(), 0);
        }
        if frontier.is_empty() {
            return Ranking::default();
        }

        for hop in 1..=max_hops {
            let mut next: BTreeMap<EntityId, f64> = BTreeMap::new();
            for (node, signal) in &frontier {
                for (neighbor, relation) in adjacency.neighbors(node) {
                    // Contradicting edges are counter-evidence, not a route
                    if budget.contains_key(*neighbor)
                        || relation.polarity() == Polarity::Contradicts
                    {
                        continue;
                    }
                    let passed = signal * relation.weight * self.config.decay;
                    if passed > 0.0 {
                        *next.entry((*neighbor).clone()).or_default() += passed;
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            for (node, signal) in &next {
                budget.insert(node.clone(), max_hops - hop);
                hops.insert(node.clone(), hop);
                activation.insert(node.clone(), signal.min(1.0));
            }
            frontier = next;
        }

        let reached: BTreeSet<&EntityId> = activation
            .iter()
            .filter(|(_, a)| **a > 0.0)
            .map(|(id, _)| id)
            .collect();

        let nodes = reached
            .iter()
            .map(|id| {
                let relevance = activation.get(*id).copied().unwrap_or(0.0);
                let distance = hops.get(*id).copied().unwrap_or(0);
                let novelty = self.novelty(*id, distance, &reached, &adjacency);
                RankedNode {
                    id: (*id).clone(),
                    score: ActivationScore {
                        relevance,
                        novelty,
                        robust_score: relevance,
                    },
                    hops: distance,
                }
            })
            .collect();

        let ranking = Ranking::from_nodes(nodes, |s| s.relevance);
        debug!(
            seeds = seeds.len(),
            reached = ranking.len(),
            max_hops,
            "activation pass complete"
        );
        ranking
    }

    /// `(hops / max_hops) · (1 − hub_penalty · centrality)`, where centrality
    /// is the node's degree among reached nodes normalized by the reached
    /// count. Seeds score 0.
    fn novelty(
        &self,
        id: &EntityId,
        distance: usize,
        reached: &BTreeSet<&EntityId>,
        adjacency: &crate::graph::AdjacencyIndex<'_>,
    ) -> f64 {
        if distance == 0 || self.config.max_hops == 0 {
            return 0.0;
        }
        let reach = distance as f64 / self.config.max_hops as f64;
        let others = reached.len().saturating_sub(1);
        let centrality = if others == 0 {
            0.0
        } else {
            let linked: BTreeSet<&EntityId> = adjacency
                .neighbors(id)
                .iter()
                .map(|(n, _)| *n)
                .filter(|n| *n != id && reached.contains(n))
                .collect();
            linked.len() as f64 / others as f64
        };
        (reach * (1.0 - self.config.hub_penalty * centrality)).clamp(0.0, 1.0)
    }
}
