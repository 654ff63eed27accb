//! Hypothesis synthesis from the refined ranking
//!
//! Every top-ranked non-seed node becomes a candidate claim backed by the
//! shortest seed-to-node path in the graph. Nodes without such a path yield
//! no hypothesis, so a hypothesis never has an empty supporting subgraph.

use super::state::{RefinementConfig, RefinementStep};
use crate::graph::{EdgeKey, EntityId, KnowledgeGraph, Polarity, Relation};
use crate::rank::{RankedNode, Ranking};
use crate::validate::Hypothesis;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Shortest undirected path from any seed to `target`, as the relations
/// walked from the seed. Contradicting relations are not walked. `None` if
/// unreachable or `target` is a seed.
pub fn seed_path<'a>(
    graph: &'a KnowledgeGraph,
    seeds: &[EntityId],
    target: &EntityId,
) -> Option<(EntityId, Vec<&'a Relation>)> {
    let adjacency = graph.adjacency();
    let starts: BTreeSet<&EntityId> = seeds.iter().filter(|s| graph.contains_node(s)).collect();
    if starts.contains(target) {
        return None;
    }

    let mut predecessors: BTreeMap<&EntityId, (&EntityId, &Relation)> = BTreeMap::new();
    let mut visited: BTreeSet<&EntityId> = starts.clone();
    let mut queue: VecDeque<&EntityId> = starts.iter().copied().collect();

    while let Some(node) = queue.pop_front() {
        if node == target {
            break;
        }
        for (neighbor, relation) in adjacency.neighbors(node) {
            if relation.polarity() == Polarity::Contradicts {
                continue;
            }
            if visited.insert(*neighbor) {
                predecessors.insert(*neighbor, (node, *relation));
                queue.push_back(*neighbor);
            }
        }
    }

    let mut path = Vec::new();
    let mut cursor = predecessors.get(target).map(|_| target)?;
    while let Some((previous, relation)) = predecessors.get(cursor) {
        path.push(*relation);
        cursor = *previous;
    }
    path.reverse();
    Some((cursor.clone(), path))
}

/// Render a path as a readable claim.
fn statement(graph: &KnowledgeGraph, subject: &EntityId, object: &EntityId, path: &[&Relation]) -> String {
    let segment = |r: &Relation| {
        format!(
            "{} {} {}",
            graph.label_of(&r.source),
            r.relation_type.replace('_', " "),
            graph.label_of(&r.target)
        )
    };
    match path {
        [single] => segment(*single),
        _ => format!(
            "{} is linked to {} via {}",
            graph.label_of(subject),
            graph.label_of(object),
            path.iter().map(|r| segment(*r)).collect::<Vec<_>>().join("; ")
        ),
    }
}

/// Share of history steps whose top-K contains `id`.
fn stability(history: &[RefinementStep], id: &EntityId, k: usize) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let hits = history
        .iter()
        .filter(|s| s.ranking.top(k).iter().any(|n| &n.id == id))
        .count();
    hits as f64 / history.len() as f64
}

/// Score of `node` as reached from the query rather than as a probe seed.
///
/// A probed focus is seeded at full activation in later passes; its latest
/// earlier ranking where it was reached over at least one hop stands in.
fn reached_score(node: &RankedNode, history: &[RefinementStep]) -> RankedNode {
    if node.hops > 0 {
        return node.clone();
    }
    history
        .iter()
        .rev()
        .filter_map(|s| s.ranking.get(&node.id))
        .find(|n| n.hops > 0)
        .cloned()
        .unwrap_or_else(|| node.clone())
}

/// Build hypotheses for the best-ranked reachable non-seed nodes.
///
/// Confidence is the weakest link on the path scaled by how consistently the
/// object held a top-K position across the refinement history.
pub fn synthesize(
    graph: &KnowledgeGraph,
    ranking: &Ranking,
    seeds: &[EntityId],
    history: &[RefinementStep],
    config: &RefinementConfig,
) -> Vec<Hypothesis> {
    let seed_set: BTreeSet<&EntityId> = seeds.iter().collect();
    let candidates = Ranking::from_nodes(
        ranking
            .nodes
            .iter()
            .filter(|n| !seed_set.contains(&n.id))
            .map(|n| reached_score(n, history))
            .collect(),
        |s| s.robust_score,
    );
    let mut hypotheses = Vec::new();

    for candidate in &candidates.nodes {
        if hypotheses.len() >= config.max_hypotheses {
            break;
        }
        let Some((subject, path)) = seed_path(graph, seeds, &candidate.id) else {
            continue;
        };
        if path.is_empty() {
            continue;
        }

        let weakest = path.iter().map(|r| r.confidence).fold(1.0, f64::min);
        let confidence = weakest * (0.5 + 0.5 * stability(history, &candidate.id, config.top_k));
        let first_ranked = history
            .iter()
            .find(|s| s.ranking.get(&candidate.id).is_some())
            .map_or(history.len().saturating_sub(1), |s| s.iteration);
        let text = statement(graph, &subject, &candidate.id, &path);
        let keys: Vec<EdgeKey> = path.iter().map(|r| r.key()).collect();

        hypotheses.push(
            Hypothesis::new(text, subject, candidate.id.clone(), keys)
                .with_confidence(confidence)
                .with_novelty(candidate.score.novelty)
                .with_first_ranked_iteration(first_ranked),
        );
    }
    hypotheses
}
