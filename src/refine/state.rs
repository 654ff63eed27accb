//! Refinement state and the pure next-action decision

use crate::graph::EntityId;
use crate::rank::Ranking;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Probe iterations after the initial ranking
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Size of the head compared between rankings and mined for probes
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Rank correlation at or above which rankings count as converged
    #[serde(default = "default_similarity_bound")]
    pub similarity_bound: f64,
    /// Minimum novelty for a node to be worth probing
    #[serde(default = "default_novelty_floor")]
    pub novelty_floor: f64,
    /// Hypotheses synthesized from the final ranking
    #[serde(default = "default_max_hypotheses")]
    pub max_hypotheses: usize,
}

fn default_max_iterations() -> usize {
    3
}
fn default_top_k() -> usize {
    5
}
fn default_similarity_bound() -> f64 {
    0.95
}
fn default_novelty_floor() -> f64 {
    0.2
}
fn default_max_hypotheses() -> usize {
    5
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            top_k: default_top_k(),
            similarity_bound: default_similarity_bound(),
            novelty_floor: default_novelty_floor(),
            max_hypotheses: default_max_hypotheses(),
        }
    }
}

/// One `(query, ranking)` entry of the refinement history.
#[derive(Debug, Clone, Serialize)]
pub struct RefinementStep {
    /// 0 for the initial ranking, then one per probe
    pub iteration: usize,
    pub query: String,
    /// Node the probe was aimed at; `None` for the initial ranking
    pub focus: Option<EntityId>,
    pub ranking: Ranking,
    /// Nodes this step added to the running graph
    pub new_nodes: usize,
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    MaxIterations,
    /// Successive top-K rankings correlate at or above the bound
    Converged { similarity: f64 },
    NoNewNodes,
    /// No sufficiently novel, unprobed node left
    NoProbeCandidates,
    /// The formulated probe repeats an earlier query
    RepeatedProbe,
    DeadlineElapsed,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxIterations => write!(f, "max iterations reached"),
            Self::Converged { similarity } => write!(f, "converged (similarity {:.3})", similarity),
            Self::NoNewNodes => write!(f, "no new nodes"),
            Self::NoProbeCandidates => write!(f, "no probe candidates"),
            Self::RepeatedProbe => write!(f, "repeated probe"),
            Self::DeadlineElapsed => write!(f, "request deadline elapsed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    Probe { focus: EntityId },
    Stop(TerminationReason),
}

/// Spearman rank correlation of two rankings' top-K heads.
///
/// Computed over the union of both heads; a node missing from one head
/// takes rank K there. Two empty heads are identical (1.0).
pub fn top_k_similarity(previous: &Ranking, current: &Ranking, k: usize) -> f64 {
    let a = previous.top(k);
    let b = current.top(k);
    let union: BTreeSet<&EntityId> = a.iter().chain(b.iter()).map(|n| &n.id).collect();
    let n = union.len();
    if n == 0 {
        return 1.0;
    }
    if n == 1 {
        return if a.len() == b.len() { 1.0 } else { 0.0 };
    }
    let rank_in = |head: &[crate::rank::RankedNode], id: &EntityId| {
        head.iter().position(|x| &x.id == id).unwrap_or(k) as f64
    };
    let d2: f64 = union
        .iter()
        .map(|id| (rank_in(a, *id) - rank_in(b, *id)).powi(2))
        .sum();
    let n = n as f64;
    1.0 - 6.0 * d2 / (n * (n * n - 1.0))
}

/// Decide what the loop does next from its history alone.
///
/// Stop conditions, first match wins: iteration budget spent, successive
/// rankings converged, last probe found nothing new. Otherwise probe the
/// most novel unprobed node of the current head, if any clears the floor.
pub fn decide(history: &[RefinementStep], config: &RefinementConfig) -> NextAction {
    let Some(current) = history.last() else {
        return NextAction::Stop(TerminationReason::NoProbeCandidates);
    };

    let probes_run = history.len() - 1;
    if probes_run >= config.max_iterations {
        return NextAction::Stop(TerminationReason::MaxIterations);
    }

    if let [.., previous, _] = history {
        let similarity = top_k_similarity(&previous.ranking, &current.ranking, config.top_k);
        if similarity >= config.similarity_bound {
            return NextAction::Stop(TerminationReason::Converged { similarity });
        }
        if current.new_nodes == 0 {
            return NextAction::Stop(TerminationReason::NoNewNodes);
        }
    }

    let probed: BTreeSet<&EntityId> = history.iter().filter_map(|s| s.focus.as_ref()).collect();

    // Most novel first; the head is the top_k of the novelty ordering
    let mut candidates: Vec<&crate::rank::RankedNode> = current
        .ranking
        .nodes
        .iter()
        .filter(|n| n.hops > 0 && n.score.novelty >= config.novelty_floor)
        .collect();
    candidates.sort_by(|a, b| {
        b.score
            .novelty
            .total_cmp(&a.score.novelty)
            .then_with(|| b.score.robust_score.total_cmp(&a.score.robust_score))
            .then_with(|| a.id.cmp(&b.id))
    });

    candidates
        .into_iter()
        .take(config.top_k.max(1))
        .find(|n| !probed.contains(&n.id))
        .map(|n| NextAction::Probe { focus: n.id.clone() })
        .unwrap_or(NextAction::Stop(TerminationReason::NoProbeCandidates))
}
