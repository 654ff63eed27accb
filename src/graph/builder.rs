//! GraphBuilder: merges per-source fragments into one canonical graph
//!
//! Merge rules:
//! - node ids are normalized before insertion
//! - on id collision confidence becomes the max and provenance the union
//! - on edge-key collision weight becomes the confidence-weighted average
//!   `Σ wᵢ·cᵢ / Σ cᵢ` and confidence the max
//! - edges whose endpoints did not both survive are dropped
//!
//! The merge is associative and commutative in source order: contributions
//! are accumulated and only reduced in `build()`, after being sorted.

use super::entity::{clamp_unit, Entity, EntityId};
use super::knowledge_graph::KnowledgeGraph;
use super::relation::{EdgeKey, Relation};
use crate::aggregate::Aggregation;
use crate::source::{Fragment, SourceOutcome};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Every report of one edge key, pending reduction.
#[derive(Debug, Clone, Default)]
struct EdgeAccumulator {
    /// (weight, confidence) per report
    contributions: Vec<(f64, f64)>,
    provenance: BTreeSet<String>,
}

impl EdgeAccumulator {
    fn reduce(&self, key: &EdgeKey) -> Relation {
        let mut reports = self.contributions.clone();
        reports.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));

        let confidence_mass: f64 = reports.iter().map(|(_, c)| c).sum();
        let weight = if confidence_mass > 0.0 {
            reports.iter().map(|(w, c)| w * c).sum::<f64>() / confidence_mass
        } else {
            // All reports carry zero confidence: plain mean
            reports.iter().map(|(w, _)| w).sum::<f64>() / reports.len().max(1) as f64
        };
        let confidence = reports.iter().map(|(_, c)| *c).fold(0.0, f64::max);

        Relation {
            source: key.source.clone(),
            target: key.target.clone(),
            relation_type: key.relation_type.clone(),
            weight,
            confidence,
            provenance: self.provenance.clone(),
        }
    }
}

/// Accumulates fragments and produces canonical graphs.
///
/// A builder can be kept across refinement iterations: absorbing a new
/// fragment and rebuilding gives the same graph as merging every fragment
/// from scratch.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    nodes: BTreeMap<EntityId, Entity>,
    edges: BTreeMap<EdgeKey, EdgeAccumulator>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct (normalized) entities absorbed so far.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Absorb one fragment reported by `source_id`.
    pub fn absorb_fragment(&mut self, source_id: &str, fragment: &Fragment) {
        for entity in &fragment.nodes {
            let mut entity = entity.clone();
            entity.provenance.insert(source_id.to_string());
            self.absorb_entity(entity);
        }
        for relation in &fragment.edges {
            let mut relation = relation.clone();
            relation.provenance.insert(source_id.to_string());
            self.absorb_relation(relation);
        }
    }

    /// Absorb a source outcome; only `Fragment` outcomes contribute.
    pub fn absorb_outcome(&mut self, source_id: &str, outcome: &SourceOutcome) {
        if let SourceOutcome::Fragment(fragment) = outcome {
            self.absorb_fragment(source_id, fragment);
        }
    }

    /// Absorb every successful report of an aggregation.
    pub fn absorb_aggregation(&mut self, aggregation: &Aggregation) {
        for report in &aggregation.reports {
            self.absorb_outcome(&report.source_id, &report.outcome);
        }
    }

    /// Fold another builder's pending state into this one.
    pub fn extend(&mut self, other: &GraphBuilder) {
        for entity in other.nodes.values() {
            self.absorb_entity(entity.clone());
        }
        for (key, acc) in &other.edges {
            let target = self.edges.entry(key.clone()).or_default();
            target.contributions.extend(acc.contributions.iter().copied());
            target.provenance.extend(acc.provenance.iter().cloned());
        }
    }

    fn absorb_entity(&mut self, mut entity: Entity) {
        entity.id = if entity.id.is_empty() {
            EntityId::normalize(&entity.label)
        } else {
            EntityId::normalize(entity.id.as_str())
        };
        entity.confidence = clamp_unit(entity.confidence);
        if entity.id.is_empty() {
            return;
        }
        match self.nodes.entry(entity.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(entity);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                let mut provenance = std::mem::take(&mut existing.provenance);
                provenance.extend(entity.provenance.iter().cloned());
                if entity.outranks(existing) {
                    *existing = entity;
                }
                existing.provenance = provenance;
            }
        }
    }

    fn absorb_relation(&mut self, relation: Relation) {
        let key = EdgeKey::new(
            relation.source.as_str(),
            relation.target.as_str(),
            &relation.relation_type,
        );
        if key.source.is_empty() || key.target.is_empty() || key.relation_type.is_empty() {
            return;
        }
        let acc = self.edges.entry(key).or_default();
        acc.contributions
            .push((clamp_unit(relation.weight), clamp_unit(relation.confidence)));
        acc.provenance.extend(relation.provenance);
    }

    /// Reduce the accumulated state into a canonical graph.
    pub fn build(&self) -> KnowledgeGraph {
        let edges = self.edges.iter().map(|(key, acc)| acc.reduce(key));
        let (graph, dropped) = KnowledgeGraph::from_parts(self.nodes.clone(), edges);
        if dropped > 0 {
            debug!(dropped, "dropped dangling edges during graph build");
        }
        graph
    }
}

/// Merge a set of `(source id, outcome)` results into one graph.
pub fn merge_outcomes<'a>(
    outcomes: impl IntoIterator<Item = (&'a str, &'a SourceOutcome)>,
) -> KnowledgeGraph {
    let mut builder = GraphBuilder::new();
    for (source_id, outcome) in outcomes {
        builder.absorb_outcome(source_id, outcome);
    }
    builder.build()
}
