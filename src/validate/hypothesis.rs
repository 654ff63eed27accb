//! Hypothesis: a candidate mechanistic claim and its supporting subgraph

use crate::graph::{EdgeKey, EntityId, Polarity, Relation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Outcome of adversarial validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Not yet validated
    Pending,
    /// Withstood the counter-query
    Survived,
    /// Outweighed by contradicting evidence
    Rejected,
    /// Neither side strong enough to decide; kept and flagged
    Inconclusive,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Pending => "pending",
            Verdict::Survived => "survived",
            Verdict::Rejected => "rejected",
            Verdict::Inconclusive => "inconclusive",
        };
        f.write_str(s)
    }
}

/// Pointer to one piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub edge: EdgeKey,
    pub polarity: Polarity,
    /// weight × confidence
    pub strength: f64,
    pub provenance: BTreeSet<String>,
}

impl EvidenceRef {
    pub fn from_relation(relation: &Relation) -> Self {
        Self {
            edge: relation.key(),
            polarity: relation.polarity(),
            strength: relation.strength(),
            provenance: relation.provenance.clone(),
        }
    }
}

/// Node and edge ids backing a hypothesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportingSubgraph {
    pub nodes: BTreeSet<EntityId>,
    pub edges: BTreeSet<EdgeKey>,
}

impl SupportingSubgraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// True if both endpoints of `key` are part of the subgraph.
    pub fn spans(&self, key: &EdgeKey) -> bool {
        self.nodes.contains(&key.source) && self.nodes.contains(&key.target)
    }
}

/// Validation evidence attached to a hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub verdict: Verdict,
    /// The counter-query that was issued
    pub counter_query: String,
    /// Strongest supporting evidence
    pub support_strength: f64,
    /// Strongest contradicting evidence
    pub contradiction_strength: f64,
    pub supporting: Vec<EvidenceRef>,
    pub contradicting: Vec<EvidenceRef>,
    /// Sources that failed to answer the counter-query
    pub counter_sources_failed: Vec<String>,
}

/// A candidate claim linking a seed (subject) to a ranked node (object).
///
/// The statement is fixed at creation; validation only ever sets the
/// verdict and its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Deterministic id derived from the statement
    pub id: Uuid,
    statement: String,
    pub subject: EntityId,
    pub object: EntityId,
    /// Relations from subject to object, in walk order
    pub path: Vec<EdgeKey>,
    pub supporting_subgraph: SupportingSubgraph,
    pub confidence: f64,
    pub novelty: f64,
    /// Refinement iteration in which the object first ranked
    pub first_ranked_iteration: usize,
    validation: Option<ValidationReport>,
}

impl Hypothesis {
    pub fn new(
        statement: impl Into<String>,
        subject: EntityId,
        object: EntityId,
        path: Vec<EdgeKey>,
    ) -> Self {
        let statement = statement.into();
        let mut supporting_subgraph = SupportingSubgraph::default();
        for key in &path {
            supporting_subgraph.nodes.insert(key.source.clone());
            supporting_subgraph.nodes.insert(key.target.clone());
            supporting_subgraph.edges.insert(key.clone());
        }
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, statement.as_bytes()),
            statement,
            subject,
            object,
            path,
            supporting_subgraph,
            confidence: 0.0,
            novelty: 0.0,
            first_ranked_iteration: 0,
            validation: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_novelty(mut self, novelty: f64) -> Self {
        self.novelty = novelty;
        self
    }

    pub fn with_first_ranked_iteration(mut self, iteration: usize) -> Self {
        self.first_ranked_iteration = iteration;
        self
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn verdict(&self) -> Verdict {
        self.validation.as_ref().map_or(Verdict::Pending, |v| v.verdict)
    }

    pub fn validation(&self) -> Option<&ValidationReport> {
        self.validation.as_ref()
    }

    pub(crate) fn set_validation(&mut self, report: ValidationReport) {
        self.validation = Some(report);
    }
}
