//! Relation (edge) representation
//!
//! The graph is a multigraph keyed by `(source, target, relation_type)`:
//! at most one merged relation exists per key.

use super::entity::{clamp_unit, default_confidence, EntityId, DEFAULT_CONFIDENCE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Relation types that assert the absence of a link.
const CONTRADICTING_TYPES: &[&str] = &["contradicts", "refutes", "no_association"];

/// Whether a relation supports or contradicts the link between its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Supports,
    Contradicts,
}

/// Normalize a relation type to lower snake case (`"Resistant To"` → `resistant_to`).
pub fn normalize_relation_type(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Identity of a merged edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: EntityId,
    pub target: EntityId,
    pub relation_type: String,
}

impl EdgeKey {
    pub fn new(source: &str, target: &str, relation_type: &str) -> Self {
        Self {
            source: EntityId::normalize(source),
            target: EntityId::normalize(target),
            relation_type: normalize_relation_type(relation_type),
        }
    }

    /// True if this edge touches `id` at either end.
    pub fn touches(&self, id: &EntityId) -> bool {
        &self.source == id || &self.target == id
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source, self.relation_type, self.target)
    }
}

/// A directed, weighted relation between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source: EntityId,
    pub target: EntityId,
    /// Relationship label (e.g. "drives", "resistant_to", "participates_in")
    pub relation_type: String,
    /// Relationship strength in [0, 1]
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Confidence in relationship validity in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Names of the sources that reported this relation
    #[serde(default)]
    pub provenance: BTreeSet<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl Relation {
    /// Create a relation between two raw ids (both normalized).
    pub fn new(source: &str, target: &str, relation_type: &str) -> Self {
        Self {
            source: EntityId::normalize(source),
            target: EntityId::normalize(target),
            relation_type: normalize_relation_type(relation_type),
            weight: 1.0,
            confidence: DEFAULT_CONFIDENCE,
            provenance: BTreeSet::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = clamp_unit(weight);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_provenance(mut self, source: impl Into<String>) -> Self {
        self.provenance.insert(source.into());
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source.clone(),
            target: self.target.clone(),
            relation_type: self.relation_type.clone(),
        }
    }

    pub fn polarity(&self) -> Polarity {
        if self.relation_type.starts_with("not_")
            || CONTRADICTING_TYPES.contains(&self.relation_type.as_str())
        {
            Polarity::Contradicts
        } else {
            Polarity::Supports
        }
    }

    /// The endpoint opposite `id`, if `id` is an endpoint.
    pub fn other_end(&self, id: &EntityId) -> Option<&EntityId> {
        if &self.source == id {
            Some(&self.target)
        } else if &self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }

    /// Evidence strength used by the validator: weight scaled by confidence.
    pub fn strength(&self) -> f64 {
        self.weight * self.confidence
    }
}
