//! Source layer types
//!
//! - SubQuery: the query fragment handed to every adapter
//! - Fragment: the partial graph one source contributes
//! - SourceOutcome: Fragment | Empty | Failed(reason), the only shape an
//!   aggregation ever sees

use crate::graph::{Entity, EntityId, Relation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classes of external knowledge providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Target–disease association databases
    TargetDisease,
    /// Literature search
    Literature,
    /// Clinical trial registries
    TrialRegistry,
    /// Expression atlases
    ExpressionAtlas,
    /// Pathway ontologies
    PathwayOntology,
}

/// Why a query fragment is being issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPurpose {
    /// The caller's own query text
    Primary,
    /// A paraphrase of the primary query
    Variant,
    /// A narrower follow-up from the refinement loop
    Probe,
    /// A search for evidence against a hypothesis
    Counter,
}

/// A query fragment sent to the sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuery {
    pub text: String,
    /// Entities the fragment is about
    pub seeds: Vec<EntityId>,
    pub purpose: QueryPurpose,
}

impl SubQuery {
    pub fn new(text: impl Into<String>, seeds: Vec<EntityId>, purpose: QueryPurpose) -> Self {
        let mut seeds = seeds;
        seeds.sort();
        seeds.dedup();
        Self {
            text: text.into(),
            seeds,
            purpose,
        }
    }

    pub fn primary(text: impl Into<String>, seeds: Vec<EntityId>) -> Self {
        Self::new(text, seeds, QueryPurpose::Primary)
    }

    /// Lower-cased, whitespace-collapsed text.
    pub fn normalized_text(&self) -> String {
        normalize_query_text(&self.text)
    }
}

/// Lower-case a query and collapse its whitespace.
pub fn normalize_query_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The partial graph contributed by one source for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default)]
    pub nodes: Vec<Entity>,
    #[serde(default)]
    pub edges: Vec<Relation>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: Entity) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: Relation) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Append another fragment's contents.
    pub fn extend(&mut self, other: Fragment) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }
}

/// Why a source call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The call exceeded its per-call timeout or the request deadline
    Timeout { after_ms: u64 },
    /// The adapter reported an error
    Error { message: String },
    /// The adapter task panicked or was aborted
    Panicked { message: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { after_ms } => write!(f, "timeout after {}ms", after_ms),
            Self::Error { message } => write!(f, "{}", message),
            Self::Panicked { message } => write!(f, "task failed: {}", message),
        }
    }
}

/// Errors an adapter reports from `fetch`.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response parse error: {0}")]
    Parse(String),
    #[error("rate limited")]
    RateLimited,
}

/// Result of one source call as seen by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum SourceOutcome {
    Fragment(Fragment),
    Empty,
    Failed(FailureReason),
}

impl SourceOutcome {
    /// Map an adapter's fetch result; an empty fragment becomes `Empty`.
    pub fn from_fetch(result: Result<Fragment, SourceError>) -> Self {
        match result {
            Ok(fragment) if fragment.is_empty() => Self::Empty,
            Ok(fragment) => Self::Fragment(fragment),
            Err(e) => Self::Failed(FailureReason::Error {
                message: e.to_string(),
            }),
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Failed(FailureReason::Timeout {
            after_ms: after.as_millis() as u64,
        })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn fragment(&self) -> Option<&Fragment> {
        match self {
            Self::Fragment(f) => Some(f),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}
