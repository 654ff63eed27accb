//! Research assistant collaborator: query paraphrasing and probe formulation
//!
//! Defines the injected collaborator trait used by the robust engine and the
//! refinement loop. Two implementations:
//! - `OfflineLlm`: deterministic synonym and template rewriting (default)
//! - `MockLlm`: returns preconfigured responses (testing)
//!
//! Callers treat every `LlmError` as recoverable: they fall back to the
//! original query or a template and log a warning.

use crate::graph::EntityId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Errors from collaborator calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("collaborator not available: {0}")]
    Unavailable(String),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("response parse error: {0}")]
    ParseError(String),
}

/// Input for a narrower follow-up query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    /// The caller's original question
    pub original_query: String,
    /// Node the probe should explore
    pub focus: EntityId,
    pub focus_label: String,
    /// Labels of the current best-ranked nodes, most relevant first
    pub context: Vec<String>,
}

/// Input for a counter-evidence query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterRequest {
    pub statement: String,
    pub subject_label: String,
    pub object_label: String,
    /// Relation types along the supporting path
    pub relations: Vec<String>,
}

/// Text-generation collaborator used for variants, probes and counter-queries.
#[async_trait]
pub trait ResearchLlm: Send + Sync {
    /// Up to `count` semantically-equivalent rewrites of `query`.
    async fn paraphrase(&self, query: &str, count: usize) -> Result<Vec<String>, LlmError>;

    /// A narrower follow-up query focused on an under-explored node.
    async fn formulate_probe(&self, request: &ProbeRequest) -> Result<String, LlmError>;

    /// A query designed to surface evidence against a claim.
    async fn formulate_counter_query(&self, request: &CounterRequest) -> Result<String, LlmError>;
}

/// Template probe used when the collaborator fails.
pub fn template_probe(request: &ProbeRequest) -> String {
    format!("{} in {}", request.focus_label, request.original_query)
}

/// Template counter-query used when the collaborator fails.
pub fn template_counter_query(request: &CounterRequest) -> String {
    format!(
        "evidence against {} {} {}",
        request.subject_label,
        request.relations.join(" "),
        request.object_label
    )
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// Word pairs used for synonym substitution, applied in both directions.
const SYNONYMS: &[(&str, &str)] = &[
    ("lung cancer", "non-small cell lung cancer"),
    ("nsclc", "non-small cell lung cancer"),
    ("resistance", "acquired resistance"),
    ("cancer", "tumor"),
    ("mutation", "variant"),
    ("inhibitor", "blocker"),
    ("treatment", "therapy"),
    ("mechanism", "pathway"),
];

/// Deterministic, model-free collaborator.
///
/// Paraphrases by synonym substitution, then by specificity shift
/// ("mechanisms of ..."). Never fails.
#[derive(Debug, Clone, Default)]
pub struct OfflineLlm;

impl OfflineLlm {
    pub fn new() -> Self {
        Self
    }
}

fn replace_term(text: &str, from: &str, to: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    if lower.contains(to) {
        return None;
    }
    let start = lower.match_indices(from).find_map(|(i, _)| {
        let end = i + from.len();
        let before = lower[..i].chars().next_back().map_or(true, |c| !c.is_alphanumeric() && c != '-');
        let after = lower[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        (before && after).then_some(i)
    })?;
    let end = start + from.len();
    Some(format!("{}{}{}", &text[..start], to, &text[end..]))
}

#[async_trait]
impl ResearchLlm for OfflineLlm {
    async fn paraphrase(&self, query: &str, count: usize) -> Result<Vec<String>, LlmError> {
        let mut seen = BTreeSet::new();
        seen.insert(query.to_lowercase());
        let mut variants = Vec::new();

        let mut candidates = Vec::new();
        for (a, b) in SYNONYMS {
            candidates.extend(replace_term(query, a, b));
            candidates.extend(replace_term(query, b, a));
        }
        candidates.push(format!("mechanisms of {}", query));
        candidates.push(format!("{} molecular basis", query));

        for candidate in candidates {
            if variants.len() >= count {
                break;
            }
            if seen.insert(candidate.to_lowercase()) {
                variants.push(candidate);
            }
        }
        Ok(variants)
    }

    async fn formulate_probe(&self, request: &ProbeRequest) -> Result<String, LlmError> {
        Ok(template_probe(request))
    }

    async fn formulate_counter_query(&self, request: &CounterRequest) -> Result<String, LlmError> {
        Ok(template_counter_query(request))
    }
}

/// Mock collaborator for testing: returns preconfigured responses.
#[derive(Debug, Default)]
pub struct MockLlm {
    available: bool,
    paraphrases: Vec<String>,
    probes: Vec<String>,
    probes_served: AtomicUsize,
    counter_query: Option<String>,
}

impl MockLlm {
    /// A mock that answers with whatever it was configured with.
    pub fn available() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    /// A mock whose every call fails.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn with_paraphrases(mut self, variants: Vec<&str>) -> Self {
        self.paraphrases = variants.into_iter().map(String::from).collect();
        self
    }

    /// Probe texts, served in order; the last one repeats.
    pub fn with_probes(mut self, probes: Vec<&str>) -> Self {
        self.probes = probes.into_iter().map(String::from).collect();
        self
    }

    pub fn with_counter_query(mut self, query: impl Into<String>) -> Self {
        self.counter_query = Some(query.into());
        self
    }

    fn check(&self) -> Result<(), LlmError> {
        if self.available {
            Ok(())
        } else {
            Err(LlmError::Unavailable(
                "mock collaborator configured as unavailable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl ResearchLlm for MockLlm {
    async fn paraphrase(&self, _query: &str, count: usize) -> Result<Vec<String>, LlmError> {
        self.check()?;
        Ok(self.paraphrases.iter().take(count).cloned().collect())
    }

    async fn formulate_probe(&self, _request: &ProbeRequest) -> Result<String, LlmError> {
        self.check()?;
        let served = self.probes_served.fetch_add(1, Ordering::Relaxed);
        let index = served.min(self.probes.len().saturating_sub(1));
        self.probes
            .get(index)
            .cloned()
            .ok_or_else(|| LlmError::GenerationFailed("no probe configured".to_string()))
    }

    async fn formulate_counter_query(&self, _request: &CounterRequest) -> Result<String, LlmError> {
        self.check()?;
        self.counter_query
            .clone()
            .ok_or_else(|| LlmError::GenerationFailed("no counter query configured".to_string()))
    }
}
