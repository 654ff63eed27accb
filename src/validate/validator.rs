//! AdversarialValidator: counter-queries every hypothesis before it surfaces
//!
//! Evidence considered is any relation spanning two nodes of the
//! hypothesis' supporting subgraph, taken from the assembled graph and from
//! the counter-query's fragments. Strength is weight × confidence.

use super::hypothesis::{EvidenceRef, Hypothesis, ValidationReport, Verdict};
use crate::aggregate::{Aggregation, ConcurrentAggregator, FetchBudget};
use crate::graph::{EdgeKey, KnowledgeGraph, Polarity, Relation};
use crate::llm::{template_counter_query, CounterRequest, ResearchLlm};
use crate::source::{QueryPurpose, SubQuery};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("hypothesis {id} reached validation with an empty supporting subgraph")]
    EmptySupport { id: Uuid },
}

/// Verdict thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Contradicting strength at or above which a hypothesis can be rejected
    #[serde(default = "default_contradiction_threshold")]
    pub contradiction_threshold: f64,
    /// Supporting strength below which, absent strong contradiction, the
    /// verdict is inconclusive
    #[serde(default = "default_support_threshold")]
    pub support_threshold: f64,
}

fn default_contradiction_threshold() -> f64 {
    0.6
}
fn default_support_threshold() -> f64 {
    0.3
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            contradiction_threshold: default_contradiction_threshold(),
            support_threshold: default_support_threshold(),
        }
    }
}

/// Result of validating a batch of hypotheses.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    /// Survived and inconclusive hypotheses, input order preserved
    pub kept: Vec<Hypothesis>,
    pub rejected: Vec<Hypothesis>,
    /// One aggregation per counter-query
    pub aggregations: Vec<Aggregation>,
}

pub struct AdversarialValidator {
    aggregator: ConcurrentAggregator,
    llm: Arc<dyn ResearchLlm>,
    config: ValidatorConfig,
}

impl AdversarialValidator {
    pub fn new(aggregator: ConcurrentAggregator, llm: Arc<dyn ResearchLlm>) -> Self {
        Self {
            aggregator,
            llm,
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Decide a verdict from the strongest evidence on each side.
    ///
    /// `counter_searched` is false when no source answered the
    /// counter-query, in which case the rebuttal never happened.
    pub fn decide(&self, support: f64, contradiction: f64, counter_searched: bool) -> Verdict {
        let strong_contradiction = contradiction >= self.config.contradiction_threshold;
        if strong_contradiction && support < contradiction {
            Verdict::Rejected
        } else if !counter_searched {
            Verdict::Inconclusive
        } else if !strong_contradiction && support < self.config.support_threshold {
            Verdict::Inconclusive
        } else {
            Verdict::Survived
        }
    }

    /// Counter-query one hypothesis and record the verdict on it.
    pub async fn validate(
        &self,
        hypothesis: &mut Hypothesis,
        graph: &KnowledgeGraph,
        budget: &FetchBudget,
    ) -> Result<Aggregation, ValidationError> {
        if hypothesis.supporting_subgraph.is_empty() {
            return Err(ValidationError::EmptySupport { id: hypothesis.id });
        }

        let request = CounterRequest {
            statement: hypothesis.statement().to_string(),
            subject_label: graph.label_of(&hypothesis.subject).to_string(),
            object_label: graph.label_of(&hypothesis.object).to_string(),
            relations: hypothesis
                .path
                .iter()
                .map(|k| k.relation_type.replace('_', " "))
                .collect(),
        };
        let counter_query = match self.llm.formulate_counter_query(&request).await {
            Ok(q) if !q.trim().is_empty() => q,
            Ok(_) => template_counter_query(&request),
            Err(e) => {
                warn!(error = %e, "counter-query formulation failed, using template");
                template_counter_query(&request)
            }
        };

        let sub_query = SubQuery::new(
            counter_query.clone(),
            vec![hypothesis.subject.clone(), hypothesis.object.clone()],
            QueryPurpose::Counter,
        );
        let aggregation = self.aggregator.aggregate(&sub_query, budget).await;

        // Strongest report per edge key across graph and counter results
        let mut evidence: BTreeMap<EdgeKey, EvidenceRef> = BTreeMap::new();
        let mut consider = |relation: &Relation| {
            let key = EdgeKey::new(
                relation.source.as_str(),
                relation.target.as_str(),
                &relation.relation_type,
            );
            if !hypothesis.supporting_subgraph.spans(&key) {
                return;
            }
            let mut item = EvidenceRef::from_relation(relation);
            item.edge = key.clone();
            match evidence.get_mut(&key) {
                Some(existing) => {
                    existing.provenance.extend(item.provenance);
                    existing.strength = existing.strength.max(item.strength);
                }
                None => {
                    evidence.insert(key, item);
                }
            }
        };
        for relation in graph.edges() {
            consider(relation);
        }
        for (source_id, fragment) in aggregation.fragments() {
            for relation in &fragment.edges {
                let mut relation = relation.clone();
                relation.provenance.insert(source_id.to_string());
                consider(&relation);
            }
        }

        let (mut supporting, mut contradicting): (Vec<EvidenceRef>, Vec<EvidenceRef>) = evidence
            .into_values()
            .partition(|e| e.polarity == Polarity::Supports);
        let by_strength = |a: &EvidenceRef, b: &EvidenceRef| {
            b.strength.total_cmp(&a.strength).then_with(|| a.edge.cmp(&b.edge))
        };
        supporting.sort_by(by_strength);
        contradicting.sort_by(by_strength);

        let support = supporting.first().map_or(0.0, |e| e.strength);
        let contradiction = contradicting.first().map_or(0.0, |e| e.strength);
        let counter_searched = !aggregation.reports.is_empty() && !aggregation.all_failed();
        let verdict = self.decide(support, contradiction, counter_searched);

        info!(
            hypothesis = %hypothesis.id,
            %verdict,
            support,
            contradiction,
            "hypothesis validated"
        );

        hypothesis.set_validation(ValidationReport {
            verdict,
            counter_query,
            support_strength: support,
            contradiction_strength: contradiction,
            supporting,
            contradicting,
            counter_sources_failed: aggregation
                .sources_failed()
                .into_iter()
                .map(String::from)
                .collect(),
        });
        Ok(aggregation)
    }

    /// Validate every hypothesis, splitting rejected ones off.
    pub async fn validate_all(
        &self,
        hypotheses: Vec<Hypothesis>,
        graph: &KnowledgeGraph,
        budget: &FetchBudget,
    ) -> Result<ValidationOutcome, ValidationError> {
        let mut outcome = ValidationOutcome::default();
        for mut hypothesis in hypotheses {
            let aggregation = self.validate(&mut hypothesis, graph, budget).await?;
            outcome.aggregations.push(aggregation);
            if hypothesis.verdict() == Verdict::Rejected {
                outcome.rejected.push(hypothesis);
            } else {
                outcome.kept.push(hypothesis);
            }
        }
        Ok(outcome)
    }
}
