//! RobustQueryEngine: paraphrase-stable ranking
//!
//! Runs aggregate → build → rank once per query variant and combines the
//! per-variant relevances as `mean − λ·stddev`. A node that is only relevant
//! under one wording is pulled down; a node relevant under every wording
//! keeps its score.

use super::activation::{ActivationRanker, RankedNode, Ranking};
use crate::aggregate::{Aggregation, ConcurrentAggregator, FetchBudget};
use crate::graph::{ActivationScore, EntityId, GraphBuilder, KnowledgeGraph};
use crate::llm::ResearchLlm;
use crate::query::SeedExtractor;
use crate::source::{normalize_query_text, QueryPurpose, SubQuery};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on variants per query, the original text included.
pub const MAX_VARIANTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobustConfig {
    /// Variance penalty λ
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    /// Variants per query, the original text included (1..=5)
    #[serde(default = "default_variants")]
    pub variants: usize,
}

fn default_lambda() -> f64 {
    0.5
}
fn default_variants() -> usize {
    3
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            lambda: default_lambda(),
            variants: default_variants(),
        }
    }
}

/// `mean(r) − λ·stddev(r)` with the population standard deviation.
/// Empty input scores 0.
pub fn robust_score(relevances: &[f64], lambda: f64) -> f64 {
    if relevances.is_empty() {
        return 0.0;
    }
    let n = relevances.len() as f64;
    let mean = relevances.iter().sum::<f64>() / n;
    let variance = relevances.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    mean - lambda * variance.sqrt()
}

/// Combine per-variant rankings into one robust ranking.
///
/// A node missing from a variant's ranking contributes relevance 0 for
/// that variant.
pub fn combine_rankings(rankings: &[Ranking], lambda: f64) -> Ranking {
    let nodes = relevance_matrix(rankings)
        .into_iter()
        .map(|(id, relevances)| {
            let present: Vec<&RankedNode> = rankings.iter().filter_map(|r| r.get(&id)).collect();
            let novelty =
                present.iter().map(|n| n.score.novelty).sum::<f64>() / present.len().max(1) as f64;
            let hops = present.iter().map(|n| n.hops).min().unwrap_or(0);
            RankedNode {
                id,
                score: ActivationScore {
                    relevance: relevances.iter().sum::<f64>() / relevances.len().max(1) as f64,
                    novelty,
                    robust_score: robust_score(&relevances, lambda),
                },
                hops,
            }
        })
        .collect();
    Ranking::from_nodes(nodes, |s| s.robust_score)
}

/// One variant's pass through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct VariantRun {
    pub text: String,
    pub seeds: Vec<EntityId>,
    pub aggregation: Aggregation,
    pub ranking: Ranking,
}

/// Output of a robust run.
#[derive(Debug, Clone)]
pub struct RobustRanking {
    pub variants: Vec<VariantRun>,
    /// Combined ranking, ordered by robust score
    pub ranking: Ranking,
    /// Running graph including every variant's fragments, scored
    pub graph: KnowledgeGraph,
}

impl RobustRanking {
    pub fn aggregations(&self) -> impl Iterator<Item = &Aggregation> {
        self.variants.iter().map(|v| &v.aggregation)
    }

    pub fn variant_texts(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.text.clone()).collect()
    }
}

/// Wraps the ranker with paraphrase variants and a variance penalty.
#[derive(Clone)]
pub struct RobustQueryEngine {
    aggregator: ConcurrentAggregator,
    ranker: ActivationRanker,
    extractor: Arc<dyn SeedExtractor>,
    llm: Arc<dyn ResearchLlm>,
    config: RobustConfig,
}

impl RobustQueryEngine {
    pub fn new(
        aggregator: ConcurrentAggregator,
        ranker: ActivationRanker,
        extractor: Arc<dyn SeedExtractor>,
        llm: Arc<dyn ResearchLlm>,
    ) -> Self {
        Self {
            aggregator,
            ranker,
            extractor,
            llm,
            config: RobustConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RobustConfig) -> Self {
        self.config = config;
        self
    }

    pub fn aggregator(&self) -> &ConcurrentAggregator {
        &self.aggregator
    }

    pub fn ranker(&self) -> &ActivationRanker {
        &self.ranker
    }

    pub fn llm(&self) -> &Arc<dyn ResearchLlm> {
        &self.llm
    }

    /// The query text followed by distinct paraphrases, at most
    /// `variants` in total. A failing collaborator leaves only the query.
    pub async fn variant_texts(&self, text: &str) -> Vec<String> {
        let wanted = self.config.variants.clamp(1, MAX_VARIANTS);
        let mut texts = vec![text.to_string()];
        if wanted == 1 {
            return texts;
        }

        let paraphrases = match self.llm.paraphrase(text, wanted - 1).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "paraphrase failed, ranking original query only");
                Vec::new()
            }
        };

        let mut seen: BTreeSet<String> = BTreeSet::new();
        seen.insert(normalize_query_text(text));
        for p in paraphrases {
            if texts.len() >= wanted {
                break;
            }
            if !p.trim().is_empty() && seen.insert(normalize_query_text(&p)) {
                texts.push(p);
            }
        }
        texts
    }

    /// Run every variant of `text` through aggregate → build → rank.
    ///
    /// A variant is seeded with `seeds` plus the entities extracted from its
    /// own wording. Each variant is ranked over the running graph plus its own
    /// fragments; afterwards every variant's fragments are folded into
    /// `builder`.
    pub async fn run(
        &self,
        text: &str,
        seeds: &[EntityId],
        purpose: QueryPurpose,
        builder: &mut GraphBuilder,
        budget: &FetchBudget,
    ) -> RobustRanking {
        let texts = self.variant_texts(text).await;
        let mut variants = Vec::with_capacity(texts.len());

        for (i, variant_text) in texts.into_iter().enumerate() {
            // Caller seeds (e.g. a probe's focus) plus whatever this wording names
            let mut variant_seeds = seeds.to_vec();
            variant_seeds.extend(self.extractor.extract(&variant_text).into_iter().map(|e| e.id));
            let variant_purpose = if i == 0 { purpose } else { QueryPurpose::Variant };
            let sub_query = SubQuery::new(variant_text.clone(), variant_seeds, variant_purpose);

            let aggregation = self.aggregator.aggregate(&sub_query, budget).await;

            let mut local = builder.clone();
            local.absorb_aggregation(&aggregation);
            let graph = local.build();
            let ranking = self.ranker.rank(&graph, &sub_query.seeds);
            debug!(
                variant = %variant_text,
                nodes = graph.node_count(),
                reached = ranking.len(),
                "variant ranked"
            );

            variants.push(VariantRun {
                text: variant_text,
                seeds: sub_query.seeds,
                aggregation,
                ranking,
            });
        }

        for variant in &variants {
            builder.absorb_aggregation(&variant.aggregation);
        }

        let rankings: Vec<Ranking> = variants.iter().map(|v| v.ranking.clone()).collect();
        let ranking = combine_rankings(&rankings, self.config.lambda);
        let mut graph = builder.build();
        ranking.apply_to(&mut graph);

        RobustRanking {
            variants,
            ranking,
            graph,
        }
    }
}

/// Per-node relevance across variants, 0 where a variant missed the node.
pub fn relevance_matrix(rankings: &[Ranking]) -> BTreeMap<EntityId, Vec<f64>> {
    let ids: BTreeSet<&EntityId> = rankings.iter().flat_map(|r| r.ids()).collect();
    ids.into_iter()
        .map(|id| (id.clone(), rankings.iter().map(|r| r.relevance_of(id)).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(scores: &[(&str, f64)]) -> Ranking {
        let nodes = scores
            .iter()
            .map(|(id, r)| RankedNode {
                id: EntityId::from(*id),
                score: ActivationScore {
                    relevance: *r,
                    novelty: 0.0,
                    robust_score: *r,
                },
                hops: 1,
            })
            .collect();
        Ranking::from_nodes(nodes, |s| s.relevance)
    }

    #[test]
    fn consistent_node_beats_wording_artifact() {
        let steady = robust_score(&[0.9; 5], 0.5);
        let quirky = robust_score(&[0.9, 0.9, 0.9, 0.9, 0.1], 0.5);
        assert!((steady - 0.9).abs() < 1e-12);
        assert!(quirky < steady);
    }

    #[test]
    fn robust_score_uses_population_stddev() {
        // mean 0.5, population stddev 0.5
        assert!((robust_score(&[1.0, 0.0], 1.0) - 0.0).abs() < 1e-12);
        assert_eq!(robust_score(&[], 0.5), 0.0);
    }

    #[test]
    fn absent_nodes_count_as_zero() {
        let a = ranking(&[("kras", 0.8), ("egfr", 0.4)]);
        let b = ranking(&[("kras", 0.8)]);
        let combined = combine_rankings(&[a, b], 0.5);

        let egfr = combined.get(&EntityId::from("egfr")).unwrap();
        assert!((egfr.score.relevance - 0.2).abs() < 1e-12);
        assert!((egfr.score.robust_score - (0.2 - 0.5 * 0.2)).abs() < 1e-12);
        assert_eq!(combined.ids()[0].as_str(), "kras");
    }

    #[test]
    fn combined_ranking_orders_by_robust_score() {
        let a = ranking(&[("steady", 0.6), ("spiky", 0.9)]);
        let b = ranking(&[("steady", 0.6), ("spiky", 0.1)]);
        let combined = combine_rankings(&[a, b], 0.5);
        assert_eq!(
            combined.ids().iter().map(|i| i.as_str()).collect::<Vec<_>>(),
            vec!["steady", "spiky"]
        );
    }

    #[test]
    fn relevance_matrix_fills_missing_with_zero() {
        let a = ranking(&[("x", 0.5)]);
        let b = ranking(&[("y", 0.25)]);
        let matrix = relevance_matrix(&[a, b]);
        assert_eq!(matrix[&EntityId::from("x")], vec![0.5, 0.0]);
        assert_eq!(matrix[&EntityId::from("y")], vec![0.0, 0.25]);
    }
}
