//! Caller-facing entry point.
//!
//! `Explorer::explore` runs the whole pipeline for one question:
//! seed extraction → robust ranking → refinement → synthesis → adversarial
//! validation. Per-source failures never fail the request; they are counted
//! in `Diagnostics`. Only the two pipeline-fatal states short-circuit.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{Aggregation, ConcurrentAggregator, FetchBudget};
use crate::config::EngineConfig;
use crate::graph::{EntityId, GraphBuilder, KnowledgeGraph};
use crate::llm::{OfflineLlm, ResearchLlm};
use crate::query::{LexiconExtractor, QueryContext, SeedExtractor};
use crate::rank::{ActivationRanker, RankerConfig, RobustConfig, RobustQueryEngine, MAX_VARIANTS};
use crate::refine::{
    synthesize, AgenticRefinementLoop, RefinementConfig, RefinementStep, TerminationReason,
};
use crate::source::{
    CacheStats, FailureReason, QueryPurpose, ResponseCache, SourceOutcome, SourceRegistry,
};
use crate::validate::{AdversarialValidator, Hypothesis, ValidationError, Verdict};

/// Pipeline-fatal outcomes of `explore`.
#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("no recognisable entities in query: {query:?}")]
    SeedExtraction { query: String },

    #[error("every source failed or returned nothing ({} failed)", .0.sources_failed.len())]
    GraphEmpty(Box<Diagnostics>),

    #[error("invariant violated: {0}")]
    InvariantViolation(#[from] ValidationError),
}

/// Per-request knobs. Built from the engine config, overridable per call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExploreOptions {
    pub max_hops: usize,
    pub max_refinement_iterations: usize,
    /// Query variants including the original (1..=5)
    pub robustness_variants: usize,
    pub per_source_timeout_ms: u64,
    /// Whole-request deadline; 0 disables it
    pub request_deadline_ms: u64,
}

impl ExploreOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_hops: config.ranker.max_hops,
            max_refinement_iterations: config.refinement.max_iterations,
            robustness_variants: config.robust.variants.clamp(1, MAX_VARIANTS),
            per_source_timeout_ms: config.aggregator.per_source_timeout_ms,
            request_deadline_ms: config.aggregator.request_deadline_ms,
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_max_refinement_iterations(mut self, iterations: usize) -> Self {
        self.max_refinement_iterations = iterations;
        self
    }

    pub fn with_robustness_variants(mut self, variants: usize) -> Self {
        self.robustness_variants = variants.clamp(1, MAX_VARIANTS);
        self
    }

    pub fn with_per_source_timeout_ms(mut self, ms: u64) -> Self {
        self.per_source_timeout_ms = ms;
        self
    }

    pub fn with_request_deadline_ms(mut self, ms: u64) -> Self {
        self.request_deadline_ms = ms;
        self
    }

    fn budget(&self, started: tokio::time::Instant) -> FetchBudget {
        let budget = FetchBudget::new(Duration::from_millis(self.per_source_timeout_ms.max(1)));
        if self.request_deadline_ms > 0 {
            budget.with_deadline(started + Duration::from_millis(self.request_deadline_ms))
        } else {
            budget
        }
    }
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// One failed source call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub source_id: String,
    pub query: String,
    pub purpose: QueryPurpose,
    pub reason: FailureReason,
}

/// Mandatory per-request report.
///
/// Source lists partition every source that was asked anything:
/// `sources_ok` returned data at least once, `sources_empty` always answered
/// but never with data, `sources_failed` never answered at all.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub seeds: Vec<EntityId>,
    pub variants_used: Vec<String>,
    pub sources_ok: Vec<String>,
    pub sources_empty: Vec<String>,
    pub sources_failed: Vec<String>,
    pub failures: Vec<FailureRecord>,
    pub iterations_run: usize,
    pub termination: Option<TerminationReason>,
    pub hypotheses_survived: usize,
    pub hypotheses_inconclusive: usize,
    pub hypotheses_rejected: usize,
    /// Snapshot of the shared response cache, if enabled
    pub cache: Option<CacheStats>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    fragments: usize,
    empties: usize,
    failures: usize,
}

/// Accumulates per-source outcomes across every aggregation of a request.
struct DiagnosticsRecorder {
    request_id: Uuid,
    started_at: DateTime<Utc>,
    clock: tokio::time::Instant,
    tallies: BTreeMap<String, Tally>,
    failures: Vec<FailureRecord>,
}

impl DiagnosticsRecorder {
    fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            started_at: Utc::now(),
            clock: tokio::time::Instant::now(),
            tallies: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    fn record<'a>(&mut self, aggregations: impl IntoIterator<Item = &'a Aggregation>) {
        for aggregation in aggregations {
            for report in &aggregation.reports {
                let tally = self.tallies.entry(report.source_id.clone()).or_default();
                match &report.outcome {
                    SourceOutcome::Fragment(_) => tally.fragments += 1,
                    SourceOutcome::Empty => tally.empties += 1,
                    SourceOutcome::Failed(reason) => {
                        tally.failures += 1;
                        self.failures.push(FailureRecord {
                            source_id: report.source_id.clone(),
                            query: aggregation.query.text.clone(),
                            purpose: aggregation.query.purpose,
                            reason: reason.clone(),
                        });
                    }
                }
            }
        }
    }

    fn finish(
        &self,
        ctx: &QueryContext,
        refinement: Option<(usize, &TerminationReason)>,
        verdicts: &[Verdict],
        cache: Option<CacheStats>,
    ) -> Diagnostics {
        let ids = |pred: fn(&Tally) -> bool| -> Vec<String> {
            self.tallies
                .iter()
                .filter(|(_, t)| pred(t))
                .map(|(id, _)| id.clone())
                .collect()
        };
        let count = |v: Verdict| verdicts.iter().filter(|x| **x == v).count();

        Diagnostics {
            request_id: self.request_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed_ms: self.clock.elapsed().as_millis() as u64,
            seeds: ctx.seed_node_ids.clone(),
            variants_used: ctx.variant_texts.clone(),
            sources_ok: ids(|t| t.fragments > 0),
            sources_empty: ids(|t| t.fragments == 0 && t.empties > 0),
            sources_failed: ids(|t| t.fragments == 0 && t.empties == 0),
            failures: self.failures.clone(),
            iterations_run: refinement.map_or(0, |(n, _)| n),
            termination: refinement.map(|(_, reason)| reason.clone()),
            hypotheses_survived: count(Verdict::Survived),
            hypotheses_inconclusive: count(Verdict::Inconclusive),
            hypotheses_rejected: count(Verdict::Rejected),
            cache,
        }
    }
}

/// Result of a successful exploration.
#[derive(Debug, Clone, Serialize)]
pub struct Exploration {
    pub request_id: Uuid,
    pub query: QueryContext,
    /// The assembled graph, scored by the final ranking
    pub graph: KnowledgeGraph,
    /// Survived and inconclusive hypotheses, best first
    pub hypotheses: Vec<Hypothesis>,
    pub diagnostics: Diagnostics,
    pub history: Vec<RefinementStep>,
    #[serde(skip)]
    rejected: Vec<Hypothesis>,
}

impl Exploration {
    /// Hypotheses the validator rejected. Not part of the caller contract.
    #[doc(hidden)]
    pub fn rejected_hypotheses(&self) -> &[Hypothesis] {
        &self.rejected
    }
}

/// Long-lived engine handle. Cheap to share; each `explore` call owns its
/// own graph.
pub struct Explorer {
    registry: Arc<SourceRegistry>,
    cache: Option<Arc<ResponseCache>>,
    extractor: Arc<dyn SeedExtractor>,
    llm: Arc<dyn ResearchLlm>,
    config: EngineConfig,
}

impl Explorer {
    /// An explorer with the offline collaborator and the configured lexicon.
    pub fn new(registry: SourceRegistry, config: EngineConfig) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ResponseCache::new(config.cache.ttl(), config.cache.max_entries)));
        Self {
            registry: Arc::new(registry),
            cache,
            extractor: Arc::new(LexiconExtractor::new(&config.lexicon)),
            llm: Arc::new(OfflineLlm::new()),
            config,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn ResearchLlm>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn SeedExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Options derived from this explorer's config.
    pub fn default_options(&self) -> ExploreOptions {
        ExploreOptions::from_config(&self.config)
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Answer one research question.
    pub async fn explore(
        &self,
        query_text: &str,
        options: &ExploreOptions,
    ) -> Result<Exploration, ExploreError> {
        let request_id = Uuid::new_v4();
        let mut recorder = DiagnosticsRecorder::new(request_id);
        let budget = options.budget(recorder.clock);

        let mut ctx = QueryContext::extract(query_text, self.extractor.as_ref());
        if !ctx.has_seeds() {
            warn!(%request_id, query = %query_text, "no seed entities extracted");
            return Err(ExploreError::SeedExtraction {
                query: query_text.to_string(),
            });
        }
        info!(
            %request_id,
            seeds = ?ctx.seed_node_ids.iter().map(EntityId::as_str).collect::<Vec<_>>(),
            sources = self.registry.len(),
            "exploration started"
        );

        let mut aggregator = ConcurrentAggregator::new(Arc::clone(&self.registry));
        if let Some(cache) = &self.cache {
            aggregator = aggregator.with_cache(Arc::clone(cache));
        }
        let ranker = ActivationRanker::new(RankerConfig {
            max_hops: options.max_hops,
            ..self.config.ranker
        });
        let engine = RobustQueryEngine::new(
            aggregator.clone(),
            ranker,
            Arc::clone(&self.extractor),
            Arc::clone(&self.llm),
        )
        .with_config(RobustConfig {
            variants: options.robustness_variants.clamp(1, MAX_VARIANTS),
            ..self.config.robust
        });

        // Primary ranking
        let mut builder = GraphBuilder::new();
        let seeds = ctx.seed_node_ids.clone();
        let initial = engine
            .run(&ctx.raw_text, &seeds, QueryPurpose::Primary, &mut builder, &budget)
            .await;
        ctx.set_variants(initial.variant_texts());
        recorder.record(initial.aggregations());

        if initial.graph.is_empty() {
            let diagnostics = recorder.finish(&ctx, None, &[], self.cache_stats());
            warn!(
                %request_id,
                failed = diagnostics.sources_failed.len(),
                empty = diagnostics.sources_empty.len(),
                "no source contributed any data"
            );
            return Err(ExploreError::GraphEmpty(Box::new(diagnostics)));
        }

        // Refinement
        let refiner = AgenticRefinementLoop::new(
            engine,
            RefinementConfig {
                max_iterations: options.max_refinement_iterations,
                ..self.config.refinement
            },
        );
        let refined = refiner.refine(&ctx, initial, &mut builder, &budget).await;
        recorder.record(&refined.aggregations);

        // Synthesis and validation
        let candidates = synthesize(
            &refined.graph,
            &refined.ranking,
            &ctx.seed_node_ids,
            &refined.history,
            refiner.config(),
        );
        let validator =
            AdversarialValidator::new(aggregator, Arc::clone(&self.llm)).with_config(self.config.validator);
        let validated = validator
            .validate_all(candidates, &refined.graph, &budget)
            .await?;
        recorder.record(&validated.aggregations);

        let verdicts: Vec<Verdict> = validated
            .kept
            .iter()
            .chain(validated.rejected.iter())
            .map(Hypothesis::verdict)
            .collect();
        let diagnostics = recorder.finish(
            &ctx,
            Some((refined.iterations_run, &refined.termination)),
            &verdicts,
            self.cache_stats(),
        );
        info!(
            %request_id,
            nodes = refined.graph.node_count(),
            edges = refined.graph.edge_count(),
            hypotheses = validated.kept.len(),
            rejected = validated.rejected.len(),
            sources_failed = diagnostics.sources_failed.len(),
            elapsed_ms = diagnostics.elapsed_ms,
            "exploration finished"
        );

        Ok(Exploration {
            request_id,
            query: ctx,
            graph: refined.graph,
            hypotheses: validated.kept,
            diagnostics,
            history: refined.history,
            rejected: validated.rejected,
        })
    }
}
