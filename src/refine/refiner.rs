//! AgenticRefinementLoop: bounded probe → re-rank iterations
//!
//! Each iteration asks `decide` for the next action, formulates a narrower
//! probe around the chosen focus node and runs it through the robust engine
//! against the running graph. The loop is sequential; each probe's own
//! aggregation is concurrent.

use super::state::{decide, NextAction, RefinementConfig, RefinementStep, TerminationReason};
use crate::aggregate::{Aggregation, FetchBudget};
use crate::graph::{EntityId, GraphBuilder, KnowledgeGraph};
use crate::llm::{template_probe, ProbeRequest};
use crate::query::QueryContext;
use crate::rank::{Ranking, RobustQueryEngine, RobustRanking};
use crate::source::{normalize_query_text, QueryPurpose};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Final state of one refinement run.
#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    /// Ordered `(query, ranking)` history, the initial ranking first
    pub history: Vec<RefinementStep>,
    pub termination: TerminationReason,
    /// Probe iterations actually executed
    pub iterations_run: usize,
    /// Running graph after the last step, scored with `ranking`
    pub graph: KnowledgeGraph,
    pub ranking: Ranking,
    /// Every probe aggregation, in issue order
    pub aggregations: Vec<Aggregation>,
}

pub struct AgenticRefinementLoop {
    engine: RobustQueryEngine,
    config: RefinementConfig,
}

impl AgenticRefinementLoop {
    pub fn new(engine: RobustQueryEngine, config: RefinementConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Refine `initial` until a stop condition fires.
    ///
    /// `builder` must already hold the fragments behind `initial`; probe
    /// fragments are merged into it rather than starting over.
    pub async fn refine(
        &self,
        ctx: &QueryContext,
        initial: RobustRanking,
        builder: &mut GraphBuilder,
        budget: &FetchBudget,
    ) -> RefinementOutcome {
        let mut history = vec![RefinementStep {
            iteration: 0,
            query: ctx.raw_text.clone(),
            focus: None,
            ranking: initial.ranking.clone(),
            new_nodes: builder.node_count(),
        }];
        let mut graph = initial.graph;
        let mut aggregations = Vec::new();

        let mut issued: BTreeSet<String> = ctx
            .variant_texts
            .iter()
            .chain(std::iter::once(&ctx.raw_text))
            .map(|t| normalize_query_text(t))
            .collect();

        let termination = loop {
            if budget.deadline_elapsed() {
                break TerminationReason::DeadlineElapsed;
            }
            let focus = match decide(&history, &self.config) {
                NextAction::Probe { focus } => focus,
                NextAction::Stop(reason) => break reason,
            };

            let probe = self.formulate(ctx, &focus, &graph, &history).await;
            if !issued.insert(normalize_query_text(&probe)) {
                debug!(probe = %probe, "probe repeats an earlier query");
                break TerminationReason::RepeatedProbe;
            }

            let mut seeds: Vec<EntityId> = ctx.seed_node_ids.clone();
            seeds.push(focus.clone());

            let before = builder.node_count();
            let run = self
                .engine
                .run(&probe, &seeds, QueryPurpose::Probe, builder, budget)
                .await;
            let new_nodes = builder.node_count().saturating_sub(before);

            let iteration = history.len();
            info!(
                iteration,
                focus = %focus,
                probe = %probe,
                new_nodes,
                "refinement probe ranked"
            );

            aggregations.extend(run.aggregations().cloned());
            graph = run.graph;
            history.push(RefinementStep {
                iteration,
                query: probe,
                focus: Some(focus),
                ranking: run.ranking,
                new_nodes,
            });
        };

        let iterations_run = history.len() - 1;
        info!(iterations_run, termination = %termination, "refinement finished");
        let ranking = history
            .last()
            .map(|s| s.ranking.clone())
            .unwrap_or_default();

        RefinementOutcome {
            history,
            termination,
            iterations_run,
            graph,
            ranking,
            aggregations,
        }
    }

    async fn formulate(
        &self,
        ctx: &QueryContext,
        focus: &EntityId,
        graph: &KnowledgeGraph,
        history: &[RefinementStep],
    ) -> String {
        let context = history
            .last()
            .map(|s| {
                s.ranking
                    .top(self.config.top_k)
                    .iter()
                    .map(|n| graph.label_of(&n.id).to_string())
                    .collect()
            })
            .unwrap_or_default();
        let request = ProbeRequest {
            original_query: ctx.raw_text.clone(),
            focus: focus.clone(),
            focus_label: graph.label_of(focus).to_string(),
            context,
        };
        match self.engine.llm().formulate_probe(&request).await {
            Ok(probe) if !probe.trim().is_empty() => probe,
            Ok(_) => template_probe(&request),
            Err(e) => {
                warn!(error = %e, focus = %focus, "probe formulation failed, using template");
                template_probe(&request)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ConcurrentAggregator;
    use crate::graph::{Entity, EntityType, Relation};
    use crate::llm::MockLlm;
    use crate::query::{LexiconExtractor, SeedExtractor};
    use crate::rank::{ActivationRanker, RobustConfig};
    use crate::source::{Fragment, SourceAdapter, SourceError, SourceKind, SourceRegistry, SubQuery};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Answers every query with a chain that grows one node per call.
    struct GrowingSource {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl SourceAdapter for GrowingSource {
        fn id(&self) -> &str {
            "growing"
        }
        fn kind(&self) -> SourceKind {
            SourceKind::Literature
        }
        async fn fetch(&self, _query: &SubQuery, _timeout: Duration) -> Result<Fragment, SourceError> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut fragment = Fragment::new()
                .with_node(Entity::new(EntityType::Gene, "KRAS"))
                .with_node(Entity::new(EntityType::Disease, "lung cancer"))
                .with_edge(Relation::new("kras", "lung cancer", "drives"));
            let mut previous = "kras".to_string();
            for i in 0..=n + 2 {
                let id = format!("gene{}", i);
                fragment = fragment
                    .with_node(Entity::new(EntityType::Gene, id.clone()))
                    .with_edge(Relation::new(&previous, &id, "interacts_with"));
                previous = id;
            }
            Ok(fragment)
        }
    }

    fn engine(llm: MockLlm) -> RobustQueryEngine {
        let registry = Arc::new(SourceRegistry::new(vec![Arc::new(GrowingSource {
            calls: Default::default(),
        }) as Arc<dyn SourceAdapter>]));
        let extractor: Arc<dyn SeedExtractor> = Arc::new(LexiconExtractor::default());
        RobustQueryEngine::new(
            ConcurrentAggregator::new(registry),
            ActivationRanker::default(),
            extractor,
            Arc::new(llm),
        )
        .with_config(RobustConfig {
            variants: 1,
            ..RobustConfig::default()
        })
    }

    async fn initial(
        engine: &RobustQueryEngine,
        ctx: &QueryContext,
        builder: &mut GraphBuilder,
        budget: &FetchBudget,
    ) -> RobustRanking {
        engine
            .run(&ctx.raw_text, &ctx.seed_node_ids, QueryPurpose::Primary, builder, budget)
            .await
    }

    #[tokio::test]
    async fn loop_never_exceeds_iteration_budget() {
        let engine = engine(MockLlm::unavailable());
        let ctx = QueryContext::extract("KRAS in lung cancer", &LexiconExtractor::default());
        let budget = FetchBudget::new(Duration::from_secs(1));
        let mut builder = GraphBuilder::new();
        let first = initial(&engine, &ctx, &mut builder, &budget).await;

        for max_iterations in 0..3 {
            let refiner = AgenticRefinementLoop::new(
                engine.clone(),
                RefinementConfig {
                    max_iterations,
                    similarity_bound: 2.0,
                    novelty_floor: 0.0,
                    ..RefinementConfig::default()
                },
            );
            let outcome = refiner
                .refine(&ctx, first.clone(), &mut builder.clone(), &budget)
                .await;
            assert!(outcome.iterations_run <= max_iterations);
            assert_eq!(outcome.history.len(), outcome.iterations_run + 1);
        }
    }

    #[tokio::test]
    async fn probes_merge_into_running_graph() {
        let engine = engine(MockLlm::unavailable());
        let ctx = QueryContext::extract("KRAS in lung cancer", &LexiconExtractor::default());
        let budget = FetchBudget::new(Duration::from_secs(1));
        let mut builder = GraphBuilder::new();
        let first = initial(&engine, &ctx, &mut builder, &budget).await;
        let initial_nodes = first.graph.node_count();

        let refiner = AgenticRefinementLoop::new(
            engine.clone(),
            RefinementConfig {
                max_iterations: 1,
                similarity_bound: 2.0,
                novelty_floor: 0.0,
                ..RefinementConfig::default()
            },
        );
        let outcome = refiner.refine(&ctx, first, &mut builder, &budget).await;

        assert_eq!(outcome.iterations_run, 1);
        assert_eq!(outcome.termination, TerminationReason::MaxIterations);
        assert_eq!(outcome.history[1].new_nodes, 1);
        assert_eq!(outcome.graph.node_count(), initial_nodes + 1);
        assert!(outcome.history[1].focus.is_some());
        assert_eq!(outcome.aggregations.len(), 1);
    }

    #[tokio::test]
    async fn repeated_probe_text_stops_loop() {
        let engine = engine(MockLlm::available().with_probes(vec!["KRAS gene0 lung cancer"]));
        let ctx = QueryContext::extract("KRAS in lung cancer", &LexiconExtractor::default());
        let budget = FetchBudget::new(Duration::from_secs(1));
        let mut builder = GraphBuilder::new();
        let first = initial(&engine, &ctx, &mut builder, &budget).await;

        let refiner = AgenticRefinementLoop::new(
            engine.clone(),
            RefinementConfig {
                max_iterations: 3,
                similarity_bound: 2.0,
                novelty_floor: 0.0,
                ..RefinementConfig::default()
            },
        );
        let outcome = refiner.refine(&ctx, first, &mut builder, &budget).await;

        assert_eq!(outcome.iterations_run, 1);
        assert_eq!(outcome.termination, TerminationReason::RepeatedProbe);
    }

    #[tokio::test]
    async fn elapsed_deadline_stops_before_probing() {
        let engine = engine(MockLlm::unavailable());
        let ctx = QueryContext::extract("KRAS in lung cancer", &LexiconExtractor::default());
        let mut builder = GraphBuilder::new();
        let first = initial(
            &engine,
            &ctx,
            &mut builder,
            &FetchBudget::new(Duration::from_secs(1)),
        )
        .await;

        let expired = FetchBudget::new(Duration::from_secs(1))
            .with_deadline(tokio::time::Instant::now() - Duration::from_millis(1));
        let refiner = AgenticRefinementLoop::new(engine.clone(), RefinementConfig::default());
        let outcome = refiner.refine(&ctx, first, &mut builder, &expired).await;

        assert_eq!(outcome.iterations_run, 0);
        assert_eq!(outcome.termination, TerminationReason::DeadlineElapsed);
    }
}
