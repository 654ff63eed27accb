//! End-to-end exploration scenarios
//!
//! Drive `Explorer::explore` over stub sources and check the caller-facing
//! contract: partial results survive failures, diagnostics tell failure
//! apart from thin evidence, fatal states short-circuit with typed errors.
//!
//! Run with: `cargo test --test explore_end_to_end`

mod common;

use common::{
    expression_fragment, explorer, explorer_with_config, literature_fragment,
    target_disease_fragment, Behaviour, StubSource,
};
use oncograph::config::EngineConfig;
use oncograph::graph::{Entity, EntityId, EntityType, Relation};
use oncograph::source::{FailureReason, Fragment, SourceKind};
use oncograph::{ExploreError, Verdict};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const QUERY: &str = "KRAS G12C resistance in lung cancer";

fn three_sources() -> Vec<Arc<StubSource>> {
    vec![
        Arc::new(
            StubSource::new("source_1", Behaviour::Answer(target_disease_fragment()))
                .with_kind(SourceKind::TargetDisease),
        ),
        Arc::new(StubSource::new("source_2", Behaviour::Answer(literature_fragment()))),
        Arc::new(
            StubSource::new(
                "source_3",
                Behaviour::Delay(Duration::from_secs(3600), expression_fragment()),
            )
            .with_kind(SourceKind::ExpressionAtlas),
        ),
    ]
}

// === Scenario: two of three sources answer, one times out ===

#[tokio::test(start_paused = true)]
async fn timed_out_source_is_reported_and_survivors_are_kept() {
    let sources = three_sources();
    let explorer = explorer(&sources);
    let options = explorer
        .default_options()
        .with_per_source_timeout_ms(2_000)
        .with_robustness_variants(1);

    let exploration = explorer.explore(QUERY, &options).await.unwrap();
    let d = &exploration.diagnostics;

    assert_eq!(d.sources_failed, vec!["source_3"]);
    assert_eq!(d.sources_ok, vec!["source_1", "source_2"]);
    assert!(d
        .failures
        .iter()
        .all(|f| f.source_id == "source_3" && matches!(f.reason, FailureReason::Timeout { .. })));

    // Nodes from both survivors, nothing from the timed-out source
    for id in ["kras", "lung cancer", "sotorasib", "stk11"] {
        assert!(exploration.graph.contains_node(&EntityId::from(id)), "missing {}", id);
    }
    assert!(!exploration.graph.contains_node(&EntityId::from("egfr")));

    let survivor_nodes: BTreeSet<EntityId> = ["kras", "lung cancer", "sotorasib", "stk11"]
        .into_iter()
        .map(EntityId::from)
        .collect();
    assert!(!exploration.hypotheses.is_empty());
    assert!(exploration
        .hypotheses
        .iter()
        .any(|h| h.supporting_subgraph.nodes.is_subset(&survivor_nodes)));
    assert!(exploration
        .hypotheses
        .iter()
        .all(|h| h.verdict() != Verdict::Rejected && h.verdict() != Verdict::Pending));
}

#[tokio::test(start_paused = true)]
async fn graph_records_provenance_of_both_survivors() {
    let sources = three_sources();
    let explorer = explorer(&sources);
    let options = explorer
        .default_options()
        .with_per_source_timeout_ms(2_000)
        .with_robustness_variants(1)
        .with_max_refinement_iterations(0);

    let exploration = explorer.explore(QUERY, &options).await.unwrap();
    let kras = exploration.graph.get_node(&EntityId::from("kras")).unwrap();
    assert_eq!(
        kras.provenance.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["source_1", "source_2"]
    );
    assert_eq!(kras.confidence, 0.9);
    assert_eq!(exploration.diagnostics.iterations_run, 0);
    assert_eq!(exploration.history.len(), 1);
}

// === Scenario: fatal states short-circuit ===

#[tokio::test]
async fn query_without_entities_is_rejected_before_any_source_call() {
    let sources = three_sources();
    let explorer = explorer(&sources);

    let err = explorer
        .explore("what is going on here", &explorer.default_options())
        .await
        .unwrap_err();

    assert!(matches!(err, ExploreError::SeedExtraction { .. }));
    assert!(sources.iter().all(|s| s.calls() == 0));
}

#[tokio::test]
async fn all_sources_failing_is_graph_empty_with_diagnostics() {
    let sources = vec![
        Arc::new(StubSource::new("a", Behaviour::Fail("503".into()))),
        Arc::new(StubSource::new("b", Behaviour::Nothing)),
    ];
    let explorer = explorer(&sources);

    let err = explorer.explore(QUERY, &explorer.default_options()).await.unwrap_err();

    match err {
        ExploreError::GraphEmpty(diagnostics) => {
            assert_eq!(diagnostics.sources_failed, vec!["a"]);
            assert_eq!(diagnostics.sources_empty, vec!["b"]);
            assert!(diagnostics.sources_ok.is_empty());
            assert_eq!(diagnostics.iterations_run, 0);
        }
        other => panic!("expected GraphEmpty, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn elapsed_request_deadline_turns_stragglers_into_timeouts() {
    let sources = vec![Arc::new(StubSource::new(
        "slow",
        Behaviour::Delay(Duration::from_secs(30), target_disease_fragment()),
    ))];
    let explorer = explorer(&sources);
    let options = explorer
        .default_options()
        .with_per_source_timeout_ms(60_000)
        .with_request_deadline_ms(1_000);

    let err = explorer.explore(QUERY, &options).await.unwrap_err();
    let ExploreError::GraphEmpty(diagnostics) = err else {
        panic!("expected GraphEmpty");
    };
    assert_eq!(diagnostics.sources_failed, vec!["slow"]);
    assert!(matches!(
        diagnostics.failures[0].reason,
        FailureReason::Timeout { after_ms } if after_ms <= 1_000
    ));
}

// === Scenario: degraded collaborators and sources ===

#[tokio::test]
async fn failing_collaborator_does_not_fail_exploration() {
    let sources = vec![
        Arc::new(StubSource::new("td", Behaviour::Answer(target_disease_fragment()))),
        Arc::new(StubSource::new("lit", Behaviour::Answer(literature_fragment()))),
    ];
    let explorer = explorer(&sources);

    let exploration = explorer.explore(QUERY, &explorer.default_options()).await.unwrap();

    // Paraphrasing failed, so the original wording is the only variant
    assert_eq!(exploration.diagnostics.variants_used, vec![QUERY.to_string()]);
    assert!(!exploration.hypotheses.is_empty());
}

#[tokio::test]
async fn panicking_source_is_isolated() {
    let sources = vec![
        Arc::new(StubSource::new("steady", Behaviour::Answer(target_disease_fragment()))),
        Arc::new(StubSource::new("panicky", Behaviour::Panic)),
    ];
    let explorer = explorer(&sources);

    let exploration = explorer.explore(QUERY, &explorer.default_options()).await.unwrap();
    let d = &exploration.diagnostics;

    assert_eq!(d.sources_ok, vec!["steady"]);
    assert_eq!(d.sources_failed, vec!["panicky"]);
    assert!(matches!(d.failures[0].reason, FailureReason::Panicked { .. }));
    assert!(exploration.graph.contains_node(&EntityId::from("sotorasib")));
}

#[tokio::test]
async fn repeated_exploration_is_served_from_cache() {
    let source = Arc::new(StubSource::new("td", Behaviour::Answer(target_disease_fragment())));
    let explorer = explorer(&[Arc::clone(&source)]);
    let options = explorer.default_options().with_robustness_variants(1);

    explorer.explore(QUERY, &options).await.unwrap();
    let calls_after_first = source.calls();
    let second = explorer.explore(QUERY, &options).await.unwrap();

    assert_eq!(source.calls(), calls_after_first);
    let cache = second.diagnostics.cache.unwrap();
    assert!(cache.hits > 0);
}

#[tokio::test]
async fn disabled_cache_always_fetches_live() {
    let source = Arc::new(StubSource::new("td", Behaviour::Answer(target_disease_fragment())));
    let mut config = EngineConfig::default();
    config.cache.enabled = false;
    let explorer = explorer_with_config(&[Arc::clone(&source)], config);
    let options = explorer.default_options().with_robustness_variants(1);

    explorer.explore(QUERY, &options).await.unwrap();
    let calls_after_first = source.calls();
    let second = explorer.explore(QUERY, &options).await.unwrap();

    assert_eq!(source.calls(), calls_after_first * 2);
    assert!(second.diagnostics.cache.is_none());
}

#[tokio::test]
async fn exploration_serializes_to_json() {
    let sources = vec![Arc::new(StubSource::new(
        "td",
        Behaviour::Answer(target_disease_fragment()),
    ))];
    let explorer = explorer(&sources);

    let exploration = explorer.explore(QUERY, &explorer.default_options()).await.unwrap();
    let json = serde_json::to_value(&exploration).unwrap();

    assert!(json["graph"]["node_count"].as_u64().unwrap() >= 3);
    assert!(json["diagnostics"]["sources_ok"].is_array());
    assert!(json["hypotheses"].is_array());
}

// === Scenario: a source reports that two entities are unrelated ===

#[tokio::test]
async fn no_association_edge_never_becomes_a_hypothesis() {
    let fragment = Fragment::new()
        .with_node(Entity::new(EntityType::Gene, "KRAS"))
        .with_node(Entity::new(EntityType::Gene, "EGFR"))
        .with_node(Entity::new(EntityType::Disease, "lung cancer"))
        .with_edge(Relation::new("kras", "lung cancer", "drives"))
        .with_edge(
            Relation::new("kras", "egfr", "no_association")
                .with_weight(0.5)
                .with_confidence(0.5),
        );
    let sources = vec![Arc::new(StubSource::new("source_1", Behaviour::Answer(fragment)))];
    let explorer = explorer(&sources);
    let options = explorer.default_options().with_robustness_variants(1);

    let exploration = explorer.explore("KRAS in lung cancer", &options).await.unwrap();
    let egfr = EntityId::from("egfr");

    // The relation stays in the graph as counter-evidence
    assert!(exploration.graph.contains_node(&egfr));
    assert!(exploration.history[0].ranking.get(&egfr).is_none());
    assert!(exploration
        .hypotheses
        .iter()
        .chain(exploration.rejected_hypotheses())
        .all(|h| h.object != egfr && h.path.iter().all(|k| k.relation_type != "no_association")));
}
