//! Merge behaviour of GraphBuilder across source fragments

use super::*;
use crate::source::{Fragment, SourceOutcome};
use serde_json::{json, Value};

fn kras_fragment() -> Fragment {
    Fragment::new()
        .with_node(Entity::new(EntityType::Gene, "KRAS").with_confidence(0.6))
        .with_node(Entity::new(EntityType::Disease, "Lung Cancer").with_confidence(0.8))
        .with_edge(
            Relation::new("KRAS", "Lung Cancer", "drives")
                .with_weight(0.9)
                .with_confidence(0.6),
        )
}

fn literature_fragment() -> Fragment {
    Fragment::new()
        .with_node(Entity::new(EntityType::Gene, "kras").with_confidence(0.9))
        .with_node(Entity::new(EntityType::Disease, "lung cancer").with_confidence(0.5))
        .with_node(Entity::new(EntityType::Drug, "Sotorasib").with_confidence(0.95))
        .with_edge(
            Relation::new("gene:KRAS", "lung_cancer", "Drives")
                .with_weight(0.3)
                .with_confidence(0.2),
        )
        .with_edge(
            Relation::new("sotorasib", "kras", "inhibits")
                .with_weight(0.8)
                .with_confidence(0.9),
        )
}

fn trials_fragment() -> Fragment {
    Fragment::new()
        .with_node(Entity::new(EntityType::Drug, "sotorasib").with_confidence(0.4))
        .with_node(Entity::new(EntityType::Biomarker, "STK11 loss"))
        .with_edge(Relation::new("STK11 loss", "sotorasib", "resistant_to").with_weight(0.6))
        // Endpoint never reported by any source
        .with_edge(Relation::new("sotorasib", "ghost", "targets"))
}

// === Scenario: node collision keeps max confidence and unions provenance ===

#[test]
fn node_collision_keeps_max_confidence() {
    let mut builder = GraphBuilder::new();
    builder.absorb_fragment("target_disease", &kras_fragment());
    builder.absorb_fragment("literature", &literature_fragment());
    let graph = builder.build();

    let kras = graph.get_node(&EntityId::from("KRAS")).unwrap();
    assert_eq!(kras.confidence, 0.9);
    assert_eq!(kras.label, "kras");
    assert_eq!(
        kras.provenance.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["literature", "target_disease"]
    );
}

#[test]
fn differently_spelled_ids_collapse_onto_one_node() {
    let mut builder = GraphBuilder::new();
    builder.absorb_fragment("a", &kras_fragment());
    builder.absorb_fragment("b", &literature_fragment());
    let graph = builder.build();

    // kras, lung cancer, sotorasib
    assert_eq!(graph.node_count(), 3);
    assert!(graph.contains_node(&EntityId::from("Lung Cancer")));
}

// === Scenario: edge collision averages weight by confidence ===

#[test]
fn edge_collision_uses_confidence_weighted_average() {
    let mut builder = GraphBuilder::new();
    builder.absorb_fragment("a", &kras_fragment());
    builder.absorb_fragment("b", &literature_fragment());
    let graph = builder.build();

    let edge = graph
        .get_edge(&EdgeKey::new("kras", "lung cancer", "drives"))
        .unwrap();
    let expected = (0.9 * 0.6 + 0.3 * 0.2) / (0.6 + 0.2);
    assert!((edge.weight - expected).abs() < 1e-12);
    assert_eq!(edge.confidence, 0.6);
    assert_eq!(edge.provenance.len(), 2);
}

#[test]
fn zero_confidence_reports_fall_back_to_plain_mean() {
    let a = Fragment::new()
        .with_node(Entity::new(EntityType::Gene, "a"))
        .with_node(Entity::new(EntityType::Gene, "b"))
        .with_edge(Relation::new("a", "b", "drives").with_weight(0.2).with_confidence(0.0));
    let b = Fragment::new()
        .with_edge(Relation::new("a", "b", "drives").with_weight(0.6).with_confidence(0.0));

    let mut builder = GraphBuilder::new();
    builder.absorb_fragment("x", &a);
    builder.absorb_fragment("y", &b);
    let graph = builder.build();
    let edge = graph.get_edge(&EdgeKey::new("a", "b", "drives")).unwrap();
    assert!((edge.weight - 0.4).abs() < 1e-12);
}

// === Scenario: dangling edges are dropped ===

#[test]
fn edge_without_both_endpoints_is_dropped() {
    let mut builder = GraphBuilder::new();
    builder.absorb_fragment("trials", &trials_fragment());
    let graph = builder.build();

    assert_eq!(graph.edge_count(), 1);
    assert!(graph
        .edges()
        .all(|e| graph.contains_node(&e.source) && graph.contains_node(&e.target)));
    assert!(!graph.contains_node(&EntityId::from("ghost")));
}

#[test]
fn dangling_edge_is_restored_once_endpoint_arrives() {
    let mut builder = GraphBuilder::new();
    builder.absorb_fragment("trials", &trials_fragment());
    assert_eq!(builder.build().edge_count(), 1);

    builder.absorb_fragment(
        "late",
        &Fragment::new().with_node(Entity::new(EntityType::Gene, "ghost")),
    );
    assert_eq!(builder.build().edge_count(), 2);
}

// === Scenario: merge order does not matter ===

#[test]
fn every_source_order_produces_the_same_graph() {
    let fragments = [
        ("target_disease", kras_fragment()),
        ("literature", literature_fragment()),
        ("trials", trials_fragment()),
    ];
    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    let graphs: Vec<KnowledgeGraph> = orders
        .iter()
        .map(|order| {
            let outcomes: Vec<(&str, SourceOutcome)> = order
                .iter()
                .map(|&i| (fragments[i].0, SourceOutcome::Fragment(fragments[i].1.clone())))
                .collect();
            merge_outcomes(outcomes.iter().map(|(id, o)| (*id, o)))
        })
        .collect();

    for graph in &graphs[1..] {
        assert_eq!(graph, &graphs[0]);
    }
}

#[test]
fn incremental_build_matches_batch_merge() {
    let mut first = GraphBuilder::new();
    first.absorb_fragment("a", &kras_fragment());
    let mut second = GraphBuilder::new();
    second.absorb_fragment("b", &literature_fragment());
    second.absorb_fragment("c", &trials_fragment());
    first.extend(&second);

    let mut batch = GraphBuilder::new();
    batch.absorb_fragment("c", &trials_fragment());
    batch.absorb_fragment("a", &kras_fragment());
    batch.absorb_fragment("b", &literature_fragment());

    assert_eq!(first.build(), batch.build());
}

#[test]
fn failed_and_empty_outcomes_contribute_nothing() {
    let failed = SourceOutcome::timeout(std::time::Duration::from_millis(10));
    let graph = merge_outcomes([("a", &SourceOutcome::Empty), ("b", &failed)]);
    assert!(graph.is_empty());
}

// === Scenario: serialization shape ===

#[test]
fn graph_serializes_nodes_edges_and_scores() {
    let mut builder = GraphBuilder::new();
    builder.absorb_fragment("lit", &literature_fragment());
    let mut graph = builder.build();
    graph.attach_scores([(
        EntityId::from("kras"),
        ActivationScore {
            relevance: 1.0,
            novelty: 0.0,
            robust_score: 0.8,
        },
    )]);

    let value: Value = serde_json::to_value(&graph).unwrap();
    assert_eq!(value["node_count"], json!(3));
    assert_eq!(value["edge_count"], json!(2));

    let kras = value["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["id"] == "kras")
        .unwrap();
    assert_eq!(kras["type"], "gene");
    assert_eq!(kras["score"]["robust_score"], json!(0.8));
    assert_eq!(kras["provenance"], json!(["lit"]));

    let sotorasib = value["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["id"] == "sotorasib")
        .unwrap();
    assert!(sotorasib.get("score").is_none());
}

#[test]
fn adjacency_is_undirected_and_ordered() {
    let mut builder = GraphBuilder::new();
    builder.absorb_fragment("a", &kras_fragment());
    builder.absorb_fragment("b", &literature_fragment());
    let graph = builder.build();
    let index = graph.adjacency();

    let kras = EntityId::from("kras");
    let neighbors: Vec<&str> = index.neighbors(&kras).iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(neighbors, vec!["lung cancer", "sotorasib"]);
    assert_eq!(index.degree(&kras), 2);
    assert_eq!(index.degree(&EntityId::from("sotorasib")), 1);
}
