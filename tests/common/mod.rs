//! Common test utilities for pipeline integration tests
//!
//! Stub sources with scripted behaviour (answer, nothing, delay, failure,
//! panic, growth) and the fragments the scenarios share.

#![allow(dead_code)]

use async_trait::async_trait;
use oncograph::config::EngineConfig;
use oncograph::graph::{Entity, EntityType, Relation};
use oncograph::llm::MockLlm;
use oncograph::source::{Fragment, QueryPurpose, SourceAdapter, SourceError, SourceKind, SourceRegistry, SubQuery};
use oncograph::Explorer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a stub does for ordinary (non-counter) queries.
pub enum Behaviour {
    Answer(Fragment),
    Nothing,
    /// Sleep, then answer
    Delay(Duration, Fragment),
    Fail(String),
    Panic,
    /// A chain from KRAS that gains one node per call
    Grow,
}

/// What a stub does for counter-queries.
pub enum CounterReply {
    /// Same as for any other query
    AsUsual,
    Evidence(Fragment),
    Fail,
}

pub struct StubSource {
    id: String,
    kind: SourceKind,
    behaviour: Behaviour,
    counter: CounterReply,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn new(id: &str, behaviour: Behaviour) -> Self {
        Self {
            id: id.to_string(),
            kind: SourceKind::Literature,
            behaviour,
            counter: CounterReply::AsUsual,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_counter(mut self, counter: CounterReply) -> Self {
        self.counter = counter;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn grown(&self, n: usize) -> Fragment {
        let mut fragment = Fragment::new()
            .with_node(Entity::new(EntityType::Gene, "KRAS"))
            .with_node(Entity::new(EntityType::Disease, "lung cancer"))
            .with_edge(Relation::new("kras", "lung cancer", "drives"));
        let mut previous = "kras".to_string();
        for i in 0..=n + 2 {
            let id = format!("node{}", i);
            fragment = fragment
                .with_node(Entity::new(EntityType::Gene, id.clone()))
                .with_edge(Relation::new(&previous, &id, "interacts_with"));
            previous = id;
        }
        fragment
    }
}

#[async_trait]
impl SourceAdapter for StubSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, query: &SubQuery, _timeout: Duration) -> Result<Fragment, SourceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if query.purpose == QueryPurpose::Counter {
            match &self.counter {
                CounterReply::AsUsual => {}
                CounterReply::Evidence(fragment) => return Ok(fragment.clone()),
                CounterReply::Fail => {
                    return Err(SourceError::Transport("counter search unavailable".into()))
                }
            }
        }
        match &self.behaviour {
            Behaviour::Answer(fragment) => Ok(fragment.clone()),
            Behaviour::Nothing => Ok(Fragment::new()),
            Behaviour::Delay(delay, fragment) => {
                tokio::time::sleep(*delay).await;
                Ok(fragment.clone())
            }
            Behaviour::Fail(message) => Err(SourceError::Unavailable(message.clone())),
            Behaviour::Panic => panic!("stub source {} exploded", self.id),
            Behaviour::Grow => Ok(self.grown(n)),
        }
    }
}

pub fn registry(sources: &[Arc<StubSource>]) -> SourceRegistry {
    SourceRegistry::new(
        sources
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn SourceAdapter>)
            .collect(),
    )
}

/// Explorer over stub sources with a collaborator that always fails, so
/// every variant, probe and counter-query comes from templates.
pub fn explorer(sources: &[Arc<StubSource>]) -> Explorer {
    explorer_with_config(sources, EngineConfig::default())
}

pub fn explorer_with_config(sources: &[Arc<StubSource>], config: EngineConfig) -> Explorer {
    Explorer::new(registry(sources), config).with_llm(Arc::new(MockLlm::unavailable()))
}

// ============================================================================
// Fragments
// ============================================================================

/// KRAS, lung cancer and sotorasib as a target–disease database reports them.
pub fn target_disease_fragment() -> Fragment {
    Fragment::new()
        .with_node(Entity::new(EntityType::Gene, "KRAS").with_confidence(0.9))
        .with_node(Entity::new(EntityType::Disease, "lung cancer"))
        .with_node(Entity::new(EntityType::Drug, "sotorasib"))
        .with_edge(
            Relation::new("kras", "lung cancer", "drives")
                .with_weight(0.9)
                .with_confidence(0.9),
        )
        .with_edge(
            Relation::new("sotorasib", "kras", "inhibits")
                .with_weight(0.9)
                .with_confidence(0.9),
        )
}

/// KRAS co-mutation evidence as a literature search reports it.
pub fn literature_fragment() -> Fragment {
    Fragment::new()
        .with_node(Entity::new(EntityType::Gene, "kras"))
        .with_node(Entity::new(EntityType::Gene, "STK11"))
        .with_node(Entity::new(EntityType::Disease, "Lung Cancer"))
        .with_edge(
            Relation::new("KRAS", "STK11", "co_mutated_with")
                .with_weight(0.7)
                .with_confidence(0.8),
        )
        .with_edge(Relation::new("stk11", "lung cancer", "associated_with"))
}

/// What a third source would add; must never surface when it times out.
pub fn expression_fragment() -> Fragment {
    Fragment::new()
        .with_node(Entity::new(EntityType::Gene, "EGFR"))
        .with_node(Entity::new(EntityType::Gene, "KRAS"))
        .with_edge(Relation::new("egfr", "kras", "upstream_of"))
}
