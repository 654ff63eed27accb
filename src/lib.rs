//! Oncograph: query-adaptive oncology knowledge graph engine
//!
//! Turns a free-text oncology research question into ranked, adversarially
//! validated mechanistic hypotheses, grounded in a knowledge graph assembled
//! per request from independent biomedical sources.
//!
//! # Core Concepts
//!
//! - **Sources**: independent adapters that each return a graph fragment,
//!   nothing, or a failure; fanned out concurrently and never allowed to
//!   sink each other
//! - **Graph**: entities and relations merged order-independently, with
//!   provenance and confidence per edge
//! - **Ranking**: seeded spreading activation, made stable under paraphrase
//!   by a variance penalty across query variants
//! - **Refinement**: a bounded probe loop driven by a pure decision function
//! - **Validation**: every hypothesis faces a counter-query before it is
//!   surfaced
//!
//! # Example
//!
//! ```no_run
//! use oncograph::{EngineConfig, Explorer, SourceRegistry};
//!
//! # async fn run() -> Result<(), oncograph::ExploreError> {
//! let explorer = Explorer::new(SourceRegistry::empty(), EngineConfig::default());
//! let options = explorer.default_options();
//! let exploration = explorer
//!     .explore("KRAS G12C resistance in lung cancer", &options)
//!     .await?;
//! println!("{} hypotheses", exploration.hypotheses.len());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod api;
pub mod config;
pub mod graph;
pub mod llm;
pub mod query;
pub mod rank;
pub mod refine;
pub mod source;
pub mod validate;

pub use api::{Diagnostics, Exploration, ExploreError, ExploreOptions, Explorer, FailureRecord};
pub use config::{ConfigError, EngineConfig};
pub use graph::{Entity, EntityId, EntityType, KnowledgeGraph, Relation};
pub use llm::{LlmError, OfflineLlm, ResearchLlm};
pub use refine::TerminationReason;
pub use source::{
    Fragment, FixtureSource, SourceAdapter, SourceError, SourceKind, SourceOutcome,
    SourceRegistry, SubQuery,
};
pub use validate::{Hypothesis, Verdict};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
