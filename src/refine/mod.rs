//! Agentic refinement: the probe loop, its decision function and
//! hypothesis synthesis from the refined history

mod refiner;
mod state;
mod synthesis;

pub use refiner::{AgenticRefinementLoop, RefinementOutcome};
pub use state::{
    decide, top_k_similarity, NextAction, RefinementConfig, RefinementStep, TerminationReason,
};
pub use synthesis::{seed_path, synthesize};
