//! Query understanding
//!
//! Turns the caller's free text into a `QueryContext` with seed entities.

mod context;
mod extract;

pub use context::QueryContext;
pub use extract::{LexiconConfig, LexiconExtractor, SeedExtractor};
