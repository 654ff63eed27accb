//! Source registry: the fixed set of adapters built at startup

use super::traits::SourceAdapter;
use super::types::SubQuery;
use std::collections::HashSet;
use std::sync::Arc;

/// Registry of source adapters, deduplicated by `id()`. Later adapters
/// sharing an id with an earlier one are dropped without error.
///
/// Built once and then shared (behind `Arc`) by every aggregation.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Create a registry from adapters, keeping the first adapter per id.
    pub fn new(sources: Vec<Arc<dyn SourceAdapter>>) -> Self {
        let mut seen = HashSet::new();
        let deduped: Vec<_> = sources
            .into_iter()
            .filter(|s| seen.insert(s.id().to_string()))
            .collect();
        Self { sources: deduped }
    }

    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Register an adapter. Returns false if the id is already taken.
    pub fn register(&mut self, source: Arc<dyn SourceAdapter>) -> bool {
        if self.sources.iter().any(|s| s.id() == source.id()) {
            return false;
        }
        self.sources.push(source);
        true
    }

    pub fn sources(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.sources
    }

    /// Adapters that apply to the sub-query.
    pub fn applicable(&self, query: &SubQuery) -> Vec<Arc<dyn SourceAdapter>> {
        self.sources
            .iter()
            .filter(|s| s.applies_to(query))
            .cloned()
            .collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::empty()
    }
}
