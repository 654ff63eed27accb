//! Per-request query state

use super::extract::SeedExtractor;
use crate::graph::{Entity, EntityId};
use serde::Serialize;

/// Everything the engine knows about the caller's question.
///
/// Created per request and dropped with it.
#[derive(Debug, Clone, Serialize)]
pub struct QueryContext {
    pub raw_text: String,
    pub extracted_entities: Vec<Entity>,
    pub seed_node_ids: Vec<EntityId>,
    /// Paraphrases actually used, the raw text first
    pub variant_texts: Vec<String>,
}

impl QueryContext {
    /// Extract seeds from `raw_text`. The context may have no seeds; the
    /// caller decides whether that is fatal.
    pub fn extract(raw_text: impl Into<String>, extractor: &dyn SeedExtractor) -> Self {
        let raw_text = raw_text.into();
        let extracted_entities = extractor.extract(&raw_text);
        let seed_node_ids = extracted_entities.iter().map(|e| e.id.clone()).collect();
        Self {
            variant_texts: vec![raw_text.clone()],
            raw_text,
            extracted_entities,
            seed_node_ids,
        }
    }

    pub fn has_seeds(&self) -> bool {
        !self.seed_node_ids.is_empty()
    }

    /// Record the variants used by the robust engine.
    pub fn set_variants(&mut self, variants: Vec<String>) {
        if !variants.is_empty() {
            self.variant_texts = variants;
        }
    }
}
