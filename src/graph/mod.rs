//! Core graph data structures
//!
//! Entities and relations are created fresh per query from source
//! fragments; the graph lives only as long as one exploration.

mod builder;
mod entity;
mod knowledge_graph;
mod relation;

#[cfg(test)]
mod tests;

pub use builder::{merge_outcomes, GraphBuilder};
pub use entity::{Entity, EntityId, EntityType, UnknownEntityType, DEFAULT_CONFIDENCE};
pub use knowledge_graph::{ActivationScore, AdjacencyIndex, KnowledgeGraph};
pub use relation::{normalize_relation_type, EdgeKey, Polarity, Relation};
