//! Entity (node) representation in the knowledge graph

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Confidence assumed when a source does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Canonical identifier for an entity.
///
/// Identity is case-insensitive: `KRAS`, `gene:KRAS` and ` kras ` all
/// normalize to `kras`, so the same biological entity reached through two
/// sources collapses onto one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Normalize a raw identifier: strip a leading type prefix, case fold,
    /// treat underscores as spaces and collapse whitespace.
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        let unprefixed = match trimmed.split_once(':') {
            Some((prefix, rest)) if prefix.parse::<EntityType>().is_ok() => rest,
            _ => trimmed,
        };
        let folded = unprefixed.to_lowercase().replace('_', " ");
        Self(folded.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::normalize(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self::normalize(&s)
    }
}

/// Biomedical entity classes recognised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum EntityType {
    Gene,
    Disease,
    Drug,
    Pathway,
    CellType,
    Mutation,
    Biomarker,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Gene,
        EntityType::Disease,
        EntityType::Drug,
        EntityType::Pathway,
        EntityType::CellType,
        EntityType::Mutation,
        EntityType::Biomarker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Gene => "gene",
            EntityType::Disease => "disease",
            EntityType::Drug => "drug",
            EntityType::Pathway => "pathway",
            EntityType::CellType => "cell_type",
            EntityType::Mutation => "mutation",
            EntityType::Biomarker => "biomarker",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for entity type names that match no known class.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type: {0}")]
pub struct UnknownEntityType(pub String);

impl TryFrom<String> for EntityType {
    type Error = UnknownEntityType;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    /// Accepts both provider spellings (`Gene`, `CellType`) and lower-case
    /// forms (`gene`, `cell_type`, `cell type`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | ' ' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "gene" | "target" | "protein" => Ok(EntityType::Gene),
            "disease" | "cancer" | "indication" => Ok(EntityType::Disease),
            "drug" | "compound" | "molecule" => Ok(EntityType::Drug),
            "pathway" => Ok(EntityType::Pathway),
            "celltype" | "cell" => Ok(EntityType::CellType),
            "mutation" | "variant" => Ok(EntityType::Mutation),
            "biomarker" => Ok(EntityType::Biomarker),
            _ => Err(UnknownEntityType(s.to_string())),
        }
    }
}

/// A node in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical identifier; derived from the label when a source omits it
    #[serde(default)]
    pub id: EntityId,
    /// Entity class
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Display label as reported by the winning source
    pub label: String,
    /// Confidence in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Names of the sources that reported this entity
    #[serde(default)]
    pub provenance: BTreeSet<String>,
}

impl Entity {
    /// Create an entity whose id is derived from its label.
    pub fn new(entity_type: EntityType, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: EntityId::normalize(&label),
            entity_type,
            label,
            confidence: DEFAULT_CONFIDENCE,
            provenance: BTreeSet::new(),
        }
    }

    /// Override the identifier (normalized).
    pub fn with_id(mut self, raw_id: &str) -> Self {
        self.id = EntityId::normalize(raw_id);
        self
    }

    /// Set the confidence, clamped to [0, 1].
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_provenance(mut self, source: impl Into<String>) -> Self {
        self.provenance.insert(source.into());
        self
    }

    /// Total order used to pick which report's label and type survive a
    /// merge: higher confidence first, then the lexicographically smaller
    /// label, then the smaller type. Independent of arrival order.
    pub(crate) fn outranks(&self, other: &Entity) -> bool {
        self.confidence
            .total_cmp(&other.confidence)
            .then_with(|| other.label.cmp(&self.label))
            .then_with(|| other.entity_type.cmp(&self.entity_type))
            .is_gt()
    }
}

pub(crate) fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

/// Clamp a score into [0, 1]; NaN becomes 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
