//! FixtureSource: a file-backed adapter serving canned fragments
//!
//! Fixture files are YAML (or JSON) documents describing one or more
//! sources. Each entry carries trigger terms; an entry fires when a trigger
//! appears in the sub-query text or names one of its seeds.
//!
//! ```yaml
//! sources:
//!   - id: target_disease
//!     kind: target_disease
//!     latency_ms: 40
//!     entries:
//!       - triggers: [kras]
//!         nodes:
//!           - { type: gene, label: KRAS, confidence: 0.9 }
//!         edges:
//!           - { source: kras, target: lung cancer, relation_type: drives }
//! ```

use super::traits::SourceAdapter;
use super::types::{
    normalize_query_text, Fragment, QueryPurpose, SourceError, SourceKind, SubQuery,
};
use crate::graph::{Entity, EntityId, Relation};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid fixture file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Top-level fixture document.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureFile {
    pub sources: Vec<SourceFixture>,
}

/// One simulated source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceFixture {
    pub id: String,
    pub kind: SourceKind,
    /// Simulated response latency
    #[serde(default)]
    pub latency_ms: u64,
    /// When set, every fetch fails with this message
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(default)]
    pub entries: Vec<FixtureEntry>,
}

/// Canned fragment and the terms that trigger it.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureEntry {
    pub triggers: Vec<String>,
    /// Purposes this entry answers; empty means all
    #[serde(default)]
    pub purposes: Vec<QueryPurpose>,
    #[serde(default)]
    pub nodes: Vec<Entity>,
    #[serde(default)]
    pub edges: Vec<Relation>,
}

impl FixtureEntry {
    fn matches(&self, text: &str, query: &SubQuery) -> bool {
        if !self.purposes.is_empty() && !self.purposes.contains(&query.purpose) {
            return false;
        }
        self.triggers.iter().any(|trigger| {
            let needle = normalize_query_text(trigger);
            if needle.is_empty() {
                return false;
            }
            contains_term(text, &needle) || query.seeds.contains(&EntityId::normalize(trigger))
        })
    }
}

/// Whole-word containment: `kras` matches "kras g12c" but not "akras".
fn contains_term(text: &str, term: &str) -> bool {
    text.match_indices(term).any(|(start, _)| {
        let end = start + term.len();
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = text[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// An adapter answering from a fixture definition.
pub struct FixtureSource {
    fixture: SourceFixture,
}

impl FixtureSource {
    pub fn new(fixture: SourceFixture) -> Self {
        Self { fixture }
    }

    /// Load every source described in a fixture file.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<FixtureSource>, FixtureError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FixtureFile = serde_yaml::from_str(&text).map_err(|source| FixtureError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(file.sources.into_iter().map(FixtureSource::new).collect())
    }

    /// The fragment every matching entry contributes.
    pub fn lookup(&self, query: &SubQuery) -> Fragment {
        let text = query.normalized_text();
        let mut fragment = Fragment::new();
        for entry in self.fixture.entries.iter().filter(|e| e.matches(&text, query)) {
            fragment.nodes.extend(entry.nodes.iter().cloned());
            fragment.edges.extend(entry.edges.iter().cloned());
        }
        fragment
    }
}

#[async_trait]
impl SourceAdapter for FixtureSource {
    fn id(&self) -> &str {
        &self.fixture.id
    }

    fn kind(&self) -> SourceKind {
        self.fixture.kind
    }

    async fn fetch(&self, query: &SubQuery, _timeout: Duration) -> Result<Fragment, SourceError> {
        if self.fixture.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.fixture.latency_ms)).await;
        }
        if let Some(message) = &self.fixture.fail {
            return Err(SourceError::Unavailable(message.clone()));
        }
        Ok(self.lookup(query))
    }
}
