//! Seed extraction: recognising biomedical entities in free query text
//!
//! Passes, in order of precedence:
//! 1. lexicon terms (multi-word, case-insensitive, longest first)
//! 2. mutation tokens such as `G12C`, `V600E`, `T790M`
//! 3. upper-case gene symbols (`KRAS`, `TP53`), minus a stop-list
//!
//! A span claimed by an earlier pass is never re-read by a later one.

use crate::graph::{Entity, EntityType};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// Anything able to turn query text into seed entities.
pub trait SeedExtractor: Send + Sync {
    /// Entities mentioned in `text`, in order of first appearance.
    fn extract(&self, text: &str) -> Vec<Entity>;
}

/// Known multi-word and alias terms per entity class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconConfig {
    #[serde(default = "default_genes")]
    pub genes: Vec<String>,
    #[serde(default = "default_diseases")]
    pub diseases: Vec<String>,
    #[serde(default = "default_drugs")]
    pub drugs: Vec<String>,
    #[serde(default = "default_pathways")]
    pub pathways: Vec<String>,
    #[serde(default = "default_cell_types")]
    pub cell_types: Vec<String>,
    #[serde(default = "default_biomarkers")]
    pub biomarkers: Vec<String>,
    /// Upper-case tokens that are never gene symbols
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_genes() -> Vec<String> {
    strings(&["pd-l1", "her2", "c-myc"])
}
fn default_diseases() -> Vec<String> {
    strings(&[
        "non-small cell lung cancer",
        "small cell lung cancer",
        "lung cancer",
        "lung adenocarcinoma",
        "nsclc",
        "colorectal cancer",
        "pancreatic cancer",
        "pancreatic ductal adenocarcinoma",
        "breast cancer",
        "melanoma",
        "glioblastoma",
        "acute myeloid leukemia",
        "tumor",
        "cancer",
    ])
}
fn default_drugs() -> Vec<String> {
    strings(&[
        "sotorasib",
        "adagrasib",
        "osimertinib",
        "erlotinib",
        "trametinib",
        "cetuximab",
        "pembrolizumab",
        "nivolumab",
        "imatinib",
        "vemurafenib",
    ])
}
fn default_pathways() -> Vec<String> {
    strings(&[
        "mapk signaling",
        "mapk pathway",
        "pi3k/akt signaling",
        "mtor signaling",
        "egfr signaling",
        "wnt signaling",
        "dna damage response",
        "apoptosis",
    ])
}
fn default_cell_types() -> Vec<String> {
    strings(&["t cell", "cd8 t cell", "macrophage", "cancer-associated fibroblast", "nk cell"])
}
fn default_biomarkers() -> Vec<String> {
    strings(&["tumor mutational burden", "microsatellite instability", "ctdna"])
}
fn default_stop_words() -> Vec<String> {
    strings(&[
        "AND", "OR", "NOT", "THE", "FOR", "WITH", "DNA", "RNA", "FDA", "USA", "WHO", "NIH",
        "ICI", "ORR", "PFS", "OS", "IHC", "NGS", "WGS", "PCR",
    ])
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            genes: default_genes(),
            diseases: default_diseases(),
            drugs: default_drugs(),
            pathways: default_pathways(),
            cell_types: default_cell_types(),
            biomarkers: default_biomarkers(),
            stop_words: default_stop_words(),
        }
    }
}

const LEXICON_CONFIDENCE: f64 = 0.9;
const MUTATION_CONFIDENCE: f64 = 0.8;
const SYMBOL_CONFIDENCE: f64 = 0.6;

/// Lexicon-plus-pattern extractor; the default seed extractor.
pub struct LexiconExtractor {
    /// (term, type), longest term first
    terms: Vec<(String, EntityType)>,
    stop_words: BTreeSet<String>,
    mutation: Option<Regex>,
    symbol: Option<Regex>,
}

const MUTATION_PATTERN: &str =
    r"\b[ACDEFGHIKLMNPQRSTVWY][1-9][0-9]{0,3}(?:[ACDEFGHIKLMNPQRSTVWY*]|fs|del|ins)\b";
const SYMBOL_PATTERN: &str = r"\b[A-Z][A-Z0-9]{2,7}\b";

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "seed pattern rejected, pass disabled");
            None
        }
    }
}

impl LexiconExtractor {
    pub fn new(config: &LexiconConfig) -> Self {
        let groups = [
            (&config.genes, EntityType::Gene),
            (&config.diseases, EntityType::Disease),
            (&config.drugs, EntityType::Drug),
            (&config.pathways, EntityType::Pathway),
            (&config.cell_types, EntityType::CellType),
            (&config.biomarkers, EntityType::Biomarker),
        ];
        let mut terms: Vec<(String, EntityType)> = groups
            .iter()
            .flat_map(|(list, ty)| {
                list.iter()
                    .map(|t| t.trim().to_ascii_lowercase())
                    .filter(|t| !t.is_empty())
                    .map(move |t| (t, *ty))
            })
            .collect();
        terms.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        terms.dedup_by(|a, b| a.0 == b.0);

        Self {
            terms,
            stop_words: config.stop_words.iter().map(|s| s.to_ascii_uppercase()).collect(),
            mutation: compile(MUTATION_PATTERN),
            symbol: compile(SYMBOL_PATTERN),
        }
    }
}

impl Default for LexiconExtractor {
    fn default() -> Self {
        Self::new(&LexiconConfig::default())
    }
}

/// Byte spans of whole-word occurrences of `term` in `haystack`.
fn term_spans(haystack: &str, term: &str) -> Vec<(usize, usize)> {
    haystack
        .match_indices(term)
        .filter_map(|(start, _)| {
            let end = start + term.len();
            let before = haystack[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric() && c != '-');
            let after = haystack[end..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric() && c != '-');
            (before && after).then_some((start, end))
        })
        .collect()
}

fn overlaps(claimed: &[(usize, usize)], span: (usize, usize)) -> bool {
    claimed.iter().any(|&(s, e)| span.0 < e && s < span.1)
}

impl SeedExtractor for LexiconExtractor {
    fn extract(&self, text: &str) -> Vec<Entity> {
        // ASCII lower-casing keeps byte offsets aligned with `text`
        let lower = text.to_ascii_lowercase();
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut found: Vec<(usize, Entity)> = Vec::new();

        for (term, entity_type) in &self.terms {
            for span in term_spans(&lower, term) {
                if overlaps(&claimed, span) {
                    continue;
                }
                claimed.push(span);
                let entity = Entity::new(*entity_type, &text[span.0..span.1])
                    .with_confidence(LEXICON_CONFIDENCE);
                found.push((span.0, entity));
            }
        }

        for m in self.mutation.iter().flat_map(|re| re.find_iter(text)) {
            let span = (m.start(), m.end());
            if overlaps(&claimed, span) {
                continue;
            }
            claimed.push(span);
            found.push((
                span.0,
                Entity::new(EntityType::Mutation, m.as_str()).with_confidence(MUTATION_CONFIDENCE),
            ));
        }

        for m in self.symbol.iter().flat_map(|re| re.find_iter(text)) {
            let span = (m.start(), m.end());
            if overlaps(&claimed, span) || self.stop_words.contains(m.as_str()) {
                continue;
            }
            claimed.push(span);
            found.push((
                span.0,
                Entity::new(EntityType::Gene, m.as_str()).with_confidence(SYMBOL_CONFIDENCE),
            ));
        }

        found.sort_by_key(|(pos, _)| *pos);
        let mut seen = BTreeSet::new();
        found
            .into_iter()
            .map(|(_, e)| e)
            .filter(|e| seen.insert(e.id.clone()))
            .collect()
    }
}
