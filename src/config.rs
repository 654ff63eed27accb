//! Engine configuration, loaded from YAML

use crate::query::LexiconConfig;
use crate::rank::{RankerConfig, RobustConfig, MAX_VARIANTS};
use crate::refine::RefinementConfig;
use crate::validate::ValidatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ranker: RankerConfig,
    #[serde(default)]
    pub robust: RobustConfig,
    #[serde(default)]
    pub refinement: RefinementConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub lexicon: LexiconConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Upper bound on one source call (ms)
    #[serde(default = "default_per_source_timeout_ms")]
    pub per_source_timeout_ms: u64,
    /// Whole-request deadline (ms); 0 disables it
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Seconds a raw source response may be served from cache
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

// ── defaults ──

fn default_per_source_timeout_ms() -> u64 {
    10_000
}
fn default_request_deadline_ms() -> u64 {
    60_000
}
fn default_cache_enabled() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    1800
}
fn default_max_entries() -> usize {
    500
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            per_source_timeout_ms: default_per_source_timeout_ms(),
            request_deadline_ms: default_request_deadline_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl EngineConfig {
    /// `<config dir>/oncograph/config.yaml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oncograph")
            .join("config.yaml")
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Load from the default path, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        // An empty document is an all-defaults config
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EngineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{} must be in [0, 1], got {}", name, v)))
            }
        };
        unit("ranker.decay", self.ranker.decay)?;
        unit("refinement.novelty_floor", self.refinement.novelty_floor)?;
        unit("validator.contradiction_threshold", self.validator.contradiction_threshold)?;
        unit("validator.support_threshold", self.validator.support_threshold)?;

        if self.ranker.hub_penalty < 0.0 || self.robust.lambda < 0.0 {
            return Err(ConfigError::Invalid(
                "hub_penalty and lambda must be non-negative".to_string(),
            ));
        }
        if !(1..=MAX_VARIANTS).contains(&self.robust.variants) {
            return Err(ConfigError::Invalid(format!(
                "robust.variants must be in 1..={}, got {}",
                MAX_VARIANTS, self.robust.variants
            )));
        }
        if self.aggregator.per_source_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "aggregator.per_source_timeout_ms must be positive".to_string(),
            ));
        }
        if self.refinement.top_k == 0 {
            return Err(ConfigError::Invalid("refinement.top_k must be positive".to_string()));
        }
        Ok(())
    }
}
