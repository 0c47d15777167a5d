use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{ExpandParams, GetParams, PathRules};
use crate::query::validate::ValidationLimits;

/// Errors raised while loading engine configuration or query files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// TOML document did not match the expected shape.
    #[error("failed to parse {path}: {source}")]
    Toml {
        /// Offending path, empty for in-memory documents.
        path: PathBuf,
        /// Underlying parse error.
        source: toml::de::Error,
    },
    /// JSON document did not match the expected shape.
    #[error("failed to parse {path}: {source}")]
    Json {
        /// Offending path, empty for in-memory documents.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
    /// File extension is neither `.json` nor `.toml`.
    #[error("unsupported query file format for {path}; expected .json or .toml")]
    UnsupportedFormat {
        /// Offending path.
        path: PathBuf,
    },
}

/// Fetch parameters applied when a traversal reaches `path`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRule {
    /// Executed path prefix, step names joined with `/` (`/Chassis/Sensors`).
    pub path: String,
    /// `$expand` to request at that prefix.
    #[serde(default)]
    pub expand: Option<ExpandParams>,
}

impl PathRule {
    fn params(&self) -> GetParams {
        GetParams {
            expand: self.expand,
        }
    }
}

/// Engine-wide configuration.
///
/// ```toml
/// parallel_root_subqueries = true
///
/// [validation]
/// max_path_depth = 6
///
/// [[query_rules.SensorCollector]]
/// path = "/Chassis/Sensors"
/// expand = { kind = "not_links", levels = 1 }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Execute root subqueries of a run on scoped threads.
    pub parallel_root_subqueries: bool,
    /// Thresholds for compile-time plan warnings.
    pub validation: ValidationLimits,
    /// Per-query fetch parameter rules, keyed by query id.
    pub query_rules: BTreeMap<String, Vec<PathRule>>,
}

impl EngineConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: PathBuf::new(),
            source,
        })
    }

    /// Reads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = read_file(path)?;
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fetch rules for one query. Later rules for the same path win.
    pub fn rules_for(&self, query_id: &str) -> PathRules {
        self.query_rules
            .get(query_id)
            .map(|rules| {
                rules
                    .iter()
                    .map(|rule| (rule.path.clone(), rule.params()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub(crate) fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}
