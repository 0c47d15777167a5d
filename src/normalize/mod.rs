//! Normalization chain: turns matched nodes into output records.
//!
//! A chain is an ordered list of [`Normalizer`]s applied one after another to
//! the same [`DataRecord`]. The default chain only extracts the requested
//! properties; decorators append derived fields such as stable identifiers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{Resource, ResourceView};
use crate::query::definition::{PropertySpec, PropertyType};
use crate::query::value::Value;

mod decorators;

pub use decorators::{IdentifierDecorator, LocationResolver, PartLocationResolver, UriDecorator};

/// Output record produced for one matched node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Extracted and decorated fields keyed by output name.
    pub properties: BTreeMap<String, Value>,
    /// Index of the parent subquery's record this node was reached from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_index: Option<usize>,
}

impl DataRecord {
    /// Empty record linked to a parent record.
    pub fn with_parent(parent_index: Option<usize>) -> Self {
        Self {
            properties: BTreeMap::new(),
            parent_index,
        }
    }

    /// Field value by output name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Sets a field, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name.into(), value);
    }
}

/// Failures raised by a normalizer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// Properties were requested from a node that has none.
    #[error("node {id} is a scalar value and has no properties")]
    ScalarNode {
        /// Node identifier, or `<inline>`.
        id: String,
    },
    /// A location resolver reported a failure.
    #[error("location resolver failed for {id}: {message}")]
    Resolver {
        /// Node identifier, or `<inline>`.
        id: String,
        /// Resolver message.
        message: String,
    },
    /// Any other normalizer-specific failure.
    #[error("{0}")]
    Other(String),
}

impl NormalizeError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            NormalizeError::ScalarNode { .. } => "ScalarNode",
            NormalizeError::Resolver { .. } => "Resolver",
            NormalizeError::Other(_) => "Normalize",
        }
    }
}

pub(crate) fn display_id(node: &Resource) -> String {
    node.id().unwrap_or("<inline>").to_owned()
}

/// One transform step of the chain.
pub trait Normalizer: Send + Sync {
    /// Adds fields for `node` to `record`.
    fn normalize(
        &self,
        node: &Resource,
        properties: &[PropertySpec],
        record: &mut DataRecord,
    ) -> Result<(), NormalizeError>;
}

/// Copies requested properties into the record, coerced to their declared
/// type. Missing or mistyped properties are left out.
#[derive(Clone, Copy, Debug, Default)]
pub struct PropertyExtractor;

impl Normalizer for PropertyExtractor {
    fn normalize(
        &self,
        node: &Resource,
        properties: &[PropertySpec],
        record: &mut DataRecord,
    ) -> Result<(), NormalizeError> {
        if properties.is_empty() {
            return Ok(());
        }
        if let ResourceView::Scalar(_) = node.view() {
            return Err(NormalizeError::ScalarNode {
                id: display_id(node),
            });
        }
        for spec in properties {
            let Some(raw) = node.property(&spec.segments()) else {
                continue;
            };
            if let Some(value) = coerce(raw, spec.kind) {
                record.insert(spec.name.clone(), value);
            }
        }
        Ok(())
    }
}

fn coerce(raw: &serde_json::Value, kind: PropertyType) -> Option<Value> {
    use serde_json::Value as Json;
    match (kind, raw) {
        (PropertyType::Any, other) => Value::from_json(other),
        (PropertyType::String, Json::String(s)) => Some(Value::String(s.clone())),
        (PropertyType::Boolean, Json::Bool(b)) => Some(Value::Bool(*b)),
        (PropertyType::Double, Json::Number(n)) => n.as_f64().map(Value::Float),
        (PropertyType::Int64, Json::Number(n)) => n.as_i64().map(Value::Int),
        (PropertyType::DateTimeOffset, Json::String(s)) => Value::parse_datetime(s),
        _ => None,
    }
}

/// Ordered list of normalizers applied sequentially.
#[derive(Clone, Default)]
pub struct NormalizerChain {
    steps: Vec<Arc<dyn Normalizer>>,
}

impl NormalizerChain {
    /// Chain with no steps; produces empty records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain whose only step is [`PropertyExtractor`].
    pub fn with_defaults() -> Self {
        Self::new().then(PropertyExtractor)
    }

    /// Appends a step.
    pub fn push(&mut self, normalizer: impl Normalizer + 'static) {
        self.steps.push(Arc::new(normalizer));
    }

    /// Appends a step, builder style.
    pub fn then(mut self, normalizer: impl Normalizer + 'static) -> Self {
        self.push(normalizer);
        self
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the chain has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order on a fresh record.
    pub fn normalize(
        &self,
        node: &Resource,
        properties: &[PropertySpec],
        parent_index: Option<usize>,
    ) -> Result<DataRecord, NormalizeError> {
        let mut record = DataRecord::with_parent(parent_index);
        for step in &self.steps {
            step.normalize(node, properties, &mut record)?;
        }
        Ok(record)
    }
}

impl fmt::Debug for NormalizerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizerChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}
