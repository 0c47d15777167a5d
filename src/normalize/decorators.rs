use std::collections::BTreeMap;

use crate::graph::Resource;
use crate::query::definition::PropertySpec;
use crate::query::value::Value;

use super::{display_id, DataRecord, NormalizeError, Normalizer};

/// Derives a stable physical-location identifier for a node.
///
/// Implementations typically consult a topology built from the resource graph.
/// Returning `Ok(None)` means the node has no known location.
pub trait LocationResolver: Send + Sync {
    /// Identifier for `node`, if one can be derived.
    fn resolve(&self, node: &Resource) -> Result<Option<String>, String>;
}

/// Resolves locations from `Location.PartLocationContext` and
/// `Location.PartLocation.ServiceLabel`, joined with `/`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PartLocationResolver;

impl LocationResolver for PartLocationResolver {
    fn resolve(&self, node: &Resource) -> Result<Option<String>, String> {
        let label = node
            .property(&["Location", "PartLocation", "ServiceLabel"])
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());
        let context = node
            .property(&["Location", "PartLocationContext"])
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());
        Ok(match (context, label) {
            (Some(context), Some(label)) => Some(format!("{context}/{label}")),
            (None, Some(label)) => Some(label.to_owned()),
            _ => None,
        })
    }
}

/// Fixed mapping from resource id to identifier, as produced by an external
/// topology builder.
impl LocationResolver for BTreeMap<String, String> {
    fn resolve(&self, node: &Resource) -> Result<Option<String>, String> {
        Ok(node.id().and_then(|id| self.get(id)).cloned())
    }
}

/// Adds the resolved location under a configurable field.
#[derive(Clone, Debug)]
pub struct IdentifierDecorator<R: LocationResolver> {
    resolver: R,
    field: String,
}

impl<R: LocationResolver> IdentifierDecorator<R> {
    /// Decorator writing to the `devpath` field.
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            field: "devpath".to_owned(),
        }
    }

    /// Overrides the output field name.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }
}

impl<R: LocationResolver> Normalizer for IdentifierDecorator<R> {
    fn normalize(
        &self,
        node: &Resource,
        _properties: &[PropertySpec],
        record: &mut DataRecord,
    ) -> Result<(), NormalizeError> {
        let resolved = self
            .resolver
            .resolve(node)
            .map_err(|message| NormalizeError::Resolver {
                id: display_id(node),
                message,
            })?;
        if let Some(identifier) = resolved {
            record.insert(self.field.clone(), Value::String(identifier));
        }
        Ok(())
    }
}

/// Adds the node's resource id under a configurable field.
#[derive(Clone, Debug)]
pub struct UriDecorator {
    field: String,
}

impl Default for UriDecorator {
    fn default() -> Self {
        Self::new("uri")
    }
}

impl UriDecorator {
    /// Decorator writing to `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Normalizer for UriDecorator {
    fn normalize(
        &self,
        node: &Resource,
        _properties: &[PropertySpec],
        record: &mut DataRecord,
    ) -> Result<(), NormalizeError> {
        if let Some(id) = node.id() {
            record.insert(self.field.clone(), Value::from(id));
        }
        Ok(())
    }
}
