//! Resource graph model and access layer.
//!
//! A remote management endpoint exposes a tree of JSON resources addressed by
//! identifiers (URIs). Resources reference each other through link objects
//! (`{"@odata.id": "<id>"}`) and group members into collections. This module
//! provides the node type the query engine walks, the accessor trait the
//! transport implements, the per-run fetch cache and request metrics.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Fetch error classification.
pub mod error;
/// Per-run single-flight fetch cache.
pub mod fetch;
/// Request counters.
pub mod metrics;
/// In-memory accessor backed by a JSON document.
pub mod mockup;

pub use error::{ErrorCode, FetchError};
pub use fetch::{FetchCache, FetchStats};
pub use metrics::{MetricsSink, RequestMetrics, RequestStats};
pub use mockup::JsonMockup;

/// Key under which resources carry their own identifier and links carry their
/// target.
pub const ODATA_ID: &str = "@odata.id";
/// Key holding collection members.
pub const MEMBERS: &str = "Members";

/// Returns the link target when `value` is a bare link object.
pub fn link_target(value: &JsonValue) -> Option<&str> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get(ODATA_ID)?.as_str()
}

/// Shape of a node.
#[derive(Clone, Copy, Debug)]
pub enum ResourceView<'a> {
    /// Object resource with named properties.
    Object(&'a Map<String, JsonValue>),
    /// Collection: a JSON array, or an object carrying a `Members` array.
    Collection(&'a [JsonValue]),
    /// Scalar value reached by selecting a primitive property.
    Scalar(&'a JsonValue),
}

struct ResourceInner {
    id: Option<String>,
    payload: Arc<JsonValue>,
    parent: Option<Resource>,
}

/// Node of the resource graph as seen by the traversal.
///
/// Cheap to clone. Each node remembers the node it was reached from, which
/// backs the ancestor (`..`) selector.
#[derive(Clone)]
pub struct Resource(Arc<ResourceInner>);

impl Resource {
    /// Builds a parentless node, typically the service root.
    pub fn root(id: impl Into<String>, payload: Arc<JsonValue>) -> Self {
        Self(Arc::new(ResourceInner {
            id: Some(id.into()),
            payload,
            parent: None,
        }))
    }

    /// Builds a node reached from `parent`.
    ///
    /// Inline objects without an explicit id fall back to their `@odata.id`
    /// member when present.
    pub fn child(parent: &Resource, id: Option<String>, payload: Arc<JsonValue>) -> Self {
        let id = id.or_else(|| {
            payload
                .get(ODATA_ID)
                .and_then(JsonValue::as_str)
                .map(str::to_owned)
        });
        Self(Arc::new(ResourceInner {
            id,
            payload,
            parent: Some(parent.clone()),
        }))
    }

    /// True when both handles point at the same traversal node.
    pub fn same_node(&self, other: &Resource) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Resource identifier, when the node is addressable.
    pub fn id(&self) -> Option<&str> {
        self.0.id.as_deref()
    }

    /// Raw JSON payload.
    pub fn payload(&self) -> &JsonValue {
        &self.0.payload
    }

    /// Node this one was reached from.
    pub fn parent(&self) -> Option<&Resource> {
        self.0.parent.as_ref()
    }

    /// Classifies the payload.
    pub fn view(&self) -> ResourceView<'_> {
        match self.payload() {
            JsonValue::Array(items) => ResourceView::Collection(items),
            JsonValue::Object(map) => match map.get(MEMBERS) {
                Some(JsonValue::Array(items)) => ResourceView::Collection(items),
                _ => ResourceView::Object(map),
            },
            other => ResourceView::Scalar(other),
        }
    }

    /// Object properties, including those of a collection resource.
    pub fn properties(&self) -> Option<&Map<String, JsonValue>> {
        self.payload().as_object()
    }

    /// Resolves a property path against the payload, walking nested objects.
    pub fn property<S: AsRef<str>>(&self, path: &[S]) -> Option<&JsonValue> {
        let (first, rest) = path.split_first()?;
        let mut current = self.properties()?.get(first.as_ref())?;
        for segment in rest {
            current = current.as_object()?.get(segment.as_ref())?;
        }
        Some(current)
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.0.id)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

/// Which members an `$expand` request inlines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpandKind {
    /// Expand both links and inline navigation members.
    Both,
    /// Expand only non-link members.
    NotLinks,
    /// Expand only link members.
    Links,
}

/// `$expand` parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpandParams {
    /// Expansion flavour.
    pub kind: ExpandKind,
    /// Depth to expand to, at least one.
    #[serde(default = "default_levels")]
    pub levels: u32,
}

fn default_levels() -> u32 {
    1
}

/// Parameters attached to a single fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GetParams {
    /// Optional `$expand` request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<ExpandParams>,
}

impl GetParams {
    /// Request classification used for metrics.
    pub fn request_kind(&self) -> RequestKind {
        if self.expand.is_some() {
            RequestKind::Expand
        } else {
            RequestKind::Get
        }
    }
}

impl fmt::Display for GetParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expand {
            None => f.write_str("get"),
            Some(expand) => {
                let kind = match expand.kind {
                    ExpandKind::Both => "*",
                    ExpandKind::NotLinks => ".",
                    ExpandKind::Links => "~",
                };
                write!(f, "$expand={kind}($levels={})", expand.levels)
            }
        }
    }
}

/// Kind of request issued to the accessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Plain GET.
    Get,
    /// GET with `$expand`.
    Expand,
}

/// Per-path fetch parameters, keyed by executed path prefix such as
/// `/Chassis/Sensors`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathRules {
    rules: BTreeMap<String, GetParams>,
}

impl PathRules {
    /// Empty rule set: every fetch is a plain GET.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the parameters for a path prefix.
    pub fn insert(&mut self, prefix: impl Into<String>, params: GetParams) {
        self.rules.insert(prefix.into(), params);
    }

    /// Parameters for a prefix, defaulting to a plain GET.
    pub fn params_for(&self, prefix: &str) -> GetParams {
        self.rules.get(prefix).copied().unwrap_or_default()
    }

    /// Number of configured prefixes.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no prefixes are configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<(String, GetParams)> for PathRules {
    fn from_iter<T: IntoIterator<Item = (String, GetParams)>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

/// Transport-facing accessor for the resource graph.
///
/// Implementations classify transport failures into [`FetchError`] and apply
/// their own deadline policy; a timeout is just another fetch error.
pub trait ResourceAccessor: Send + Sync {
    /// Identifier of the service root.
    fn root_id(&self) -> &str;

    /// Fetches a single resource payload.
    fn fetch(&self, id: &str, params: &GetParams) -> Result<JsonValue, FetchError>;
}
