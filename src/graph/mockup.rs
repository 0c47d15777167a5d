use std::collections::HashMap;
use std::path::Path;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::trace;

use super::{ExpandKind, FetchError, GetParams, ResourceAccessor, ODATA_ID};

/// Default service root identifier.
pub const DEFAULT_ROOT: &str = "/redfish/v1";

/// Errors raised while loading a mockup document.
#[derive(Debug, Error)]
pub enum MockupError {
    /// File could not be read.
    #[error("failed to read mockup {path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Document was not valid JSON.
    #[error("invalid mockup json: {0}")]
    Json(#[from] serde_json::Error),
    /// Document was JSON but not an object keyed by resource id.
    #[error("mockup must be an object mapping resource ids to payloads")]
    Shape,
}

/// In-memory [`ResourceAccessor`] serving payloads from a map of resource id
/// to JSON document.
///
/// Supports injected failures, an artificial per-fetch latency and
/// `$expand` of link objects, and counts every fetch it serves.
pub struct JsonMockup {
    root: String,
    resources: HashMap<String, JsonValue>,
    failures: HashMap<String, FetchError>,
    latency: Option<Duration>,
    calls: Mutex<HashMap<String, u64>>,
}

impl Default for JsonMockup {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonMockup {
    /// Empty mockup rooted at `/redfish/v1`.
    pub fn new() -> Self {
        Self {
            root: DEFAULT_ROOT.to_owned(),
            resources: HashMap::new(),
            failures: HashMap::new(),
            latency: None,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a mockup from a `{ "<id>": { ...payload... } }` document.
    pub fn from_value(document: JsonValue) -> Result<Self, MockupError> {
        let JsonValue::Object(entries) = document else {
            return Err(MockupError::Shape);
        };
        let mut mockup = Self::new();
        mockup.resources = entries.into_iter().collect();
        Ok(mockup)
    }

    /// Parses a mockup document from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Self, MockupError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Reads a mockup document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MockupError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MockupError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Overrides the root identifier.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Adds or replaces a resource.
    pub fn with_resource(mut self, id: impl Into<String>, payload: JsonValue) -> Self {
        self.resources.insert(id.into(), payload);
        self
    }

    /// Makes every fetch of `id` fail with `error`.
    pub fn with_failure(mut self, id: impl Into<String>, error: FetchError) -> Self {
        self.failures.insert(id.into(), error);
        self
    }

    /// Sleeps for `latency` inside every fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fetches served for `id` so far, failures included.
    pub fn fetch_count(&self, id: &str) -> u64 {
        self.calls.lock().get(id).copied().unwrap_or(0)
    }

    /// Fetches served across all ids.
    pub fn total_fetches(&self) -> u64 {
        self.calls.lock().values().sum()
    }

    /// Resets the fetch counters.
    pub fn reset_counts(&self) {
        self.calls.lock().clear();
    }

    fn expand(&self, value: &mut JsonValue, kind: ExpandKind, levels: u32, in_links: bool) {
        if levels == 0 {
            return;
        }
        match value {
            JsonValue::Array(items) => {
                for item in items {
                    self.expand(item, kind, levels, in_links);
                }
            }
            JsonValue::Object(map) => {
                if let Some(target) = link_target_in(map) {
                    let wanted = match kind {
                        ExpandKind::Both => true,
                        ExpandKind::Links => in_links,
                        ExpandKind::NotLinks => !in_links,
                    };
                    if let (true, Some(payload)) = (wanted, self.resources.get(&target)) {
                        let mut inlined = payload.clone();
                        self.expand(&mut inlined, kind, levels - 1, false);
                        *value = inlined;
                    }
                    return;
                }
                for (key, child) in map.iter_mut() {
                    self.expand(child, kind, levels, in_links || key == "Links");
                }
            }
            _ => {}
        }
    }
}

fn link_target_in(map: &Map<String, JsonValue>) -> Option<String> {
    if map.len() != 1 {
        return None;
    }
    map.get(ODATA_ID)?.as_str().map(str::to_owned)
}

impl ResourceAccessor for JsonMockup {
    fn root_id(&self) -> &str {
        &self.root
    }

    fn fetch(&self, id: &str, params: &GetParams) -> Result<JsonValue, FetchError> {
        *self.calls.lock().entry(id.to_owned()).or_default() += 1;
        trace!(resource = %id, params = %params, "mockup.fetch");
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        if let Some(err) = self.failures.get(id) {
            return Err(err.clone());
        }
        let mut payload = self
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::not_found(id))?;
        if let Some(expand) = params.expand {
            self.expand(&mut payload, expand.kind, expand.levels.max(1), false);
        }
        Ok(payload)
    }
}
