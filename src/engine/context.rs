use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::engine::tracker::ExecutionTracker;
use crate::graph::{FetchCache, FetchError, FetchStats, GetParams, Resource};
use crate::normalize::NormalizerChain;

/// Per-run state shared by every branch of one query execution.
///
/// Holds the fetched root and the run's fetch cache; both are dropped with
/// the context, so nothing fetched in one run is visible to the next.
pub struct RunContext<'a> {
    query_id: &'a str,
    root: Resource,
    cache: FetchCache<'a>,
    normalizers: &'a NormalizerChain,
    tracker: Option<&'a dyn ExecutionTracker>,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        query_id: &'a str,
        root: Resource,
        cache: FetchCache<'a>,
        normalizers: &'a NormalizerChain,
        tracker: Option<&'a dyn ExecutionTracker>,
    ) -> Self {
        Self {
            query_id,
            root,
            cache,
            normalizers,
            tracker,
        }
    }

    /// Query being executed.
    pub fn query_id(&self) -> &str {
        self.query_id
    }

    /// Service root node.
    pub fn root(&self) -> &Resource {
        &self.root
    }

    /// Normalization chain applied to matched nodes.
    pub fn normalizers(&self) -> &NormalizerChain {
        self.normalizers
    }

    /// Optional execution tracker.
    pub fn tracker(&self) -> Option<&dyn ExecutionTracker> {
        self.tracker
    }

    /// Fetches `id` through the run's cache, reporting the executed path
    /// prefix to the tracker.
    pub fn fetch(&self, id: &str, path: &str, params: &GetParams) -> Result<Arc<JsonValue>, FetchError> {
        if let Some(tracker) = self.tracker {
            tracker.on_path_queried(path, params);
        }
        self.cache.fetch(id, params)
    }

    /// Cache counters for this run.
    pub fn fetch_stats(&self) -> FetchStats {
        self.cache.stats()
    }
}
