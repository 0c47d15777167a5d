use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use super::{FetchError, GetParams, MetricsSink, ResourceAccessor};
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};

type FetchOutcome = Result<Arc<JsonValue>, FetchError>;

/// Hit/miss counters of a [`FetchCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Requests answered from the cache, including waiters on an in-flight fetch.
    pub hits: u64,
    /// Requests forwarded to the accessor.
    pub misses: u64,
}

/// Run-scoped cache guaranteeing one accessor call per resource id.
///
/// Each id maps to a write-once cell. The first caller runs the fetch inside
/// the cell's initializer while concurrent callers for the same id block on
/// it and then observe the same outcome, errors included. The map lock is
/// only held long enough to find or insert the cell, so fetches for distinct
/// ids proceed in parallel.
///
/// Entries are keyed by id alone: when two paths fetch the same id with
/// different [`GetParams`], the first request's parameters win.
pub struct FetchCache<'a> {
    accessor: &'a dyn ResourceAccessor,
    metrics: Option<&'a dyn MetricsSink>,
    entries: Mutex<HashMap<String, Arc<OnceLock<FetchOutcome>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<'a> FetchCache<'a> {
    /// Wraps an accessor. `metrics` receives one record per underlying fetch.
    pub fn new(accessor: &'a dyn ResourceAccessor, metrics: Option<&'a dyn MetricsSink>) -> Self {
        Self {
            accessor,
            metrics,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Identifier of the service root.
    pub fn root_id(&self) -> &str {
        self.accessor.root_id()
    }

    /// Fetches `id`, issuing at most one accessor call per id for the lifetime
    /// of the cache.
    pub fn fetch(&self, id: &str, params: &GetParams) -> FetchOutcome {
        let cell = {
            let mut entries = self.entries.lock();
            Arc::clone(entries.entry(id.to_owned()).or_default())
        };
        let mut issued = false;
        let outcome = cell.get_or_init(|| {
            issued = true;
            self.load(id, params)
        });
        if issued {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(resource = %id, "fetch.cache.hit");
        }
        outcome.clone()
    }

    fn load(&self, id: &str, params: &GetParams) -> FetchOutcome {
        debug!(resource = %id, params = %params, "fetch.cache.miss");
        let start = profile_timer();
        let result = self.accessor.fetch(id, params);
        record_profile_timer(QueryProfileKind::Fetch, start);
        if let Some(metrics) = self.metrics {
            metrics.record(id, params.request_kind(), result.is_ok());
        }
        match result {
            Ok(payload) => Ok(Arc::new(payload)),
            Err(err) => {
                debug!(resource = %id, code = err.code(), error = %err.message, "fetch.failed");
                Err(err)
            }
        }
    }

    /// Current hit/miss counters.
    pub fn stats(&self) -> FetchStats {
        FetchStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Number of distinct ids requested so far.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing has been requested yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
