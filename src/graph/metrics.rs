use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use super::RequestKind;

/// Sink for per-request accounting.
///
/// Only requests that reach the accessor are recorded; fetches served from
/// the in-run cache are not. Sinks may be shared across concurrent runs, so
/// implementations must tolerate concurrent calls.
pub trait MetricsSink: Send + Sync {
    /// Records one request for `resource_id`.
    fn record(&self, resource_id: &str, kind: RequestKind, success: bool);
}

/// Counters for one `(resource id, request kind)` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    /// Requests issued.
    pub count: u64,
    /// Requests that failed.
    pub failures: u64,
}

/// Thread-safe [`MetricsSink`] keeping one entry per resource and request
/// kind, plus global totals.
#[derive(Default)]
pub struct RequestMetrics {
    table: Mutex<BTreeMap<(String, RequestKind), RequestStats>>,
    /// Total requests recorded.
    pub requests: AtomicU64,
    /// Total failed requests recorded.
    pub failures: AtomicU64,
}

impl RequestMetrics {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats for one resource and request kind.
    pub fn stats(&self, resource_id: &str, kind: RequestKind) -> RequestStats {
        self.table
            .lock()
            .get(&(resource_id.to_owned(), kind))
            .copied()
            .unwrap_or_default()
    }

    /// Requests of any kind issued for `resource_id`.
    pub fn requests_for(&self, resource_id: &str) -> u64 {
        self.table
            .lock()
            .iter()
            .filter(|((id, _), _)| id == resource_id)
            .map(|(_, stats)| stats.count)
            .sum()
    }

    /// Copy of every entry, ordered by resource id then kind.
    pub fn snapshot(&self) -> BTreeMap<(String, RequestKind), RequestStats> {
        self.table.lock().clone()
    }

    /// Clears every counter.
    pub fn reset(&self) {
        self.table.lock().clear();
        self.requests.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }
}

impl MetricsSink for RequestMetrics {
    fn record(&self, resource_id: &str, kind: RequestKind, success: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        let mut table = self.table.lock();
        let entry = table.entry((resource_id.to_owned(), kind)).or_default();
        entry.count += 1;
        if !success {
            entry.failures += 1;
        }
    }
}
