use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Accumulated timings for the phases of query execution.
///
/// Profiling is enabled via the `REDPATH_PROFILE` environment variable. When it
/// is unset every timer is a no-op and [`profile_snapshot`] returns `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryProfileSnapshot {
    /// Total nanoseconds spent in underlying resource fetches.
    pub fetch_ns: u64,
    /// Number of underlying resource fetches.
    pub fetch_count: u64,
    /// Total nanoseconds spent executing subquery step chains.
    pub traverse_ns: u64,
    /// Number of subquery traversals.
    pub traverse_count: u64,
    /// Total nanoseconds spent evaluating step predicates.
    pub predicate_ns: u64,
    /// Number of predicate filter passes.
    pub predicate_count: u64,
    /// Total nanoseconds spent in the normalization chain.
    pub normalize_ns: u64,
    /// Number of normalized nodes.
    pub normalize_count: u64,
}

#[derive(Default)]
struct QueryProfileCounters {
    fetch_ns: AtomicU64,
    fetch_count: AtomicU64,
    traverse_ns: AtomicU64,
    traverse_count: AtomicU64,
    predicate_ns: AtomicU64,
    predicate_count: AtomicU64,
    normalize_ns: AtomicU64,
    normalize_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<QueryProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("REDPATH_PROFILE").is_some())
}

fn counters() -> Option<&'static QueryProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(QueryProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum QueryProfileKind {
    /// Underlying accessor fetch (cache misses only).
    Fetch,
    /// One subquery step chain from a single context set.
    Traverse,
    /// Predicate filtering of one step's node set.
    Predicate,
    /// Normalization of one matched node.
    Normalize,
}

pub(crate) fn record_profile_timer(kind: QueryProfileKind, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    let (ns, count) = match kind {
        QueryProfileKind::Fetch => (&counters.fetch_ns, &counters.fetch_count),
        QueryProfileKind::Traverse => (&counters.traverse_ns, &counters.traverse_count),
        QueryProfileKind::Predicate => (&counters.predicate_ns, &counters.predicate_count),
        QueryProfileKind::Normalize => (&counters.normalize_ns, &counters.normalize_count),
    };
    ns.fetch_add(nanos, Ordering::Relaxed);
    count.fetch_add(1, Ordering::Relaxed);
}

/// Retrieves a snapshot of current query profiling counters.
///
/// Returns `None` when `REDPATH_PROFILE` is unset. With `reset` the counters
/// are zeroed as they are read.
///
/// ```no_run
/// use redpath::query::profile::profile_snapshot;
///
/// if let Some(snapshot) = profile_snapshot(true) {
///     println!("fetches: {} in {}ns", snapshot.fetch_count, snapshot.fetch_ns);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<QueryProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(QueryProfileSnapshot {
        fetch_ns: load(&counters.fetch_ns),
        fetch_count: load(&counters.fetch_count),
        traverse_ns: load(&counters.traverse_ns),
        traverse_count: load(&counters.traverse_count),
        predicate_ns: load(&counters.predicate_ns),
        predicate_count: load(&counters.predicate_count),
        normalize_ns: load(&counters.normalize_ns),
        normalize_count: load(&counters.normalize_count),
    })
}
