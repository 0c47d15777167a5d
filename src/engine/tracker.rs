use std::collections::BTreeSet;

use parking_lot::Mutex;

use crate::graph::GetParams;
use crate::query::result::Status;

/// Observer of query execution.
///
/// Trackers see events from every branch of a run, possibly from several
/// threads at once. They cannot influence results.
pub trait ExecutionTracker: Send + Sync {
    /// A subquery's traversal is about to start.
    fn on_subquery_start(&self, _query_id: &str, _subquery_id: &str) {}

    /// A subquery's own traversal finished with `status`.
    fn on_subquery_end(&self, _query_id: &str, _subquery_id: &str, _status: &Status) {}

    /// A fetch was requested at executed path prefix `path`.
    fn on_path_queried(&self, _path: &str, _params: &GetParams) {}
}

/// Event captured by a [`RecordingTracker`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerEvent {
    /// See [`ExecutionTracker::on_subquery_start`].
    SubqueryStart {
        /// Query identifier.
        query_id: String,
        /// Subquery identifier.
        subquery_id: String,
    },
    /// See [`ExecutionTracker::on_subquery_end`].
    SubqueryEnd {
        /// Query identifier.
        query_id: String,
        /// Subquery identifier.
        subquery_id: String,
        /// Final status of the subquery's own traversal.
        status: Status,
    },
    /// See [`ExecutionTracker::on_path_queried`].
    PathQueried {
        /// Executed path prefix.
        path: String,
        /// Parameters of the fetch.
        params: GetParams,
    },
}

/// Append-only tracker that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingTracker {
    events: Mutex<Vec<TrackerEvent>>,
}

impl RecordingTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events in arrival order.
    pub fn events(&self) -> Vec<TrackerEvent> {
        self.events.lock().clone()
    }

    /// Distinct path prefixes fetched so far.
    pub fn queried_paths(&self) -> BTreeSet<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TrackerEvent::PathQueried { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Final status reported for a subquery, if it ended.
    pub fn status_of(&self, subquery_id: &str) -> Option<Status> {
        self.events.lock().iter().rev().find_map(|event| match event {
            TrackerEvent::SubqueryEnd {
                subquery_id: id,
                status,
                ..
            } if id == subquery_id => Some(status.clone()),
            _ => None,
        })
    }

    /// Drops every recorded event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ExecutionTracker for RecordingTracker {
    fn on_subquery_start(&self, query_id: &str, subquery_id: &str) {
        self.events.lock().push(TrackerEvent::SubqueryStart {
            query_id: query_id.to_owned(),
            subquery_id: subquery_id.to_owned(),
        });
    }

    fn on_subquery_end(&self, query_id: &str, subquery_id: &str, status: &Status) {
        self.events.lock().push(TrackerEvent::SubqueryEnd {
            query_id: query_id.to_owned(),
            subquery_id: subquery_id.to_owned(),
            status: status.clone(),
        });
    }

    fn on_path_queried(&self, path: &str, params: &GetParams) {
        self.events.lock().push(TrackerEvent::PathQueried {
            path: path.to_owned(),
            params: *params,
        });
    }
}
