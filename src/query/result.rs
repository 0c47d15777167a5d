//! Result structures and the assembler that builds them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::graph::{ErrorCode, FetchError};
use crate::normalize::{DataRecord, NormalizeError};

/// Outcome classification of a subquery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Traversal completed; zero records is still ok.
    Ok,
    /// A fetch was rejected for lack of rights.
    PermissionDenied,
    /// A fetch timed out.
    DeadlineExceeded,
    /// A fetched resource does not exist.
    NotFound,
    /// A fetch lacked valid credentials.
    Unauthenticated,
    /// Transport, server or normalization failure.
    Internal,
    /// The endpoint does not implement a request.
    Unimplemented,
}

impl From<ErrorCode> for StatusCode {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::PermissionDenied => StatusCode::PermissionDenied,
            ErrorCode::DeadlineExceeded => StatusCode::DeadlineExceeded,
            ErrorCode::NotFound => StatusCode::NotFound,
            ErrorCode::Unauthenticated => StatusCode::Unauthenticated,
            ErrorCode::Internal => StatusCode::Internal,
            ErrorCode::Unimplemented => StatusCode::Unimplemented,
        }
    }
}

impl StatusCode {
    /// Wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "ok",
            StatusCode::PermissionDenied => "permission_denied",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::NotFound => "not_found",
            StatusCode::Unauthenticated => "unauthenticated",
            StatusCode::Internal => "internal",
            StatusCode::Unimplemented => "unimplemented",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status attached to every subquery output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Outcome code.
    pub code: StatusCode,
    /// Underlying error message; empty when ok.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Status {
    /// Successful status.
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: String::new(),
        }
    }

    /// True for [`StatusCode::Ok`].
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl From<&FetchError> for Status {
    fn from(err: &FetchError) -> Self {
        Self {
            code: err.code.into(),
            message: err.message.clone(),
        }
    }
}

impl From<&NormalizeError> for Status {
    fn from(err: &NormalizeError) -> Self {
        Self {
            code: StatusCode::Internal,
            message: format!("[{}] {err}", err.code()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.code.as_str())
        } else {
            write!(f, "{}: {}", self.code.as_str(), self.message)
        }
    }
}

/// Output of one subquery, with linked children nested by id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubqueryOutput {
    /// Outcome of this subquery's own traversal.
    pub status: Status,
    /// Records in traversal order.
    #[serde(default)]
    pub data: Vec<DataRecord>,
    /// Outputs of linked child subqueries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, SubqueryOutput>,
}

impl SubqueryOutput {
    fn visit<'a>(&'a self, id: &'a str, visitor: &mut impl FnMut(&'a str, &'a SubqueryOutput)) {
        visitor(id, self);
        for (child_id, child) in &self.children {
            child.visit(child_id, visitor);
        }
    }
}

/// Result of one query run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Query identifier.
    pub query_id: String,
    /// Clock reading before the root fetch.
    #[serde(with = "time::serde::rfc3339")]
    pub start_timestamp: OffsetDateTime,
    /// Clock reading after the last subquery finished.
    #[serde(with = "time::serde::rfc3339")]
    pub end_timestamp: OffsetDateTime,
    /// Root subquery outputs keyed by id.
    pub subquery_outputs: BTreeMap<String, SubqueryOutput>,
}

impl QueryResult {
    /// First output for `id` in depth-first order, nested children included.
    pub fn find(&self, id: &str) -> Option<&SubqueryOutput> {
        let mut found = None;
        self.visit(|visited, output| {
            if found.is_none() && visited == id {
                found = Some(output);
            }
        });
        found
    }

    /// Every subquery id present anywhere in the result.
    pub fn subquery_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        self.visit(|id, _| {
            ids.insert(id.to_owned());
        });
        ids
    }

    /// True when nothing but the timestamps differ.
    pub fn same_outputs(&self, other: &QueryResult) -> bool {
        self.query_id == other.query_id && self.subquery_outputs == other.subquery_outputs
    }

    fn visit<'a>(&'a self, mut visitor: impl FnMut(&'a str, &'a SubqueryOutput)) {
        for (id, output) in &self.subquery_outputs {
            output.visit(id, &mut visitor);
        }
    }
}

/// Accumulates the outcome of one subquery.
///
/// Records are kept in arrival order. Only the first error is retained as the
/// status; later errors are dropped and records collected around them stay.
#[derive(Debug, Default)]
pub struct OutputBuilder {
    status: Option<Status>,
    data: Vec<DataRecord>,
    children: BTreeMap<String, SubqueryOutput>,
}

impl OutputBuilder {
    /// Empty builder with an ok status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure unless one was recorded already.
    pub fn fail(&mut self, status: Status) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    /// Appends a record.
    pub fn push(&mut self, record: DataRecord) {
        self.data.push(record);
    }

    /// Number of records collected so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no records were collected.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Attaches a linked child's output.
    pub fn attach_child(&mut self, id: impl Into<String>, output: SubqueryOutput) {
        self.children.insert(id.into(), output);
    }

    /// Finishes the output.
    pub fn finish(self) -> SubqueryOutput {
        SubqueryOutput {
            status: self.status.unwrap_or_default(),
            data: self.data,
            children: self.children,
        }
    }
}

/// Builds the final result from root subquery outputs.
pub fn assemble(
    query_id: &str,
    start_timestamp: OffsetDateTime,
    end_timestamp: OffsetDateTime,
    subquery_outputs: BTreeMap<String, SubqueryOutput>,
) -> QueryResult {
    QueryResult {
        query_id: query_id.to_owned(),
        start_timestamp,
        end_timestamp,
        subquery_outputs,
    }
}
