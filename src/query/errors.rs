#![forbid(unsafe_code)]

use std::fmt;

use thiserror::Error;

/// Errors raised while compiling a path expression into steps.
///
/// Each variant carries the offending fragment so messages point callers at
/// the exact segment that failed to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Expression was blank or consisted only of separators.
    #[error("path expression is empty")]
    Empty,
    /// Two separators appeared back to back inside the expression.
    #[error("empty step at position {position} in '{expr}'")]
    EmptySegment {
        /// Original expression.
        expr: String,
        /// Zero-based step position.
        position: usize,
    },
    /// Brackets or quotes did not close.
    #[error("unbalanced brackets in '{fragment}'")]
    UnbalancedBrackets {
        /// Offending fragment.
        fragment: String,
    },
    /// Step name was not a valid node name or marker.
    #[error("malformed step '{step}'")]
    MalformedStep {
        /// Offending step text.
        step: String,
    },
    /// `[]` with nothing inside.
    #[error("empty predicate in step '{step}'")]
    EmptyPredicate {
        /// Offending step text.
        step: String,
    },
    /// Comparison operator outside `= != < <= > >=`.
    #[error("unsupported operator '{op}' in predicate '{term}'")]
    UnsupportedOperator {
        /// Operator text as written.
        op: String,
        /// Predicate term containing it.
        term: String,
    },
    /// Predicate term could not be interpreted.
    #[error("malformed predicate '{term}'")]
    MalformedPredicate {
        /// Offending predicate text.
        term: String,
    },
    /// Literal on the right-hand side of a comparison was invalid.
    #[error("invalid literal '{literal}'")]
    InvalidLiteral {
        /// Literal text as written.
        literal: String,
    },
}

impl PathError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            PathError::Empty => "EmptyExpression",
            PathError::EmptySegment { .. } => "EmptySegment",
            PathError::UnbalancedBrackets { .. } => "UnbalancedBrackets",
            PathError::MalformedStep { .. } => "MalformedStep",
            PathError::EmptyPredicate { .. } => "EmptyPredicate",
            PathError::UnsupportedOperator { .. } => "UnsupportedOperator",
            PathError::MalformedPredicate { .. } => "MalformedPredicate",
            PathError::InvalidLiteral { .. } => "InvalidLiteral",
        }
    }
}

/// Structural errors detected while compiling a query into an execution plan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Query declared no subqueries.
    #[error("query '{query_id}' has no subqueries")]
    EmptyQuery {
        /// Query identifier.
        query_id: String,
    },
    /// Two subqueries share an id.
    #[error("duplicate subquery id '{subquery_id}'")]
    DuplicateSubquery {
        /// Repeated id.
        subquery_id: String,
    },
    /// Path expression of a subquery failed to parse.
    #[error("subquery '{subquery_id}' has invalid path '{path}': {source}")]
    Parse {
        /// Subquery whose path failed.
        subquery_id: String,
        /// Path expression as written.
        path: String,
        /// Underlying parse failure.
        #[source]
        source: PathError,
    },
    /// Child link names a subquery that does not exist in the query.
    #[error("subquery '{subquery_id}' links to unknown subquery '{target}'")]
    InvalidLink {
        /// Linking subquery.
        subquery_id: String,
        /// Missing target id.
        target: String,
    },
    /// Child links form a cycle.
    #[error("cyclic subquery link: {}", cycle.join(" -> "))]
    CyclicLink {
        /// Subquery ids along the cycle, first id repeated at the end.
        cycle: Vec<String>,
    },
}

impl PlanError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::EmptyQuery { .. } => "EmptyQuery",
            PlanError::DuplicateSubquery { .. } => "DuplicateSubquery",
            PlanError::Parse { source, .. } => source.code(),
            PlanError::InvalidLink { .. } => "InvalidLink",
            PlanError::CyclicLink { .. } => "CyclicLink",
        }
    }
}

/// Convenience wrapper that formats plan errors with their codes.
pub struct PlanErrorWithCode<'a>(pub &'a PlanError);

impl fmt::Display for PlanErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}

/// Convenience wrapper that formats path errors with their codes.
pub struct PathErrorWithCode<'a>(pub &'a PathError);

impl fmt::Display for PathErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
