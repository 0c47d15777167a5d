#![forbid(unsafe_code)]

//! Query compilation and execution.
//!
//! Definitions are compiled into immutable plans by the [`planner`], then
//! executed step by step by the [`executor`] against a resource graph.

/// Compiled path syntax: selectors, predicates and steps.
pub mod ast;

/// Declarative query definitions and their file formats.
pub mod definition;

/// Path and plan compilation errors.
pub mod errors;

/// Subquery traversal.
pub mod executor;

/// Path expression compiler.
pub mod path;

/// Plan compiler and explain output.
pub mod planner;

/// Predicate evaluation against graph nodes.
pub mod predicate;

/// Performance profiling for query operations.
///
/// Collects timing and count statistics to identify slow fetches and traversals.
pub mod profile;

/// Result structures and assembly.
pub mod result;

/// Advisory plan checks.
pub mod validate;

/// Typed property values.
pub mod value;

pub use definition::{PropertySpec, PropertyType, QueryDefinition, SubqueryDefinition};
pub use errors::{PathError, PathErrorWithCode, PlanError, PlanErrorWithCode};
pub use executor::{ContextNode, Executor};
/// Execution plan output with explanation capabilities.
pub use planner::{compile, ExecutionPlan, PlanExplain, Planner, PlannerConfig, SubqueryPlan};
pub use profile::{profile_snapshot, QueryProfileSnapshot};
pub use result::{QueryResult, Status, StatusCode, SubqueryOutput};
pub use validate::{PlanWarning, PlanWarningKind, ValidationLimits};
pub use value::Value;
