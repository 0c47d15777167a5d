//! RedPath query engine.
//!
//! Compiles declarative queries over a hierarchical resource graph into
//! immutable execution plans and runs them with per-run fetch deduplication,
//! branch-local failure handling and nested, typed results.

#![warn(missing_docs)]

pub mod engine;
/// Run-level errors.
pub mod error;
pub mod graph;
pub mod normalize;
pub mod query;

pub use engine::{EngineConfig, EngineOptions, QueryEngine};
pub use error::{EngineError, EngineErrorWithCode, Result};
pub use graph::{FetchError, GetParams, JsonMockup, Resource, ResourceAccessor};
pub use query::{QueryDefinition, QueryResult, Status, StatusCode, SubqueryDefinition};
