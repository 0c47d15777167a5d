use thiserror::Error;

use crate::engine::config::ConfigError;
use crate::graph::FetchError;
use crate::query::errors::PlanError;

/// Result alias for engine-level operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that abort a whole query run or engine construction.
///
/// Per-subquery failures never show up here; they are reported through the
/// status of the affected subquery output.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The service root could not be fetched, so no subquery can run.
    #[error("root fetch failed: {0}")]
    RootFetch(#[from] FetchError),
    /// A query definition failed to compile.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// No compiled plan exists for the requested query id.
    #[error("unknown query `{0}`")]
    UnknownQuery(String),
    /// Configuration or query file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::RootFetch(_) => "RootFetch",
            EngineError::Plan(err) => err.code(),
            EngineError::UnknownQuery(_) => "UnknownQuery",
            EngineError::Config(_) => "Config",
        }
    }
}

/// Display wrapper printing `[Code] message`.
pub struct EngineErrorWithCode<'a>(pub &'a EngineError);

impl std::fmt::Display for EngineErrorWithCode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
