use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport status a fetch failure was classified as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Caller lacks rights to read the resource.
    PermissionDenied,
    /// Transport deadline or timeout elapsed.
    DeadlineExceeded,
    /// Resource does not exist.
    NotFound,
    /// Credentials missing or rejected.
    Unauthenticated,
    /// Any other server or transport failure.
    Internal,
    /// Endpoint does not implement the request.
    Unimplemented,
}

impl ErrorCode {
    /// Stable snake_case spelling, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::DeadlineExceeded => "deadline_exceeded",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::Internal => "internal",
            ErrorCode::Unimplemented => "unimplemented",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by a resource accessor, already mapped to an [`ErrorCode`].
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct FetchError {
    /// Classified transport status.
    pub code: ErrorCode,
    /// Message from the transport, preserved verbatim.
    pub message: String,
}

impl FetchError {
    /// Builds an error with an explicit code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `not_found` for a resource id.
    pub fn not_found(id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("resource '{id}' not found"))
    }

    /// `permission_denied` with a message.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// `deadline_exceeded` with a message.
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeadlineExceeded, message)
    }

    /// `internal` with a message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Returns a machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        self.code.as_str()
    }
}
