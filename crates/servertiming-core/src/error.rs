//! Shared error type across servertiming crates.

use thiserror::Error;

/// Stable error codes (used in logs and HTTP error bodies).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Metric lifecycle misuse (start/end ordering, preset metrics).
    InvalidState,
    /// Metric already registered into a different collection.
    OwnershipConflict,
    /// Storage used outside of a bound request scope.
    UnboundContext,
    /// Invalid configuration.
    BadConfig,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::OwnershipConflict => "OWNERSHIP_CONFLICT",
            ErrorCode::UnboundContext => "UNBOUND_CONTEXT",
            ErrorCode::BadConfig => "BAD_CONFIG",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, TimingsError>;

/// Unified error type used by core and http.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimingsError {
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("metric `{0}` already belongs to another collection")]
    OwnershipConflict(String),
    #[error("no timing scope is bound for the current execution context")]
    UnboundContext,
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl TimingsError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            TimingsError::InvalidState(_) => ErrorCode::InvalidState,
            TimingsError::OwnershipConflict(_) => ErrorCode::OwnershipConflict,
            TimingsError::UnboundContext => ErrorCode::UnboundContext,
            TimingsError::BadConfig(_) => ErrorCode::BadConfig,
            TimingsError::Internal(_) => ErrorCode::Internal,
        }
    }
}
