//! Error taxonomy for the compliance core

use thiserror::Error;

use crate::model::Benchmark;

/// Cause class attached to authentication failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthCause {
    /// PEM material was malformed or the key did not match
    CertificateInvalid,
    /// The directory tenant does not exist
    TenantNotFound,
    /// Admin consent for the application is missing
    ConsentMissing,
    /// Client id or secret rejected
    InvalidClient,
    /// Anything the token endpoint did not classify
    Unknown,
}

/// Core error type
///
/// Every variant surfaces with a stable machine code via [`CoreError::code`].
#[derive(Error, Debug)]
pub enum CoreError {
    /// Token acquisition or Graph authentication failed
    #[error("auth error: {message}")]
    Auth {
        /// Cause class from the token endpoint
        cause: AuthCause,
        /// Human-readable detail
        message: String,
    },

    /// Access token rejected after a forced refresh
    #[error("token expired")]
    TokenExpired,

    /// Graph returned 429 and retries were exhausted
    #[error("rate limited by graph")]
    RateLimited,

    /// 5xx or network failure after retries
    #[error("transient IO: {0}")]
    TransientIo(String),

    /// Failure inside a checker; recorded on the control result
    #[error("checker error: {0}")]
    Checker(String),

    /// Benchmark resolved to zero active controls
    #[error("empty benchmark: {0}")]
    EmptyBenchmark(Benchmark),

    /// Operation requires a completed assessment
    #[error("not ready: {0}")]
    NotReady(String),

    /// Entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or invalid service token
    #[error("unauthorized")]
    Unauthorized,

    /// Duplicate entity
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid request shape or parameters
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Unclassified infrastructure failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine code for API payloads and logs.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Auth { .. } => "AUTH_ERROR",
            CoreError::TokenExpired => "TOKEN_EXPIRED",
            CoreError::RateLimited => "RATE_LIMITED",
            CoreError::TransientIo(_) => "TRANSIENT_IO",
            CoreError::Checker(_) => "CHECKER_ERROR",
            CoreError::EmptyBenchmark(_) => "EMPTY_BENCHMARK",
            CoreError::NotReady(_) => "NOT_READY",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Unauthorized => "UNAUTHORIZED",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::Invalid(_) => "INVALID_REQUEST",
            CoreError::Internal(_) => "INTERNAL",
        }
    }

    /// Auth error constructor.
    pub fn auth(cause: AuthCause, message: impl Into<String>) -> Self {
        CoreError::Auth { cause, message: message.into() }
    }
}

/// Result type for the compliance core
pub type CoreResult<T> = Result<T, CoreError>;
