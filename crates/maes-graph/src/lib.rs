//! Microsoft Graph client factory
//!
//! OAuth2 client-credentials token acquisition (secret and certificate
//! assertion), per-tenant token caching, a thin authenticated request
//! surface over Graph, and the four-probe capability report.

pub mod client;
pub mod factory;
pub mod probe;
pub mod testing;
pub mod token;

use maes_common::{AuthCause, CoreError};
use thiserror::Error;

pub use client::{GraphApi, GraphClient, GRAPH_BASE, MAX_ATTEMPTS};
pub use factory::GraphClientFactory;
pub use probe::{test_connection, CapabilityReport, ProbeOutcome};

/// Errors surfaced by the Graph layer
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    /// Token endpoint rejected the credentials
    #[error("auth error: {message}")]
    Auth {
        /// Cause class parsed from the token endpoint response
        cause: AuthCause,
        message: String,
    },

    /// Graph kept answering 401 after a forced token refresh
    #[error("token expired")]
    TokenExpired,

    /// 429 responses exhausted the retry budget
    #[error("rate limited")]
    RateLimited,

    /// Network failure or 5xx after retries
    #[error("transient IO: {0}")]
    Transient(String),

    /// Non-retryable HTTP failure from Graph
    #[error("graph request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// The run's cancellation token fired
    #[error("cancelled")]
    Cancelled,

    /// Response body was not the JSON we expected
    #[error("decode error: {0}")]
    Decode(String),
}

impl GraphError {
    /// Auth error constructor.
    pub fn auth(cause: AuthCause, message: impl Into<String>) -> Self {
        GraphError::Auth { cause, message: message.into() }
    }
}

impl From<GraphError> for CoreError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Auth { cause, message } => CoreError::Auth { cause, message },
            GraphError::TokenExpired => CoreError::TokenExpired,
            GraphError::RateLimited => CoreError::RateLimited,
            GraphError::Transient(m) => CoreError::TransientIo(m),
            GraphError::Cancelled => CoreError::Internal("cancelled".into()),
            GraphError::Status { status, body } => {
                CoreError::Checker(format!("graph returned {status}: {body}"))
            }
            GraphError::Decode(m) => CoreError::Checker(format!("bad graph payload: {m}")),
        }
    }
}
