//! Unified error types for Wicket.
//!
//! All crates map their internal errors into [`SessionError`] for consistent
//! propagation through the ? operator. The variants that callers are expected
//! to catch and handle as ordinary control flow (`NoSuchSession`,
//! `TooLateForCookies`, `InvalidPasswordRecord`) stay distinctly matchable.

use axum::response::Response;
use thiserror::Error;

use crate::types::Mechanism;

/// The unified error used throughout the session subsystem.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session exists for the presented token, or policy forbids
    /// creating one. A recoverable outcome, never a 500-class failure
    /// at this layer.
    #[error("no such session (presented via {mechanism})")]
    NoSuchSession {
        /// How the (absent or invalid) token was transmitted.
        mechanism: Mechanism,
    },

    /// Response writing has already started, so a session cookie can no
    /// longer be set on this request.
    #[error("response already started; too late to set a session cookie")]
    TooLateForCookies,

    /// A stored password record is corrupt or unparseable. Distinct from a
    /// wrong password, which is reported as `Ok(false)` by verification.
    #[error("invalid password record: {0}")]
    InvalidPasswordRecord(String),

    /// A database operation failed.
    #[error("database error: {message}")]
    Database {
        /// Human-readable description of the failed operation.
        message: String,
        /// The underlying driver error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request-scoped transaction was already consumed (committed) when
    /// a store operation tried to use it.
    #[error("request transaction already completed")]
    TransactionCompleted,

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Create a `NoSuchSession` error for the given mechanism.
    pub fn no_such_session(mechanism: Mechanism) -> Self {
        Self::NoSuchSession { mechanism }
    }

    /// Create a database error with an underlying cause.
    pub fn database(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// True when this error is an expected control-flow outcome rather
    /// than a fault.
    pub fn is_policy_outcome(&self) -> bool {
        matches!(self, Self::NoSuchSession { .. } | Self::TooLateForCookies)
    }
}

/// Result alias used across the workspace.
pub type SessionResult<T> = Result<T, SessionError>;

/// Control value that aborts normal handler invocation.
///
/// Not an error in the traditional sense: an injector or prepare hook that
/// produces `Err(EarlyExit)` stops further injector resolution, skips the
/// wrapped handler, and the carried response is used as the request's
/// result instead. Threaded explicitly as a `Result` so the short-circuit
/// is visible in every signature rather than hidden in unwinding.
#[derive(Debug)]
pub struct EarlyExit {
    /// The substitute response.
    pub response: Response,
}

impl EarlyExit {
    /// Wrap a response as an early exit.
    pub fn new(response: Response) -> Self {
        Self { response }
    }
}
