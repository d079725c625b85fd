//! Error types for session operations.

use crate::traits::SessionSnapshot;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
///
/// Malformed or unknown session ids are never errors: they are reported as
/// "no session" so callers cannot tell them apart from expired sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `insert_session` hit a key that is already stored.
    ///
    /// With 144 bits of id entropy this points at a broken random source or
    /// a backend bug, so it is never retried.
    #[error("Session already exists (created at {})", .existing.created_at)]
    SessionAlreadyExists {
        /// Row currently stored under the key
        existing: Box<SessionSnapshot>,
        /// Row the caller tried to insert
        attempted: Box<SessionSnapshot>,
    },

    /// `replace_session` targeted a key that is not stored.
    #[error("Session does not exist (created at {})", .0.created_at)]
    SessionDoesNotExist(Box<SessionSnapshot>),

    /// Text that is not a well-formed session id was converted explicitly.
    #[error("Invalid session ID")]
    InvalidSessionId,

    /// Backend failure, surfaced unmodified
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transaction could not be opened, committed or rolled back
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether the error reports a key conflict in the storage contract.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SessionError::SessionAlreadyExists { .. } | SessionError::SessionDoesNotExist(_)
        )
    }
}
