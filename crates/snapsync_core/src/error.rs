//! Error types for the replication core.

use crate::session::SessionId;
use snapsync_protocol::ProtocolError;
use snapsync_storage::StorageError;
use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors surfaced by replication operations.
///
/// Partial results (a tail or fetch cut short by its byte budget) are not
/// errors; they are complete responses carrying continuation metadata.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Malformed request parameters. Not retryable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown or expired session, unknown collection, unknown chunk.
    /// The caller must restart the corresponding sub-protocol.
    #[error("not found: {0}")]
    NotFound(String),

    /// The session is checked out by another caller. Retry with backoff.
    #[error("session {0} is busy")]
    Busy(SessionId),

    /// The storage engine failed; the session stays usable.
    #[error("engine failure: {0}")]
    Engine(StorageError),

    /// The engine reports the session's snapshot itself as unusable.
    #[error("snapshot invalid: {0}")]
    SnapshotInvalid(StorageError),

    /// A response could not be encoded.
    #[error("encoding failure: {0}")]
    Encoding(String),
}

impl ReplicationError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates the not found error for a missing or expired session.
    pub fn session_not_found(id: SessionId) -> Self {
        Self::NotFound(format!("session {id} not found or expired"))
    }

    /// Returns true if retrying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::Engine(_))
    }

    /// Returns true for not-found conditions.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if the session that produced this error must be removed.
    #[must_use]
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Self::SnapshotInvalid(_))
    }
}

impl From<StorageError> for ReplicationError {
    fn from(err: StorageError) -> Self {
        if err.is_snapshot_invalid() {
            Self::SnapshotInvalid(err)
        } else if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else {
            Self::Engine(err)
        }
    }
}

impl From<ProtocolError> for ReplicationError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidValue { .. } | ProtocolError::Decode(_) => {
                Self::InvalidArgument(err.to_string())
            }
            ProtocolError::Encode(message) => Self::Encoding(message),
        }
    }
}
