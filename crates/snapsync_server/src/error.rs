//! Error types for the replication server.

use snapsync_core::ReplicationError;
use snapsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned by request handlers.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Failure of a replication operation.
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// HTTP-style status code of the error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::Replication(err) => match err {
                ReplicationError::InvalidArgument(_) => 400,
                ReplicationError::NotFound(_) => 404,
                ReplicationError::Busy(_) => 409,
                ReplicationError::Engine(_)
                | ReplicationError::SnapshotInvalid(_)
                | ReplicationError::Encoding(_) => 500,
            },
            ServerError::Internal(_) => 500,
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        Self::Replication(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsync_core::SessionId;
    use snapsync_storage::StorageError;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        let busy = ServerError::from(ReplicationError::Busy(SessionId::new(3)));
        assert_eq!(busy.status_code(), 409);
        assert!(busy.is_client_error());

        let missing = ServerError::from(ReplicationError::not_found("session 3"));
        assert_eq!(missing.status_code(), 404);

        let engine = ServerError::from(ReplicationError::from(StorageError::Corrupted(
            "bad page".into(),
        )));
        assert_eq!(engine.status_code(), 500);
        assert!(engine.is_server_error());
    }

    #[test]
    fn protocol_errors_are_bad_requests() {
        let err = ServerError::from(ProtocolError::invalid_value("type", "rows"));
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("rows"));
    }
}
