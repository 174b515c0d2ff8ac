//! Error types for storage operations.

use crate::types::{CollectionId, TransactionId};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The named database does not exist.
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// The named collection does not exist in the database.
    #[error("collection not found: {database}/{name}")]
    CollectionNotFound {
        /// Database searched.
        database: String,
        /// Collection name.
        name: String,
    },

    /// No collection with this id exists in the engine.
    #[error("unknown collection id {0}")]
    UnknownCollection(CollectionId),

    /// A database or collection with this name already exists.
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// The snapshot backing a cursor is no longer readable.
    #[error("snapshot released or invalidated")]
    SnapshotReleased,

    /// Internal state is inconsistent.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Operation not permitted in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The transaction was already finished.
    #[error("transaction {0} is no longer active")]
    TransactionFinished(TransactionId),
}

impl StorageError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Creates a collection-not-found error.
    pub fn collection_not_found(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self::CollectionNotFound {
            database: database.into(),
            name: name.into(),
        }
    }

    /// Returns true if the error means a snapshot can no longer be used.
    #[must_use]
    pub fn is_snapshot_invalid(&self) -> bool {
        matches!(self, Self::SnapshotReleased | Self::Corrupted(_))
    }

    /// Returns true if the error reports a missing database or collection.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DatabaseNotFound(_)
                | Self::CollectionNotFound { .. }
                | Self::UnknownCollection(_)
        )
    }
}
