//! CLI error type.

use snapsync_server::ServerError;
use snapsync_storage::StorageError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// Reading the fixture failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The fixture or an output could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Loading the fixture into the engine failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A replication request failed.
    #[error("request failed ({}): {0}", .0.status_code())]
    Server(#[from] ServerError),

    /// Bad command-line usage.
    #[error("{0}")]
    Usage(String),
}
