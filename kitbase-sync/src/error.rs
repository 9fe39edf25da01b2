//! State sync error types.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while syncing state.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote store rejected or could not complete a request. Recovered
    /// by the engine: local state stays authoritative.
    #[error("remote sync failed: {0}")]
    RemoteSyncFailed(String),

    #[error("local store error: {0}")]
    Local(String),

    #[error("sync engine is not running")]
    EngineStopped,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Returns true for failures that only affect the remote copy.
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::RemoteSyncFailed(_) | SyncError::Http(_))
    }
}
