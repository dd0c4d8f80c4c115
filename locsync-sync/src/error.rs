//! Error types for locsync-sync.

use thiserror::Error;

use locsync_core::StoreError;

/// Errors that abort a whole operation. Per-target failures are recorded in
/// reports instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blocking file task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Task(err.to_string())
    }
}
