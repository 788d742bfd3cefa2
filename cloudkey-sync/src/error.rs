//! Reconciler error types.

use cloudkey_cloud::CloudError;
use thiserror::Error;

/// Result type for reconciler and keychain operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("keychain entry already exists: {0}")]
    KeychainEntryAlreadyExists(String),

    #[error("cloud entry already exists: {0}")]
    CloudEntryAlreadyExists(String),

    #[error("keychain entry not found: {0}")]
    KeychainEntryNotFound(String),

    #[error("cloud entry not found: {0}")]
    CloudEntryNotFound(String),

    #[error("keychain and cloud disagree: {0}")]
    InconsistentState(String),

    #[error("invalid keychain entry meta: {0}")]
    InvalidEntryMeta(String),

    #[error("keychain storage error: {0}")]
    Storage(String),
}
