//! Cloud storage error types.

use cloudkey_crypto::CryptoError;
use thiserror::Error;

/// Result type for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur while talking to the blob service or using the
/// cloud cache.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("server responded with {status}: {message}")]
    Server {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("server returned a tampered value: {0}")]
    TamperedServerResponse(String),

    #[error("no content hash header in server response")]
    InvalidHashHeader,

    #[error("cloud key storage is out of sync")]
    OutOfSync,

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error("entry already exists: {0}")]
    EntryAlreadyExists(String),

    #[error("token provider failed: {0}")]
    Token(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CloudError {
    /// Returns true for a `401 Unauthorized` service response.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CloudError::Server { status: 401, .. })
    }
}
