//! Envelope codec error types.

use thiserror::Error;

/// Result type for envelope operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by the envelope codec and key handles.
///
/// `DecryptionFailed`, `SignerNotFound` and `SignatureVerificationFailed`
/// all mean wrong keys or tampered data and must reach the caller unchanged.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("signer not found: {0}")]
    SignerNotFound(String),

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CryptoError {
    /// Returns true for the errors that indicate wrong keys or tampering.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            CryptoError::DecryptionFailed(_)
                | CryptoError::SignerNotFound(_)
                | CryptoError::SignatureVerificationFailed
        )
    }
}
