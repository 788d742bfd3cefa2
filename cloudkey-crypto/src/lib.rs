//! Envelope encryption layer for cloudkey.
//!
//! Provides the sign-then-encrypt codec used for every value exchanged with
//! the remote blob store:
//! - Ed25519 signatures binding authorship to the plaintext
//! - ChaCha20-Poly1305 content encryption, header bound as associated data
//! - X25519 + XSalsa20-Poly1305 content-key sealing per recipient
//!
//! # Architecture
//!
//! A blob is encrypted once and readable by any number of recipients:
//!
//! 1. **Content Key**: random per envelope, never stored in the clear.
//!
//! 2. **Recipient Slots**: the content key sealed for each recipient's
//!    public key, tagged with the recipient's [`KeyId`].
//!
//! The signer does not have to be a recipient, and the recipient that
//! decrypts does not have to be the signer. Verification only requires the
//! signer's public key to be among the caller's trusted verifiers.

pub mod envelope;
mod error;
mod keys;

pub use envelope::{decrypt, encrypt, Envelope, SealedKey, ENVELOPE_VERSION};
pub use error::{CryptoError, CryptoResult};
pub use keys::{
    KeyId, PrivateKey, PublicKey, RecipientSet, KEY_ID_SIZE, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE,
};
