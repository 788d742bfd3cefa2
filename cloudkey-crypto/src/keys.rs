//! Key handles and recipient sets for envelope encryption.
//!
//! A single concrete key type is used everywhere: each private key bundles
//! an X25519 secret (decryption) with an Ed25519 signing key, and each public
//! key bundles the matching X25519 public key (encryption) with the Ed25519
//! verifying key. Handles imported from raw bytes are validated here, so the
//! envelope codec never sees a malformed key.

use crate::error::{CryptoError, CryptoResult};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Length of a key identifier in bytes.
pub const KEY_ID_SIZE: usize = 8;

/// Length of a serialized public key (X25519 public ‖ Ed25519 verifying).
pub const PUBLIC_KEY_SIZE: usize = 64;

/// Length of a serialized private key (X25519 secret ‖ Ed25519 secret).
pub const PRIVATE_KEY_SIZE: usize = 64;

/// Short fingerprint identifying a key pair inside envelope headers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId([u8; KEY_ID_SIZE]);

impl KeyId {
    fn derive(encryption: &crypto_box::PublicKey, verifying: &VerifyingKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(encryption.as_bytes());
        hasher.update(verifying.as_bytes());
        let digest = hasher.finalize();

        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&digest[..KEY_ID_SIZE]);
        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_ID_SIZE] {
        &self.0
    }

    /// Parses an identifier embedded in a header, `None` on a length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let id: [u8; KEY_ID_SIZE] = bytes.try_into().ok()?;
        Some(Self(id))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", hex::encode(self.0))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Public half of a key pair: encryption recipient and signature verifier.
#[derive(Clone)]
pub struct PublicKey {
    encryption: crypto_box::PublicKey,
    verifying: VerifyingKey,
    id: KeyId,
}

impl PublicKey {
    fn new(encryption: crypto_box::PublicKey, verifying: VerifyingKey) -> Self {
        let id = KeyId::derive(&encryption, &verifying);
        Self {
            encryption,
            verifying,
            id,
        }
    }

    pub fn id(&self) -> KeyId {
        self.id
    }

    pub(crate) fn encryption_key(&self) -> &crypto_box::PublicKey {
        &self.encryption
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    /// Serializes the key as `x25519_public ‖ ed25519_public`.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out[..32].copy_from_slice(self.encryption.as_bytes());
        out[32..].copy_from_slice(self.verifying.as_bytes());
        out
    }

    /// Imports a key serialized with [`PublicKey::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidArgument(format!(
                "public key must be {PUBLIC_KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut enc = [0u8; 32];
        enc.copy_from_slice(&bytes[..32]);
        let mut ver = [0u8; 32];
        ver.copy_from_slice(&bytes[32..]);

        let verifying = VerifyingKey::from_bytes(&ver)
            .map_err(|e| CryptoError::InvalidArgument(format!("invalid verifying key: {e}")))?;

        Ok(Self::new(crypto_box::PublicKey::from(enc), verifying))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey").field("id", &self.id).finish()
    }
}

/// Private half of a key pair: decryption key and signer.
///
/// The X25519 secret zeroizes on drop (from crypto_box), as does the
/// Ed25519 signing key.
pub struct PrivateKey {
    encryption: crypto_box::SecretKey,
    signing: SigningKey,
    public: PublicKey,
}

impl PrivateKey {
    fn new(encryption: crypto_box::SecretKey, signing: SigningKey) -> Self {
        let public = PublicKey::new(encryption.public_key(), signing.verifying_key());
        Self {
            encryption,
            signing,
            public,
        }
    }

    /// Generates a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        let encryption = crypto_box::SecretKey::generate(&mut rand::rngs::OsRng);
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        Self::new(encryption, signing)
    }

    pub fn id(&self) -> KeyId {
        self.public.id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn decryption_key(&self) -> &crypto_box::SecretKey {
        &self.encryption
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    /// Serializes the key as `x25519_secret ‖ ed25519_secret`.
    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_SIZE]> {
        let mut out = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);
        out[..32].copy_from_slice(&self.encryption.to_bytes());
        out[32..].copy_from_slice(&self.signing.to_bytes());
        out
    }

    /// Imports a key serialized with [`PrivateKey::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != PRIVATE_KEY_SIZE {
            return Err(CryptoError::InvalidArgument(format!(
                "private key must be {PRIVATE_KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut enc = Zeroizing::new([0u8; 32]);
        enc.copy_from_slice(&bytes[..32]);
        let mut sig = Zeroizing::new([0u8; 32]);
        sig.copy_from_slice(&bytes[32..]);

        Ok(Self::new(
            crypto_box::SecretKey::from(*enc),
            SigningKey::from_bytes(&sig),
        ))
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        Self {
            encryption: crypto_box::SecretKey::from(self.encryption.to_bytes()),
            signing: self.signing.clone(),
            public: self.public.clone(),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("id", &self.public.id)
            .finish_non_exhaustive()
    }
}

/// The public keys a blob is encrypted for, plus the private key used to
/// decrypt it and to sign new content.
///
/// Immutable once built; rotation produces a new set.
#[derive(Clone, Debug)]
pub struct RecipientSet {
    public_keys: Vec<PublicKey>,
    private_key: PrivateKey,
}

impl RecipientSet {
    pub fn new(public_keys: Vec<PublicKey>, private_key: PrivateKey) -> CryptoResult<Self> {
        if public_keys.is_empty() {
            return Err(CryptoError::InvalidArgument(
                "public keys collection must not be empty".to_string(),
            ));
        }
        Ok(Self {
            public_keys,
            private_key,
        })
    }

    /// Shortcut for a set whose only recipient is the private key's own pair.
    pub fn single(private_key: PrivateKey) -> Self {
        Self {
            public_keys: vec![private_key.public_key().clone()],
            private_key,
        }
    }

    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Builds the set that results from replacing either half. Omitted
    /// halves are carried over from `self`.
    pub fn rotated(
        &self,
        new_public_keys: Option<Vec<PublicKey>>,
        new_private_key: Option<PrivateKey>,
    ) -> CryptoResult<Self> {
        Self::new(
            new_public_keys.unwrap_or_else(|| self.public_keys.clone()),
            new_private_key.unwrap_or_else(|| self.private_key.clone()),
        )
    }
}
