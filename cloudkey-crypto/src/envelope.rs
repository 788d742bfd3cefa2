//! Sign-then-encrypt envelope codec.
//!
//! Every value stored remotely is an envelope: a JSON header (`meta`) and a
//! ciphertext. The plaintext is signed with the author's Ed25519 key, then
//! encrypted once with a random content key (ChaCha20-Poly1305). The content
//! key is sealed separately for each recipient using X25519 key exchange +
//! XSalsa20-Poly1305 with an ephemeral keypair.
//!
//! The signer's key id and the signature travel as custom parameters in the
//! header. The serialized header is the AEAD associated data, so any change
//! to it (recipient slots, signer id, signature) fails decryption.
//!
//! Decryption checks, in order: the recipient can unwrap and decrypt, the
//! signer is one of the trusted verifiers, and the signature matches the
//! recovered plaintext. Only then is the plaintext returned.

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{KeyId, PrivateKey, PublicKey};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::ChaCha20Poly1305;
use crypto_box::SalsaBox;
use ed25519_dalek::{Signature, Signer, Verifier};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// Header format version written by [`encrypt`].
pub const ENVELOPE_VERSION: u8 = 1;

/// Custom header parameter holding the signer's key id.
pub const SIGNER_ID_PARAM: &str = "signer_id";

/// Custom header parameter holding the Ed25519 signature over the plaintext.
pub const SIGNATURE_PARAM: &str = "signature";

const CONTENT_KEY_SIZE: usize = 32;
const CONTENT_NONCE_SIZE: usize = 12;

/// A signed, multi-recipient envelope: header plus ciphertext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub meta: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Content key sealed for one recipient's X25519 public key.
///
/// Uses ephemeral X25519 key exchange + XSalsa20-Poly1305. The ephemeral
/// public key is included so the recipient can reconstruct the shared secret.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedKey {
    /// Ephemeral X25519 public key (sender side of DH).
    pub ephemeral_public_key: [u8; 32],
    /// XSalsa20 nonce (24 bytes).
    pub nonce: [u8; 24],
    /// Encrypted content key (ciphertext + Poly1305 tag), base64 in JSON.
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecipientSlot {
    key_id: KeyId,
    sealed: SealedKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHeader {
    version: u8,
    nonce: [u8; CONTENT_NONCE_SIZE],
    recipients: Vec<RecipientSlot>,
    /// Base64-encoded custom parameters (signer id, signature).
    #[serde(default)]
    custom_params: BTreeMap<String, String>,
}

impl EnvelopeHeader {
    fn param(&self, name: &str) -> Option<Vec<u8>> {
        self.custom_params
            .get(name)
            .and_then(|encoded| STANDARD.decode(encoded).ok())
    }
}

/// Signs `plaintext` with `signer` and encrypts it for every key in
/// `recipients`.
///
/// `plaintext` may be empty. `recipients` must not be.
pub fn encrypt(
    plaintext: &[u8],
    signer: &PrivateKey,
    recipients: &[PublicKey],
) -> CryptoResult<Envelope> {
    let signature = signer.signing_key().sign(plaintext);
    seal_envelope(
        plaintext,
        signer_params(signer.id(), &signature.to_bytes()),
        recipients,
    )
}

/// Encrypts `plaintext` under a header that names `claimed_signer` and
/// carries `signature` verbatim. Nothing is signed.
#[cfg(any(test, feature = "testing"))]
pub fn encrypt_with_signature(
    plaintext: &[u8],
    claimed_signer: &PublicKey,
    signature: &[u8],
    recipients: &[PublicKey],
) -> CryptoResult<Envelope> {
    seal_envelope(
        plaintext,
        signer_params(claimed_signer.id(), signature),
        recipients,
    )
}

fn signer_params(signer_id: KeyId, signature: &[u8]) -> BTreeMap<String, String> {
    let mut custom_params = BTreeMap::new();
    custom_params.insert(
        SIGNER_ID_PARAM.to_string(),
        STANDARD.encode(signer_id.as_bytes()),
    );
    custom_params.insert(SIGNATURE_PARAM.to_string(), STANDARD.encode(signature));
    custom_params
}

fn seal_envelope(
    plaintext: &[u8],
    custom_params: BTreeMap<String, String>,
    recipients: &[PublicKey],
) -> CryptoResult<Envelope> {
    if recipients.is_empty() {
        return Err(CryptoError::InvalidArgument(
            "public keys collection must not be empty".to_string(),
        ));
    }

    let mut content_key = Zeroizing::new([0u8; CONTENT_KEY_SIZE]);
    rand::rngs::OsRng.fill_bytes(&mut content_key[..]);
    let mut nonce = [0u8; CONTENT_NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let recipients = recipients
        .iter()
        .map(|pk| {
            Ok(RecipientSlot {
                key_id: pk.id(),
                sealed: seal_key(&content_key[..], pk.encryption_key())?,
            })
        })
        .collect::<CryptoResult<Vec<_>>>()?;

    let header = EnvelopeHeader {
        version: ENVELOPE_VERSION,
        nonce,
        recipients,
        custom_params,
    };
    let meta = serde_json::to_vec(&header)?;

    let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&content_key[..]));
    let ciphertext = cipher
        .encrypt(
            chacha20poly1305::Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &meta,
            },
        )
        .map_err(|e| CryptoError::Encryption(format!("content encryption failed: {e}")))?;

    Ok(Envelope { meta, ciphertext })
}

/// Decrypts an envelope with `key` and verifies its signature against
/// `verifiers`.
///
/// An envelope whose `meta` and `ciphertext` are both empty is the "no data"
/// state and decrypts to an empty plaintext without touching any key.
pub fn decrypt(
    meta: &[u8],
    ciphertext: &[u8],
    key: &PrivateKey,
    verifiers: &[PublicKey],
) -> CryptoResult<Vec<u8>> {
    if meta.is_empty() && ciphertext.is_empty() {
        return Ok(Vec::new());
    }

    if verifiers.is_empty() {
        return Err(CryptoError::InvalidArgument(
            "public keys collection must not be empty".to_string(),
        ));
    }

    let header: EnvelopeHeader = serde_json::from_slice(meta)
        .map_err(|e| CryptoError::DecryptionFailed(format!("malformed envelope header: {e}")))?;

    if header.version != ENVELOPE_VERSION {
        return Err(CryptoError::DecryptionFailed(format!(
            "unsupported envelope version {}",
            header.version
        )));
    }

    let own_id = key.id();
    let slot = header
        .recipients
        .iter()
        .find(|slot| slot.key_id == own_id)
        .ok_or_else(|| {
            CryptoError::DecryptionFailed(format!("no recipient slot for key {own_id}"))
        })?;

    let content_key = Zeroizing::new(open_key(&slot.sealed, key.decryption_key())?);
    if content_key.len() != CONTENT_KEY_SIZE {
        return Err(CryptoError::DecryptionFailed(
            "content key has wrong length".to_string(),
        ));
    }

    let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&content_key[..]));
    let plaintext = cipher
        .decrypt(
            chacha20poly1305::Nonce::from_slice(&header.nonce),
            Payload {
                msg: ciphertext,
                aad: meta,
            },
        )
        .map_err(|_| {
            CryptoError::DecryptionFailed("content open failed (wrong key or tampered data)".to_string())
        })?;

    let signer_id = header
        .param(SIGNER_ID_PARAM)
        .and_then(|bytes| KeyId::from_slice(&bytes))
        .ok_or_else(|| CryptoError::SignerNotFound("envelope carries no signer id".to_string()))?;

    let verifier = verifiers
        .iter()
        .find(|pk| pk.id() == signer_id)
        .ok_or_else(|| {
            CryptoError::SignerNotFound(format!("signer's public key {signer_id} not found"))
        })?;

    let signature = header
        .param(SIGNATURE_PARAM)
        .and_then(|bytes| Signature::from_slice(&bytes).ok())
        .ok_or(CryptoError::SignatureVerificationFailed)?;

    verifier
        .verifying_key()
        .verify(&plaintext, &signature)
        .map_err(|_| CryptoError::SignatureVerificationFailed)?;

    Ok(plaintext)
}

/// Seals a content key for a recipient using anonymous envelope encryption.
///
/// An ephemeral X25519 keypair is generated for each seal operation.
fn seal_key(content_key: &[u8], recipient_pk: &crypto_box::PublicKey) -> CryptoResult<SealedKey> {
    let ephemeral = crypto_box::SecretKey::generate(&mut rand::rngs::OsRng);
    let ephemeral_pk = ephemeral.public_key();

    let salsa_box = SalsaBox::new(recipient_pk, &ephemeral);

    let mut nonce_bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce_bytes), content_key)
        .map_err(|e| CryptoError::Encryption(format!("key seal failed: {e}")))?;

    Ok(SealedKey {
        ephemeral_public_key: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens a sealed content key using the recipient's secret key.
fn open_key(sealed: &SealedKey, recipient_sk: &crypto_box::SecretKey) -> CryptoResult<Vec<u8>> {
    let ephemeral_pk = crypto_box::PublicKey::from(sealed.ephemeral_public_key);
    let salsa_box = SalsaBox::new(&ephemeral_pk, recipient_sk);

    salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&sealed.nonce),
            sealed.ciphertext.as_ref(),
        )
        .map_err(|_| {
            CryptoError::DecryptionFailed("key open failed (wrong key or tampered data)".to_string())
        })
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
