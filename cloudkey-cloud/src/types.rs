//! Core types for the remote blob and the entries stored inside it.

use crate::error::{CloudError, CloudResult};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Free-form string metadata attached to a key entry.
pub type EntryMeta = BTreeMap<String, String>;

/// Blob as stored by the service: envelope header plus ciphertext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedValue {
    pub meta: Vec<u8>,
    pub value: Vec<u8>,
    /// Server-assigned version string ("1.0", "2.0", ...).
    pub version: String,
    /// Opaque content hash used for optimistic concurrency.
    pub content_hash: Vec<u8>,
}

impl EncryptedValue {
    /// True when the service holds no data.
    pub fn is_empty(&self) -> bool {
        self.meta.is_empty() && self.value.is_empty()
    }

    /// Converts a reset response into its decrypted form.
    ///
    /// A reset must leave the blob empty; anything else means the
    /// response was altered in transit or by the server.
    pub fn into_reset_value(self) -> CloudResult<DecryptedValue> {
        if !self.meta.is_empty() || !self.value.is_empty() {
            return Err(CloudError::TamperedServerResponse(
                "reset response carries data".to_string(),
            ));
        }
        Ok(DecryptedValue {
            meta: Vec::new(),
            value: BlobContent::Empty,
            version: self.version,
            content_hash: self.content_hash,
        })
    }
}

/// Plaintext side of a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobContent {
    /// The service holds nothing.
    Empty,
    /// Decrypted bytes (possibly zero-length when an empty value was pushed).
    Present(Vec<u8>),
}

impl BlobContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            BlobContent::Empty => &[],
            BlobContent::Present(bytes) => bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// A blob after envelope decryption and signature verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedValue {
    /// Envelope header, kept as received.
    pub meta: Vec<u8>,
    pub value: BlobContent,
    pub version: String,
    pub content_hash: Vec<u8>,
}

impl DecryptedValue {
    /// Pairs decrypted plaintext with the encrypted value it came from.
    pub fn from_encrypted(encrypted: EncryptedValue, plaintext: Vec<u8>) -> Self {
        let value = if encrypted.is_empty() {
            BlobContent::Empty
        } else {
            BlobContent::Present(plaintext)
        };
        Self {
            meta: encrypted.meta,
            value,
            version: encrypted.version,
            content_hash: encrypted.content_hash,
        }
    }

    /// True for the "no data" state: header and plaintext both empty.
    ///
    /// A signed empty plaintext has a header and is not empty.
    pub fn is_empty(&self) -> bool {
        self.meta.is_empty() && self.value.is_empty()
    }
}

/// A key entry submitted for storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub meta: EntryMeta,
}

impl KeyEntry {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            meta: EntryMeta::new(),
        }
    }

    pub fn with_meta(mut self, meta: EntryMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// A key entry as held in the cloud blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudEntry {
    pub name: String,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub creation_date: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub modification_date: DateTime<Utc>,
    #[serde(default)]
    pub meta: EntryMeta,
}

impl CloudEntry {
    /// Creates an entry stamped with the current time.
    pub fn stamped(entry: KeyEntry) -> Self {
        let now = now();
        Self {
            name: entry.name,
            data: entry.data,
            creation_date: now,
            modification_date: now,
            meta: entry.meta,
        }
    }
}

/// Current time at millisecond precision, matching the serialized form.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Serializes entries as a JSON object keyed by entry name.
pub fn serialize_entries<'a>(
    entries: impl IntoIterator<Item = &'a CloudEntry>,
) -> CloudResult<Vec<u8>> {
    let map: BTreeMap<&str, &CloudEntry> = entries
        .into_iter()
        .map(|entry| (entry.name.as_str(), entry))
        .collect();
    Ok(serde_json::to_vec(&map)?)
}

/// Parses a name-keyed JSON object back into entries. Empty input yields
/// no entries.
pub fn deserialize_entries(bytes: &[u8]) -> CloudResult<Vec<CloudEntry>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let map: HashMap<String, CloudEntry> = serde_json::from_slice(bytes)?;
    Ok(map.into_values().collect())
}

pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
