//! In-process blob service used by tests and offline setups.

use crate::client::RemoteStore;
use crate::error::{CloudError, CloudResult};
use crate::types::{DecryptedValue, EncryptedValue};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

struct BlobState {
    meta: Vec<u8>,
    value: Vec<u8>,
    major: u64,
}

impl BlobState {
    fn content_hash(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&self.meta);
        hasher.update(&self.value);
        hasher.finalize().to_vec()
    }

    fn snapshot(&self) -> EncryptedValue {
        EncryptedValue {
            meta: self.meta.clone(),
            value: self.value.clone(),
            version: format!("{}.0", self.major),
            content_hash: self.content_hash(),
        }
    }
}

/// Blob service held in memory.
///
/// Versions start at "1.0" and every push or reset bumps the major number.
/// The content hash is SHA-256 over meta followed by value. A push whose
/// previous hash does not match answers 409.
pub struct MemoryRemoteStore {
    blob: Mutex<BlobState>,
    rejected_tokens: Mutex<HashSet<String>>,
    requests: AtomicUsize,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            blob: Mutex::new(BlobState {
                meta: Vec::new(),
                value: Vec::new(),
                major: 1,
            }),
            rejected_tokens: Mutex::new(HashSet::new()),
            requests: AtomicUsize::new(0),
        }
    }

    /// Makes every request carrying `token` fail with 401.
    pub async fn reject_token(&self, token: impl Into<String>) {
        self.rejected_tokens.lock().await.insert(token.into());
    }

    /// Number of requests received so far, including rejected ones.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Current blob without going through a request.
    pub async fn current(&self) -> EncryptedValue {
        self.blob.lock().await.snapshot()
    }

    async fn authorize(&self, token: &str) -> CloudResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.rejected_tokens.lock().await.contains(token) {
            return Err(CloudError::Server {
                status: 401,
                code: Some(20300),
                message: "access token is expired".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn push(
        &self,
        meta: &[u8],
        value: &[u8],
        previous_hash: Option<&[u8]>,
        token: &str,
    ) -> CloudResult<EncryptedValue> {
        self.authorize(token).await?;
        let mut blob = self.blob.lock().await;

        if let Some(expected) = previous_hash {
            if expected != blob.content_hash().as_slice() {
                return Err(CloudError::Server {
                    status: 409,
                    code: Some(50010),
                    message: "previous hash does not match current value".to_string(),
                });
            }
        }

        blob.meta = meta.to_vec();
        blob.value = value.to_vec();
        blob.major += 1;
        debug!("memory store now at version {}.0", blob.major);
        Ok(blob.snapshot())
    }

    async fn pull(&self, token: &str) -> CloudResult<EncryptedValue> {
        self.authorize(token).await?;
        Ok(self.blob.lock().await.snapshot())
    }

    async fn reset(&self, token: &str) -> CloudResult<DecryptedValue> {
        self.authorize(token).await?;
        let mut blob = self.blob.lock().await;
        blob.meta.clear();
        blob.value.clear();
        blob.major += 1;
        blob.snapshot().into_reset_value()
    }
}
