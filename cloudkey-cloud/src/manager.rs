//! Encrypt-push / pull-decrypt over a [`RemoteStore`].
//!
//! The manager owns the active recipient set. Every value leaving the
//! process is sealed for those recipients and signed by the private key;
//! every value coming back is verified against them. Push responses must
//! echo the exact header and ciphertext that were sent.

use crate::client::RemoteStore;
use crate::error::{CloudError, CloudResult};
use crate::token::{TokenContext, TokenOperation, TokenProvider};
use crate::types::{DecryptedValue, EncryptedValue};
use cloudkey_crypto::envelope::{self, Envelope};
use cloudkey_crypto::{PrivateKey, PublicKey, RecipientSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How the manager reacts to a 401 from the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_on_unauthorized: bool,
}

impl RetryPolicy {
    pub fn retry_on_unauthorized() -> Self {
        Self {
            retry_on_unauthorized: true,
        }
    }

    /// Runs `op(false)`, then `op(true)` once if the first attempt was
    /// rejected as unauthorized and retries are enabled.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> CloudResult<T>
    where
        F: FnMut(bool) -> Fut,
        Fut: Future<Output = CloudResult<T>>,
    {
        match op(false).await {
            Err(e) if self.retry_on_unauthorized && e.is_unauthorized() => {
                warn!("request unauthorized, retrying with a fresh token");
                op(true).await
            }
            other => other,
        }
    }
}

/// Pushes and pulls the encrypted blob on behalf of one identity.
pub struct SyncManager {
    store: Arc<dyn RemoteStore>,
    tokens: Arc<dyn TokenProvider>,
    recipients: RwLock<Arc<RecipientSet>>,
    retry: RetryPolicy,
}

impl SyncManager {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        tokens: Arc<dyn TokenProvider>,
        recipients: RecipientSet,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            tokens,
            recipients: RwLock::new(Arc::new(recipients)),
            retry,
        }
    }

    /// Snapshot of the active recipient set.
    pub async fn recipients(&self) -> Arc<RecipientSet> {
        self.recipients.read().await.clone()
    }

    /// Encrypts `plaintext`, pushes it and returns the decrypted echo.
    pub async fn push_value(
        &self,
        plaintext: &[u8],
        previous_hash: Option<&[u8]>,
    ) -> CloudResult<DecryptedValue> {
        let recipients = self.recipients().await;
        self.push_with(plaintext, previous_hash, &recipients).await
    }

    /// Pulls and decrypts the current blob.
    pub async fn pull_value(&self) -> CloudResult<DecryptedValue> {
        let recipients = self.recipients().await;
        let pulled = self.retry.run(move |force| self.pull_once(force)).await?;
        debug!("pulled version {}", pulled.version);
        open(pulled, &recipients)
    }

    /// Empties the blob on the service.
    pub async fn reset_value(&self) -> CloudResult<DecryptedValue> {
        let reset = self.retry.run(move |force| self.reset_once(force)).await?;
        if !reset.meta.is_empty() || !reset.value.is_empty() {
            return Err(CloudError::TamperedServerResponse(
                "reset response carries data".to_string(),
            ));
        }
        info!("reset cloud blob to version {}", reset.version);
        Ok(reset)
    }

    /// Re-encrypts the current blob for a new recipient set.
    ///
    /// The blob is pulled and decrypted with the current keys. An empty
    /// blob is returned unchanged. Otherwise it is pushed back sealed for
    /// the new set, and the new set becomes active once the push succeeds.
    pub async fn rotate_recipients(
        &self,
        new_public_keys: Option<Vec<PublicKey>>,
        new_private_key: Option<PrivateKey>,
    ) -> CloudResult<DecryptedValue> {
        let current = self.recipients().await;
        let next = current.rotated(new_public_keys, new_private_key)?;

        let pulled = self.retry.run(move |force| self.pull_once(force)).await?;
        let decrypted = open(pulled, &current)?;
        if decrypted.is_empty() {
            debug!("blob is empty, nothing to re-encrypt");
            return Ok(decrypted);
        }

        self.commit_rotation(
            decrypted.value.as_bytes(),
            Some(decrypted.content_hash.as_slice()),
            next,
        )
        .await
    }

    /// Re-encrypts a known plaintext for a new recipient set without
    /// pulling first.
    pub async fn rotate_recipients_with(
        &self,
        plaintext: &[u8],
        previous_hash: Option<&[u8]>,
        new_public_keys: Option<Vec<PublicKey>>,
        new_private_key: Option<PrivateKey>,
    ) -> CloudResult<DecryptedValue> {
        let next = self
            .recipients()
            .await
            .rotated(new_public_keys, new_private_key)?;
        self.commit_rotation(plaintext, previous_hash, next).await
    }

    async fn commit_rotation(
        &self,
        plaintext: &[u8],
        previous_hash: Option<&[u8]>,
        next: RecipientSet,
    ) -> CloudResult<DecryptedValue> {
        let next = Arc::new(next);
        let pushed = self.push_with(plaintext, previous_hash, &next).await?;
        *self.recipients.write().await = next;
        info!("rotated recipients, blob now at version {}", pushed.version);
        Ok(pushed)
    }

    async fn push_with(
        &self,
        plaintext: &[u8],
        previous_hash: Option<&[u8]>,
        recipients: &RecipientSet,
    ) -> CloudResult<DecryptedValue> {
        let sealed = envelope::encrypt(
            plaintext,
            recipients.private_key(),
            recipients.public_keys(),
        )?;
        let sealed = &sealed;
        let pushed = self
            .retry
            .run(move |force| self.push_once(sealed, previous_hash, force))
            .await?;

        verify_echo(sealed, &pushed)?;
        debug!("pushed version {}", pushed.version);
        open(pushed, recipients)
    }

    async fn push_once(
        &self,
        sealed: &Envelope,
        previous_hash: Option<&[u8]>,
        force_reload: bool,
    ) -> CloudResult<EncryptedValue> {
        let token = self.token(TokenOperation::Put, force_reload).await?;
        self.store
            .push(&sealed.meta, &sealed.ciphertext, previous_hash, &token)
            .await
    }

    async fn pull_once(&self, force_reload: bool) -> CloudResult<EncryptedValue> {
        let token = self.token(TokenOperation::Get, force_reload).await?;
        self.store.pull(&token).await
    }

    async fn reset_once(&self, force_reload: bool) -> CloudResult<DecryptedValue> {
        let token = self.token(TokenOperation::Delete, force_reload).await?;
        self.store.reset(&token).await
    }

    async fn token(&self, operation: TokenOperation, force_reload: bool) -> CloudResult<String> {
        self.tokens
            .get_token(&TokenContext::new(operation, force_reload))
            .await
    }
}

fn verify_echo(sent: &Envelope, received: &EncryptedValue) -> CloudResult<()> {
    if received.meta != sent.meta {
        return Err(CloudError::TamperedServerResponse(
            "meta differs from pushed value".to_string(),
        ));
    }
    if received.value != sent.ciphertext {
        return Err(CloudError::TamperedServerResponse(
            "value differs from pushed value".to_string(),
        ));
    }
    Ok(())
}

fn open(encrypted: EncryptedValue, recipients: &RecipientSet) -> CloudResult<DecryptedValue> {
    let plaintext = envelope::decrypt(
        &encrypted.meta,
        &encrypted.value,
        recipients.private_key(),
        recipients.public_keys(),
    )?;
    Ok(DecryptedValue::from_encrypted(encrypted, plaintext))
}
