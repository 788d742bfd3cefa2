//! Named key entries kept in the cloud blob.
//!
//! The cache holds the decrypted entry map together with the last value
//! received from the service. Mutations build a new map, push it with the
//! last known content hash and then adopt whatever the service echoed.
//! Nothing is read or written before a first successful sync.

use crate::error::{CloudError, CloudResult};
use crate::manager::SyncManager;
use crate::types::{
    deserialize_entries, now, serialize_entries, CloudEntry, DecryptedValue, EntryMeta, KeyEntry,
};
use cloudkey_crypto::{PrivateKey, PublicKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CloudEntry>,
    last_sync: Option<DecryptedValue>,
}

impl CacheState {
    fn synced(&self) -> CloudResult<&DecryptedValue> {
        self.last_sync.as_ref().ok_or(CloudError::OutOfSync)
    }

    fn entry(&self, name: &str) -> CloudResult<&CloudEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| CloudError::EntryNotFound(name.to_string()))
    }

    /// Replaces the map with the entries carried by `value`.
    fn adopt(&mut self, value: DecryptedValue) -> CloudResult<()> {
        let entries = deserialize_entries(value.value.as_bytes())?;
        self.entries = entries
            .into_iter()
            .map(|entry| (entry.name.clone(), entry))
            .collect();
        debug!(
            "cache holds {} entries at version {} ({})",
            self.entries.len(),
            value.version,
            hex::encode(&value.content_hash)
        );
        self.last_sync = Some(value);
        Ok(())
    }
}

/// Cloud-backed store of named key entries.
pub struct CloudKeyCache {
    manager: Arc<SyncManager>,
    state: Mutex<CacheState>,
}

impl CloudKeyCache {
    pub fn new(manager: Arc<SyncManager>) -> Self {
        Self {
            manager,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn manager(&self) -> &Arc<SyncManager> {
        &self.manager
    }

    /// True once a pull, push or reset has succeeded.
    pub async fn is_synced(&self) -> bool {
        self.state.lock().await.last_sync.is_some()
    }

    // ── Writes ──

    /// Stores new entries. Fails without pushing if any name is taken.
    pub async fn store(&self, new_entries: Vec<KeyEntry>) -> CloudResult<Vec<CloudEntry>> {
        let mut state = self.state.lock().await;
        let previous_hash = state.synced()?.content_hash.clone();

        let mut seen = HashSet::new();
        for entry in &new_entries {
            if state.entries.contains_key(&entry.name) || !seen.insert(entry.name.as_str()) {
                return Err(CloudError::EntryAlreadyExists(entry.name.clone()));
            }
        }

        let names: Vec<String> = new_entries.iter().map(|e| e.name.clone()).collect();
        let mut next = state.entries.clone();
        for entry in new_entries {
            let stamped = CloudEntry::stamped(entry);
            next.insert(stamped.name.clone(), stamped);
        }

        self.push_entries(&mut state, &next, &previous_hash).await?;
        debug!("stored {} entries", names.len());
        Ok(names
            .iter()
            .filter_map(|name| state.entries.get(name).cloned())
            .collect())
    }

    pub async fn store_one(&self, entry: KeyEntry) -> CloudResult<CloudEntry> {
        let name = entry.name.clone();
        self.store(vec![entry])
            .await?
            .into_iter()
            .next()
            .ok_or(CloudError::EntryNotFound(name))
    }

    /// Replaces an entry's data and meta, keeping its creation date.
    pub async fn update(
        &self,
        name: &str,
        data: Vec<u8>,
        meta: EntryMeta,
    ) -> CloudResult<CloudEntry> {
        let mut state = self.state.lock().await;
        let previous_hash = state.synced()?.content_hash.clone();

        let now = now();
        let creation_date = state
            .entries
            .get(name)
            .map_or(now, |existing| existing.creation_date);
        let updated = CloudEntry {
            name: name.to_string(),
            data,
            creation_date,
            modification_date: now,
            meta,
        };

        let mut next = state.entries.clone();
        next.insert(name.to_string(), updated);
        self.push_entries(&mut state, &next, &previous_hash).await?;
        state.entry(name).cloned()
    }

    /// Deletes entries. Every name must exist; nothing is pushed otherwise.
    pub async fn delete(&self, names: &[String]) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        let previous_hash = state.synced()?.content_hash.clone();

        for name in names {
            state.entry(name)?;
        }

        let mut next = state.entries.clone();
        for name in names {
            next.remove(name);
        }
        self.push_entries(&mut state, &next, &previous_hash).await?;
        debug!("deleted {} entries", names.len());
        Ok(())
    }

    pub async fn delete_one(&self, name: &str) -> CloudResult<()> {
        self.delete(&[name.to_string()]).await
    }

    /// Resets the remote blob and forgets every entry.
    pub async fn delete_all(&self) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        let reset = self.manager.reset_value().await?;
        state.adopt(reset)
    }

    // ── Reads ──

    pub async fn retrieve(&self, name: &str) -> CloudResult<CloudEntry> {
        let state = self.state.lock().await;
        state.synced()?;
        state.entry(name).cloned()
    }

    pub async fn retrieve_all(&self) -> CloudResult<Vec<CloudEntry>> {
        let state = self.state.lock().await;
        state.synced()?;
        Ok(state.entries.values().cloned().collect())
    }

    pub async fn exists(&self, name: &str) -> CloudResult<bool> {
        let state = self.state.lock().await;
        state.synced()?;
        Ok(state.entries.contains_key(name))
    }

    // ── Sync ──

    /// Pulls the blob and rebuilds the cache from it.
    pub async fn retrieve_cloud_entries(&self) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        let pulled = self.manager.pull_value().await?;
        state.adopt(pulled)
    }

    /// Re-encrypts the cached blob for a new recipient set.
    pub async fn rotate_recipients(
        &self,
        new_public_keys: Option<Vec<PublicKey>>,
        new_private_key: Option<PrivateKey>,
    ) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        let last = state.synced()?.clone();
        if last.is_empty() {
            debug!("last synced blob is empty, skipping rotation");
            return Ok(());
        }

        let rotated = self
            .manager
            .rotate_recipients_with(
                last.value.as_bytes(),
                Some(last.content_hash.as_slice()),
                new_public_keys,
                new_private_key,
            )
            .await?;
        state.adopt(rotated)
    }

    async fn push_entries(
        &self,
        state: &mut CacheState,
        entries: &HashMap<String, CloudEntry>,
        previous_hash: &[u8],
    ) -> CloudResult<()> {
        let plaintext = serialize_entries(entries.values())?;
        let pushed = self
            .manager
            .push_value(&plaintext, Some(previous_hash))
            .await?;
        state.adopt(pushed)
    }
}
