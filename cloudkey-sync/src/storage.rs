//! Keychain and cloud kept in step for one identity.
//!
//! Writes go to the cloud first and are then mirrored into the keychain
//! with the cloud's dates in the entry meta. [`SyncKeyStorage::sync`]
//! repairs any divergence, treating the cloud as authoritative.

use crate::error::{SyncError, SyncResult};
use crate::keychain::{KeyStorage, KeychainEntry, KeychainWrapper};
use crate::meta::{extract_dates, is_synced_entry, meta_for_keychain};
use cloudkey_cloud::{CloudEntry, CloudKeyCache, EntryMeta, KeyEntry};
use cloudkey_crypto::{PrivateKey, PublicKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// What a [`SyncKeyStorage::sync`] call changed locally.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub deleted: Vec<String>,
    pub stored: Vec<String>,
    pub updated: Vec<String>,
}

/// Key storage mirrored between the local keychain and the cloud.
pub struct SyncKeyStorage {
    identity: String,
    keychain: KeychainWrapper,
    cloud: Arc<CloudKeyCache>,
}

impl SyncKeyStorage {
    pub fn new(
        identity: impl Into<String>,
        local: Arc<dyn KeyStorage>,
        cloud: Arc<CloudKeyCache>,
    ) -> Self {
        let identity = identity.into();
        Self {
            keychain: KeychainWrapper::new(&identity, local),
            identity,
            cloud,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn cloud(&self) -> &Arc<CloudKeyCache> {
        &self.cloud
    }

    /// Pulls the cloud and brings the keychain in line with it.
    ///
    /// Local entries without readable dates are left alone.
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        self.cloud.retrieve_cloud_entries().await?;
        let cloud: HashMap<String, CloudEntry> = self
            .cloud
            .retrieve_all()
            .await?
            .into_iter()
            .map(|entry| (entry.name.clone(), entry))
            .collect();
        let local: HashMap<String, KeychainEntry> = self
            .keychain
            .retrieve_all()?
            .into_iter()
            .filter(is_synced_entry)
            .map(|entry| (entry.name.clone(), entry))
            .collect();

        let mut report = SyncReport::default();

        for name in local.keys().filter(|name| !cloud.contains_key(*name)) {
            self.keychain.delete(name)?;
            report.deleted.push(name.clone());
        }

        for (name, entry) in cloud.iter().filter(|(name, _)| !local.contains_key(*name)) {
            let meta = meta_for_keychain(entry);
            if self.keychain.exists(name)? {
                self.keychain.update(name, &entry.data, &meta)?;
            } else {
                self.keychain.store(name, &entry.data, &meta)?;
            }
            report.stored.push(name.clone());
        }

        for (name, local_entry) in &local {
            let Some(cloud_entry) = cloud.get(name) else {
                continue;
            };
            let (_, local_modified) = extract_dates(&local_entry.meta)?;
            if local_modified < cloud_entry.modification_date {
                self.keychain
                    .update(name, &cloud_entry.data, &meta_for_keychain(cloud_entry))?;
                report.updated.push(name.clone());
            }
        }

        info!(
            "synced keychain for {}: {} deleted, {} stored, {} updated",
            self.identity,
            report.deleted.len(),
            report.stored.len(),
            report.updated.len()
        );
        Ok(report)
    }

    // ── Writes ──

    /// Stores entries in the cloud, then in the keychain.
    pub async fn store(&self, entries: Vec<KeyEntry>) -> SyncResult<Vec<KeychainEntry>> {
        for entry in &entries {
            if self.keychain.exists(&entry.name)? {
                return Err(SyncError::KeychainEntryAlreadyExists(entry.name.clone()));
            }
        }
        let mut requested_names = HashSet::new();
        for entry in &entries {
            if !requested_names.insert(entry.name.as_str())
                || self.cloud.exists(&entry.name).await?
            {
                return Err(SyncError::CloudEntryAlreadyExists(entry.name.clone()));
            }
        }

        let requested: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        let stored = self.cloud.store(entries).await?;

        if stored.len() != requested.len() {
            return Err(SyncError::InconsistentState(format!(
                "stored {} of {} entries in the cloud",
                stored.len(),
                requested.len()
            )));
        }
        if let Some((want, got)) = requested
            .iter()
            .zip(&stored)
            .find(|(want, got)| **want != got.name)
        {
            return Err(SyncError::InconsistentState(format!(
                "expected cloud entry {want}, got {}",
                got.name
            )));
        }

        let mirrored = stored
            .iter()
            .map(|entry| {
                self.keychain
                    .store(&entry.name, &entry.data, &meta_for_keychain(entry))
            })
            .collect::<SyncResult<Vec<_>>>()?;
        debug!("stored {} entries for {}", mirrored.len(), self.identity);
        Ok(mirrored)
    }

    pub async fn store_one(&self, entry: KeyEntry) -> SyncResult<KeychainEntry> {
        let name = entry.name.clone();
        self.store(vec![entry])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::InconsistentState(format!("{name} was not stored")))
    }

    /// Updates an entry present in both stores.
    pub async fn update(
        &self,
        name: &str,
        data: Vec<u8>,
        meta: EntryMeta,
    ) -> SyncResult<KeychainEntry> {
        if !self.keychain.exists(name)? {
            return Err(SyncError::KeychainEntryNotFound(name.to_string()));
        }
        if !self.cloud.exists(name).await? {
            return Err(SyncError::CloudEntryNotFound(name.to_string()));
        }

        let updated = self.cloud.update(name, data, meta).await?;
        let entry = self
            .keychain
            .update(name, &updated.data, &meta_for_keychain(&updated))?;
        debug!("updated {name} for {}", self.identity);
        Ok(entry)
    }

    /// Deletes entries from the cloud, then from the keychain.
    pub async fn delete(&self, names: &[String]) -> SyncResult<()> {
        for name in names {
            if !self.keychain.exists(name)? {
                return Err(SyncError::KeychainEntryNotFound(name.clone()));
            }
        }

        self.cloud.delete(names).await?;
        for name in names {
            self.keychain.delete(name)?;
        }
        debug!("deleted {} entries for {}", names.len(), self.identity);
        Ok(())
    }

    pub async fn delete_one(&self, name: &str) -> SyncResult<()> {
        self.delete(&[name.to_string()]).await
    }

    /// Resets the cloud and removes every synced keychain entry.
    pub async fn delete_all(&self) -> SyncResult<()> {
        self.cloud.delete_all().await?;

        let synced: Vec<KeychainEntry> = self
            .keychain
            .retrieve_all()?
            .into_iter()
            .filter(is_synced_entry)
            .collect();
        for entry in &synced {
            self.keychain.delete(&entry.name)?;
        }
        info!(
            "deleted all {} synced entries for {}",
            synced.len(),
            self.identity
        );
        Ok(())
    }

    // ── Reads ──

    pub fn retrieve(&self, name: &str) -> SyncResult<KeychainEntry> {
        self.keychain.load(name)
    }

    pub fn retrieve_all(&self) -> SyncResult<Vec<KeychainEntry>> {
        self.keychain.retrieve_all()
    }

    pub fn exists(&self, name: &str) -> SyncResult<bool> {
        self.keychain.exists(name)
    }

    /// Re-encrypts the cloud blob for a new recipient set.
    pub async fn rotate_recipients(
        &self,
        new_public_keys: Option<Vec<PublicKey>>,
        new_private_key: Option<PrivateKey>,
    ) -> SyncResult<()> {
        self.cloud
            .rotate_recipients(new_public_keys, new_private_key)
            .await?;
        Ok(())
    }
}
