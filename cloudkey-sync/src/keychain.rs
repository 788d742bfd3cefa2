//! Local key storage and per-identity namespacing.

use crate::error::{SyncError, SyncResult};
use cloudkey_cloud::EntryMeta;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An entry held by the local keychain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeychainEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub meta: EntryMeta,
}

/// Platform keychain capabilities the reconciler relies on.
pub trait KeyStorage: Send + Sync {
    fn exists(&self, name: &str) -> SyncResult<bool>;
    fn load(&self, name: &str) -> SyncResult<KeychainEntry>;
    fn store(&self, name: &str, data: &[u8], meta: &EntryMeta) -> SyncResult<KeychainEntry>;
    fn update(&self, name: &str, data: &[u8], meta: &EntryMeta) -> SyncResult<KeychainEntry>;
    fn delete(&self, name: &str) -> SyncResult<()>;
    fn names(&self) -> SyncResult<Vec<String>>;
}

/// Keychain kept in process memory.
#[derive(Default)]
pub struct MemoryKeyStorage {
    entries: RwLock<HashMap<String, KeychainEntry>>,
}

impl MemoryKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<E: std::fmt::Display>(e: E) -> SyncError {
        SyncError::Storage(e.to_string())
    }
}

impl KeyStorage for MemoryKeyStorage {
    fn exists(&self, name: &str) -> SyncResult<bool> {
        let entries = self.entries.read().map_err(Self::poisoned)?;
        Ok(entries.contains_key(name))
    }

    fn load(&self, name: &str) -> SyncResult<KeychainEntry> {
        let entries = self.entries.read().map_err(Self::poisoned)?;
        entries
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::KeychainEntryNotFound(name.to_string()))
    }

    fn store(&self, name: &str, data: &[u8], meta: &EntryMeta) -> SyncResult<KeychainEntry> {
        let mut entries = self.entries.write().map_err(Self::poisoned)?;
        if entries.contains_key(name) {
            return Err(SyncError::KeychainEntryAlreadyExists(name.to_string()));
        }
        let entry = KeychainEntry {
            name: name.to_string(),
            data: data.to_vec(),
            meta: meta.clone(),
        };
        entries.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    fn update(&self, name: &str, data: &[u8], meta: &EntryMeta) -> SyncResult<KeychainEntry> {
        let mut entries = self.entries.write().map_err(Self::poisoned)?;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| SyncError::KeychainEntryNotFound(name.to_string()))?;
        entry.data = data.to_vec();
        entry.meta = meta.clone();
        Ok(entry.clone())
    }

    fn delete(&self, name: &str) -> SyncResult<()> {
        let mut entries = self.entries.write().map_err(Self::poisoned)?;
        entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SyncError::KeychainEntryNotFound(name.to_string()))
    }

    fn names(&self) -> SyncResult<Vec<String>> {
        let entries = self.entries.read().map_err(Self::poisoned)?;
        Ok(entries.keys().cloned().collect())
    }
}

/// Scopes a shared keychain to one identity by prefixing entry names.
///
/// Entries outside the identity's prefix are invisible through the wrapper.
pub struct KeychainWrapper {
    inner: Arc<dyn KeyStorage>,
    prefix: String,
}

impl KeychainWrapper {
    pub fn new(identity: &str, inner: Arc<dyn KeyStorage>) -> Self {
        Self {
            inner,
            prefix: format!("VIRGIL.IDENTITY={identity}."),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn scoped(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    fn unscoped(&self, mut entry: KeychainEntry) -> KeychainEntry {
        if let Some(stripped) = entry.name.strip_prefix(&self.prefix) {
            entry.name = stripped.to_string();
        }
        entry
    }

    /// Every entry belonging to this identity.
    pub fn retrieve_all(&self) -> SyncResult<Vec<KeychainEntry>> {
        self.names()?
            .iter()
            .map(|name| self.load(name))
            .collect()
    }
}

impl KeyStorage for KeychainWrapper {
    fn exists(&self, name: &str) -> SyncResult<bool> {
        self.inner.exists(&self.scoped(name))
    }

    fn load(&self, name: &str) -> SyncResult<KeychainEntry> {
        match self.inner.load(&self.scoped(name)) {
            Ok(entry) => Ok(self.unscoped(entry)),
            Err(SyncError::KeychainEntryNotFound(_)) => {
                Err(SyncError::KeychainEntryNotFound(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn store(&self, name: &str, data: &[u8], meta: &EntryMeta) -> SyncResult<KeychainEntry> {
        let entry = self.inner.store(&self.scoped(name), data, meta)?;
        Ok(self.unscoped(entry))
    }

    fn update(&self, name: &str, data: &[u8], meta: &EntryMeta) -> SyncResult<KeychainEntry> {
        let entry = self.inner.update(&self.scoped(name), data, meta)?;
        Ok(self.unscoped(entry))
    }

    fn delete(&self, name: &str) -> SyncResult<()> {
        self.inner.delete(&self.scoped(name))
    }

    fn names(&self) -> SyncResult<Vec<String>> {
        Ok(self
            .inner
            .names()?
            .into_iter()
            .filter_map(|name| name.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_rejects_duplicates_and_missing() {
        let storage = MemoryKeyStorage::new();
        storage.store("a", b"1", &EntryMeta::new()).unwrap();

        assert!(matches!(
            storage.store("a", b"2", &EntryMeta::new()),
            Err(SyncError::KeychainEntryAlreadyExists(_))
        ));
        assert!(matches!(
            storage.update("b", b"2", &EntryMeta::new()),
            Err(SyncError::KeychainEntryNotFound(_))
        ));
        assert!(matches!(
            storage.delete("b"),
            Err(SyncError::KeychainEntryNotFound(_))
        ));
    }

    #[test]
    fn wrapper_prefixes_and_strips_names() {
        let shared: Arc<MemoryKeyStorage> = Arc::new(MemoryKeyStorage::new());
        let alice = KeychainWrapper::new("alice", shared.clone());

        let stored = alice.store("signing", b"k", &EntryMeta::new()).unwrap();
        assert_eq!(stored.name, "signing");
        assert!(shared.exists("VIRGIL.IDENTITY=alice.signing").unwrap());
        assert_eq!(alice.load("signing").unwrap().data, b"k");
    }

    #[test]
    fn wrapper_hides_other_identities() {
        let shared: Arc<MemoryKeyStorage> = Arc::new(MemoryKeyStorage::new());
        let alice = KeychainWrapper::new("alice", shared.clone());
        let bob = KeychainWrapper::new("bob", shared.clone());
        shared.store("unrelated", b"x", &EntryMeta::new()).unwrap();

        alice.store("k1", b"a", &EntryMeta::new()).unwrap();
        bob.store("k1", b"b", &EntryMeta::new()).unwrap();

        let all = alice.retrieve_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "k1");
        assert_eq!(all[0].data, b"a");
        assert!(matches!(
            alice.load("unrelated"),
            Err(SyncError::KeychainEntryNotFound(name)) if name == "unrelated"
        ));
    }
}
