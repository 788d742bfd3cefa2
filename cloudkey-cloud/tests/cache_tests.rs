mod support;

use cloudkey_cloud::{CloudError, CloudKeyCache, EntryMeta, KeyEntry, MemoryRemoteStore};
use cloudkey_crypto::{PrivateKey, RecipientSet};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::{manager, self_manager};

fn entry(name: &str) -> KeyEntry {
    KeyEntry::new(name, format!("data-{name}").into_bytes())
}

async fn synced_cache(store: Arc<MemoryRemoteStore>, key: &PrivateKey) -> CloudKeyCache {
    let cache = CloudKeyCache::new(self_manager(store, key));
    cache.retrieve_cloud_entries().await.unwrap();
    cache
}

// ── Out of sync ──

#[tokio::test]
async fn operations_before_sync_fail_without_network() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = CloudKeyCache::new(self_manager(store.clone(), &PrivateKey::generate()));

    assert!(!cache.is_synced().await);
    assert!(matches!(
        cache.store(vec![entry("a")]).await,
        Err(CloudError::OutOfSync)
    ));
    assert!(matches!(cache.retrieve("a").await, Err(CloudError::OutOfSync)));
    assert!(matches!(cache.retrieve_all().await, Err(CloudError::OutOfSync)));
    assert!(matches!(cache.exists("a").await, Err(CloudError::OutOfSync)));
    assert!(matches!(
        cache.update("a", b"x".to_vec(), EntryMeta::new()).await,
        Err(CloudError::OutOfSync)
    ));
    assert!(matches!(cache.delete_one("a").await, Err(CloudError::OutOfSync)));
    assert!(matches!(
        cache.rotate_recipients(None, Some(PrivateKey::generate())).await,
        Err(CloudError::OutOfSync)
    ));
    assert_eq!(store.request_count(), 0);
}

// ── Store / retrieve ──

#[tokio::test]
async fn store_then_retrieve() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store, &PrivateKey::generate()).await;

    let mut meta = EntryMeta::new();
    meta.insert("usage".into(), "signing".into());
    let stored = cache
        .store_one(entry("alice").with_meta(meta.clone()))
        .await
        .unwrap();

    assert_eq!(stored.name, "alice");
    assert_eq!(stored.data, b"data-alice");
    assert_eq!(stored.creation_date, stored.modification_date);
    assert_eq!(stored.meta, meta);
    assert_eq!(cache.retrieve("alice").await.unwrap(), stored);
    assert!(cache.exists("alice").await.unwrap());
    assert!(!cache.exists("bob").await.unwrap());
}

#[tokio::test]
async fn store_returns_entries_in_request_order() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store, &PrivateKey::generate()).await;

    let names = ["zeta", "alpha", "mid"];
    let stored = cache
        .store(names.iter().map(|n| entry(n)).collect())
        .await
        .unwrap();

    let returned: Vec<&str> = stored.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(returned, names);
    assert_eq!(cache.retrieve_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn duplicate_store_fails_without_partial_state() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store.clone(), &PrivateKey::generate()).await;
    cache.store_one(entry("a")).await.unwrap();
    let requests = store.request_count();

    let err = cache
        .store(vec![entry("b"), entry("a")])
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::EntryAlreadyExists(name) if name == "a"));
    assert!(!cache.exists("b").await.unwrap());
    assert_eq!(store.request_count(), requests);
}

#[tokio::test]
async fn duplicate_names_in_one_request_fail() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store, &PrivateKey::generate()).await;

    let err = cache
        .store(vec![entry("twice"), entry("twice")])
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::EntryAlreadyExists(_)));
}

#[tokio::test]
async fn retrieve_missing_entry_fails() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store, &PrivateKey::generate()).await;

    assert!(matches!(
        cache.retrieve("ghost").await,
        Err(CloudError::EntryNotFound(name)) if name == "ghost"
    ));
}

// ── Update ──

#[tokio::test]
async fn update_keeps_creation_date() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store, &PrivateKey::generate()).await;
    let original = cache.store_one(entry("k")).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let updated = cache
        .update("k", b"new data".to_vec(), EntryMeta::new())
        .await
        .unwrap();

    assert_eq!(updated.creation_date, original.creation_date);
    assert!(updated.modification_date > original.modification_date);
    assert_eq!(cache.retrieve("k").await.unwrap().data, b"new data");
}

#[tokio::test]
async fn update_of_unknown_name_creates_it() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store, &PrivateKey::generate()).await;

    let created = cache
        .update("fresh", b"v".to_vec(), EntryMeta::new())
        .await
        .unwrap();
    assert_eq!(created.creation_date, created.modification_date);
    assert!(cache.exists("fresh").await.unwrap());
}

// ── Delete ──

#[tokio::test]
async fn delete_checks_every_name_first() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store, &PrivateKey::generate()).await;
    cache.store(vec![entry("a"), entry("b")]).await.unwrap();

    let err = cache
        .delete(&["a".to_string(), "missing".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::EntryNotFound(name) if name == "missing"));
    assert!(cache.exists("a").await.unwrap());

    cache.delete_one("a").await.unwrap();
    assert!(!cache.exists("a").await.unwrap());
    assert!(cache.exists("b").await.unwrap());
}

#[tokio::test]
async fn delete_all_resets_remote() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store.clone(), &PrivateKey::generate()).await;
    cache.store(vec![entry("a"), entry("b")]).await.unwrap();

    cache.delete_all().await.unwrap();

    assert!(cache.retrieve_all().await.unwrap().is_empty());
    assert!(store.current().await.is_empty());
}

// ── Sync between instances ──

#[tokio::test]
async fn second_instance_sees_stored_entries() {
    let store = Arc::new(MemoryRemoteStore::new());
    let key = PrivateKey::generate();
    let first = synced_cache(store.clone(), &key).await;
    let stored = first.store_one(entry("shared")).await.unwrap();

    let second = synced_cache(store, &key).await;
    assert_eq!(second.retrieve("shared").await.unwrap(), stored);
}

#[tokio::test]
async fn retrieve_cloud_entries_is_idempotent() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store, &PrivateKey::generate()).await;
    cache.store(vec![entry("a"), entry("b")]).await.unwrap();

    cache.retrieve_cloud_entries().await.unwrap();
    let mut once = cache.retrieve_all().await.unwrap();
    cache.retrieve_cloud_entries().await.unwrap();
    let mut twice = cache.retrieve_all().await.unwrap();

    once.sort_by(|a, b| a.name.cmp(&b.name));
    twice.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(once, twice);
}

#[tokio::test]
async fn stale_instance_push_conflicts() {
    let store = Arc::new(MemoryRemoteStore::new());
    let key = PrivateKey::generate();
    let first = synced_cache(store.clone(), &key).await;
    let second = synced_cache(store, &key).await;

    first.store_one(entry("from-first")).await.unwrap();
    let err = second.store_one(entry("from-second")).await.unwrap_err();

    assert!(matches!(err, CloudError::Server { status: 409, .. }));
    assert!(!second.exists("from-second").await.unwrap());
}

// ── Rotation ──

#[tokio::test]
async fn rotate_recipients_moves_entries_to_new_key() {
    let store = Arc::new(MemoryRemoteStore::new());
    let old_key = PrivateKey::generate();
    let new_key = PrivateKey::generate();
    let cache = synced_cache(store.clone(), &old_key).await;
    cache.store_one(entry("k")).await.unwrap();

    cache
        .rotate_recipients(
            Some(vec![new_key.public_key().clone()]),
            Some(new_key.clone()),
        )
        .await
        .unwrap();
    assert!(cache.exists("k").await.unwrap());

    let reader = CloudKeyCache::new(manager(store, RecipientSet::single(new_key)));
    reader.retrieve_cloud_entries().await.unwrap();
    assert_eq!(reader.retrieve("k").await.unwrap().data, b"data-k");
}

#[tokio::test]
async fn rotate_recipients_on_empty_blob_is_noop() {
    let store = Arc::new(MemoryRemoteStore::new());
    let cache = synced_cache(store.clone(), &PrivateKey::generate()).await;
    let requests = store.request_count();

    cache
        .rotate_recipients(None, Some(PrivateKey::generate()))
        .await
        .unwrap();
    assert_eq!(store.request_count(), requests);
}

#[tokio::test]
async fn rotate_recipients_rotates_signed_empty_plaintext() {
    let store = Arc::new(MemoryRemoteStore::new());
    let old_key = PrivateKey::generate();
    let new_key = PrivateKey::generate();
    let mgr = self_manager(store.clone(), &old_key);
    let written = mgr.push_value(b"", None).await.unwrap();
    assert!(!written.is_empty());

    let cache = CloudKeyCache::new(mgr.clone());
    cache.retrieve_cloud_entries().await.unwrap();
    let requests = store.request_count();

    cache
        .rotate_recipients(
            Some(vec![new_key.public_key().clone()]),
            Some(new_key.clone()),
        )
        .await
        .unwrap();

    assert!(store.request_count() > requests);
    assert_eq!(mgr.recipients().await.private_key().id(), new_key.id());
    assert!(cache.retrieve_all().await.unwrap().is_empty());

    let reader = self_manager(store, &new_key);
    assert!(reader.pull_value().await.unwrap().value.is_empty());
}
