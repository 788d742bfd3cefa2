//! Shared helpers for cloud integration tests.

#![allow(dead_code)]

use cloudkey_cloud::{MemoryRemoteStore, RetryPolicy, StaticTokenProvider, SyncManager};
use cloudkey_crypto::{PrivateKey, PublicKey, RecipientSet};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn keys(n: usize) -> Vec<PrivateKey> {
    (0..n).map(|_| PrivateKey::generate()).collect()
}

pub fn publics(keys: &[PrivateKey]) -> Vec<PublicKey> {
    keys.iter().map(|k| k.public_key().clone()).collect()
}

/// Manager over `store` with the given recipients and a static token.
pub fn manager(store: Arc<MemoryRemoteStore>, recipients: RecipientSet) -> Arc<SyncManager> {
    init_tracing();
    Arc::new(SyncManager::new(
        store,
        Arc::new(StaticTokenProvider::new("token")),
        recipients,
        RetryPolicy::default(),
    ))
}

/// Manager whose single recipient is `key`.
pub fn self_manager(store: Arc<MemoryRemoteStore>, key: &PrivateKey) -> Arc<SyncManager> {
    manager(store, RecipientSet::single(key.clone()))
}
