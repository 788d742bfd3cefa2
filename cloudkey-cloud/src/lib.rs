//! Cloud key storage for cloudkey.
//!
//! Keeps a set of named key entries in one encrypted blob on a remote
//! service:
//! - [`client`]: transport to the blob service (HTTP or in-memory)
//! - [`token`]: access-token supply with forced reload on 401
//! - [`manager`]: encrypt/push, pull/decrypt, reset and recipient rotation
//! - [`cache`]: the named-entry map built on top of the manager
//!
//! The service only ever sees envelope headers and ciphertext. Every push
//! is checked against the service's echo and every pull is signature
//! verified before it reaches the cache.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod memory_store;
pub mod token;
pub mod types;

pub use cache::CloudKeyCache;
pub use client::{HttpRemoteStore, RemoteStore};
pub use config::CloudConfig;
pub use error::{CloudError, CloudResult};
pub use manager::{RetryPolicy, SyncManager};
pub use memory_store::MemoryRemoteStore;
pub use token::{
    CachingTokenProvider, StaticTokenProvider, TokenContext, TokenOperation, TokenProvider,
};
pub use types::*;
