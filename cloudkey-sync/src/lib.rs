//! Keeps a local keychain and cloudkey cloud storage in step.
//!
//! [`SyncKeyStorage`] writes through to the cloud first and mirrors the
//! result locally. Cloud creation and modification dates are stored in the
//! keychain entry meta (see [`meta`]) so [`SyncKeyStorage::sync`] can tell
//! which side is newer. The cloud always wins on divergence.

mod error;
pub mod keychain;
pub mod meta;
mod storage;

pub use error::{SyncError, SyncResult};
pub use keychain::{KeyStorage, KeychainEntry, KeychainWrapper, MemoryKeyStorage};
pub use storage::{SyncKeyStorage, SyncReport};
