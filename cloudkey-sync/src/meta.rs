//! Cloud timestamps carried in keychain entry metadata.
//!
//! The keychain has no notion of the cloud's creation and modification
//! dates, so they ride along in the entry meta as integer milliseconds.

use crate::error::{SyncError, SyncResult};
use crate::keychain::KeychainEntry;
use chrono::{DateTime, Utc};
use cloudkey_cloud::{CloudEntry, EntryMeta};

pub const CREATION_DATE_KEY: &str = "k_cda";
pub const MODIFICATION_DATE_KEY: &str = "k_mda";

/// Cloud entry meta plus its dates, ready for the keychain.
pub fn meta_for_keychain(entry: &CloudEntry) -> EntryMeta {
    let mut meta = entry.meta.clone();
    meta.insert(
        CREATION_DATE_KEY.to_string(),
        entry.creation_date.timestamp_millis().to_string(),
    );
    meta.insert(
        MODIFICATION_DATE_KEY.to_string(),
        entry.modification_date.timestamp_millis().to_string(),
    );
    meta
}

/// Reads `(creation, modification)` back out of keychain meta.
pub fn extract_dates(meta: &EntryMeta) -> SyncResult<(DateTime<Utc>, DateTime<Utc>)> {
    Ok((
        parse_date(meta, CREATION_DATE_KEY)?,
        parse_date(meta, MODIFICATION_DATE_KEY)?,
    ))
}

/// True when the entry carries both dates in a readable form.
pub fn is_synced_entry(entry: &KeychainEntry) -> bool {
    extract_dates(&entry.meta).is_ok()
}

fn parse_date(meta: &EntryMeta, key: &str) -> SyncResult<DateTime<Utc>> {
    let raw = meta
        .get(key)
        .ok_or_else(|| SyncError::InvalidEntryMeta(format!("missing {key}")))?;
    let millis: i64 = raw
        .parse()
        .map_err(|_| SyncError::InvalidEntryMeta(format!("{key} is not a number: {raw}")))?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| SyncError::InvalidEntryMeta(format!("{key} out of range: {millis}")))
}
