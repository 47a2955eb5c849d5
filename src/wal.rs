//! Write-ahead-log entries marking pending cleanup work.
//!
//! A backend records an entry before it starts a multi-step mutation against an
//! external system and deletes it once every step succeeded. Entries left behind
//! by a crashed or failed request are later handed to the rollback callback.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{Result, StorageError};
use crate::storage::{Storage, StorageEntry};

/// Reserved storage namespace for WAL entries.
pub const WAL_PREFIX: &str = "wal/";

/// A persisted cleanup marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub kind: String,
    pub data: Value,
    /// Creation time, unix epoch milliseconds.
    pub created_at: u64,
}

/// Persist a new entry and return its id.
pub fn put(storage: &dyn Storage, clock: &dyn Clock, kind: &str, data: Value) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let entry = WalEntry { kind: kind.to_string(), data, created_at: clock.now_millis() };
    storage.put(StorageEntry::json(format!("{WAL_PREFIX}{id}"), &entry)?)?;
    debug!(target: "keyward::wal", id = %id, kind = %kind, "wal entry recorded");
    Ok(id)
}

/// Load an entry; `None` if it was already removed.
pub fn get(storage: &dyn Storage, id: &str) -> Result<Option<WalEntry>> {
    match storage.get(&format!("{WAL_PREFIX}{id}"))? {
        Some(raw) => Ok(Some(raw.decode_json()?)),
        None => Ok(None),
    }
}

/// Remove an entry. Removing an absent entry succeeds.
pub fn delete(storage: &dyn Storage, id: &str) -> Result<(), StorageError> {
    storage.delete(&format!("{WAL_PREFIX}{id}"))
}

/// Ids of all persisted entries, sorted.
pub fn list(storage: &dyn Storage) -> Result<Vec<String>, StorageError> {
    Ok(storage.list(WAL_PREFIX)?.into_iter().filter(|k| !k.ends_with('/')).collect())
}
