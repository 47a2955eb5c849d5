//! Storage collaborator interface and an in-memory implementation.
//!
//! The dispatch core never owns persistence; it consumes an ordered key/value
//! store through [`Storage`]. Implementations must give per-key atomicity and
//! treat deleting an absent key as success.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

/// A single stored key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl StorageEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Encode `value` as JSON under `key`.
    pub fn json<T: Serialize + ?Sized>(key: impl Into<String>, value: &T) -> Result<Self, StorageError> {
        let value = serde_json::to_vec(value).map_err(StorageError::Encode)?;
        Ok(Self { key: key.into(), value })
    }

    /// Decode the stored bytes as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        serde_json::from_slice(&self.value)
            .map_err(|source| StorageError::Decode { key: self.key.clone(), source })
    }
}

/// Ordered key/value store consumed by the core.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Fetch a key; `Ok(None)` when absent.
    fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError>;
    /// Insert or overwrite an entry.
    fn put(&self, entry: StorageEntry) -> Result<(), StorageError>;
    /// Remove a key. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// Sorted keys under `prefix`, relative to it and one level deep.
    ///
    /// A nested key `prefix/a/b` is reported once as `a/`.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Shared storage handle carried by requests.
pub type SharedStorage = Arc<dyn Storage>;

/// In-memory storage backed by an `RwLock<BTreeMap>`.
///
/// Clones share the same map.
#[derive(Debug, Default, Clone)]
pub struct InmemStorage {
    inner: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl InmemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> Result<usize, StorageError> {
        let map = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(map.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl Storage for InmemStorage {
    fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        let map = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(map.get(key).map(|v| StorageEntry::new(key, v.clone())))
    }

    fn put(&self, entry: StorageEntry) -> Result<(), StorageError> {
        let mut map = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        map.insert(entry.key, entry.value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        map.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let map = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        let mut out: Vec<String> = Vec::new();
        for key in map.range(prefix.to_string()..).map(|(k, _)| k) {
            let Some(rest) = key.strip_prefix(prefix) else { break };
            let item = match rest.find('/') {
                Some(i) => &rest[..=i],
                None => rest,
            };
            // BTreeMap order keeps duplicates adjacent.
            if out.last().map(String::as_str) != Some(item) {
                out.push(item.to_string());
            }
        }
        Ok(out)
    }
}
