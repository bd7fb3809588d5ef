//! In-memory storage backend.

use crate::error::StorageError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::StorageBackend;

#[derive(Debug)]
struct Inner {
    entries: BTreeMap<String, Vec<u8>>,
    available: bool,
}

/// Map-backed storage. Clones share the same underlying map, the way two
/// application instances share a host's storage area.
#[derive(Clone, Debug)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                entries: BTreeMap::new(),
                available: true,
            })),
        }
    }

    /// Toggle availability. While unavailable every call fails, simulating a
    /// host that has disabled the storage area.
    pub fn set_available(&self, available: bool) {
        self.inner.write().available = available;
    }

    /// Number of raw entries, regardless of prefix or availability.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes under `key`, bypassing availability.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().entries.get(key).cloned()
    }

    fn check_available(inner: &Inner) -> Result<(), StorageError> {
        if inner.available {
            Ok(())
        } else {
            Err(StorageError::Unavailable("memory storage disabled".into()))
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let inner = self.inner.read();
        Self::check_available(&inner)?;
        Ok(inner.entries.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        Self::check_available(&inner)?;
        inner.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        Self::check_available(&inner)?;
        inner.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.read();
        Self::check_available(&inner)?;
        Ok(inner.entries.keys().cloned().collect())
    }
}
