//! Host storage capabilities backing the persistent tiers.
//!
//! A persistent tier is any [`StorageBackend`]. A tier the host does not
//! provide is simply `None` in the [`StateStore`](crate::state::StateStore)
//! and behaves as permanently empty.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::StorageError;

/// Byte-oriented key/value storage provided by the host.
///
/// Implementations may fail on any call; callers in this crate degrade
/// failures to "absent" rather than propagating them.
pub trait StorageBackend {
    /// Raw bytes stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `bytes` under `key`, replacing any previous value.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Delete `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Every key currently stored. Order is backend-defined.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}
