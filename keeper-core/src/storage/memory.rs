//! Process-local blob store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::error::{StorageError, StorageResult};
use super::traits::BlobStore;

/// Blob store backed by a `HashMap`. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal mutex is poisoned.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.guard()?.len())
    }

    /// Returns `true` when no blob is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal mutex is poisoned.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.guard()?.is_empty())
    }

    fn guard(&self) -> StorageResult<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::BlobStore("in-memory store mutex poisoned".into()))
    }
}

impl BlobStore for InMemoryBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.guard()?.get(name).cloned())
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        self.guard()?.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        self.guard()?.remove(name);
        Ok(())
    }
}
