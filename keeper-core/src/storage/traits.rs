//! Persistence collaborator interface.

use super::error::StorageResult;

/// Atomic store for named opaque blobs.
///
/// Implementations must make [`BlobStore::write_atomic`] all-or-nothing: a
/// concurrent or subsequent reader sees either the previous bytes or the new
/// bytes, never a mix.
pub trait BlobStore: Send + Sync {
    /// Reads the blob stored under `name`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the blob under `name` with `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Deletes the blob under `name`. Deleting a missing blob is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, name: &str) -> StorageResult<()>;
}
