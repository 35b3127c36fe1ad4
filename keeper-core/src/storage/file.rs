//! Blob store writing one envelope file per blob.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::envelope::BlobEnvelope;
use super::error::{StorageError, StorageResult};
use super::lock::StorageLock;
use super::paths::StoragePaths;
use super::traits::BlobStore;

/// Durable [`BlobStore`] rooted at a [`StoragePaths`] directory.
///
/// Writes go to a temporary sibling file that is synced and renamed over the
/// target while the storage lock is held, so readers observe either the old or
/// the new blob.
#[derive(Debug)]
pub struct FileBlobStore {
    paths: StoragePaths,
    lock: StorageLock,
}

impl FileBlobStore {
    /// Opens (creating if needed) the store under `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or the lock file cannot be created.
    pub fn open(paths: StoragePaths) -> StorageResult<Self> {
        fs::create_dir_all(paths.blobs_dir()).map_err(|err| map_io_err(&err))?;
        let lock = StorageLock::open(&paths.lock_path())?;
        tracing::debug!(dir = %paths.keeper_dir().display(), "opened file blob store");
        Ok(Self { paths, lock })
    }

    /// Returns the paths this store writes to.
    #[must_use]
    pub const fn paths(&self) -> &StoragePaths {
        &self.paths
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.paths.blob_path(name);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(map_io_err(&err)),
        };
        let envelope = BlobEnvelope::deserialize(&raw)?;
        if envelope.name != name {
            return Err(StorageError::BlobStore(format!(
                "blob file for {name} holds {}",
                envelope.name
            )));
        }
        Ok(Some(envelope.bytes))
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        let envelope = BlobEnvelope::new(name, bytes.to_vec(), now());
        let encoded = envelope.serialize()?;

        let _guard = self.lock.lock()?;
        let path = self.paths.blob_path(name);
        let tmp = path.with_extension("tmp");
        write_synced(&tmp, &encoded)?;
        fs::rename(&tmp, &path).map_err(|err| map_io_err(&err))?;
        tracing::debug!(blob = name, len = bytes.len(), "blob written");
        Ok(())
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        let _guard = self.lock.lock()?;
        match fs::remove_file(self.paths.blob_path(name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(map_io_err(&err)),
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut file = fs::File::create(path).map_err(|err| map_io_err(&err))?;
    file.write_all(bytes).map_err(|err| map_io_err(&err))?;
    file.sync_all().map_err(|err| map_io_err(&err))
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

fn map_io_err(err: &std::io::Error) -> StorageError {
    StorageError::BlobStore(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileBlobStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::open(StoragePaths::new(dir.path())).expect("open store");
        (dir, store)
    }

    #[test]
    fn test_missing_blob_reads_none() {
        let (_dir, store) = store();
        assert_eq!(store.read("@@ID@@").expect("read"), None);
    }

    #[test]
    fn test_write_survives_reopen() {
        let (dir, store) = store();
        store.write_atomic("@@ID@@", b"first").expect("write");
        store.write_atomic("@@ID@@", b"second").expect("write");
        drop(store);

        let reopened = FileBlobStore::open(StoragePaths::new(dir.path())).expect("reopen");
        assert_eq!(
            reopened.read("@@ID@@").expect("read"),
            Some(b"second".to_vec())
        );
        assert!(!reopened.paths().blob_path("@@ID@@").with_extension("tmp").exists());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, store) = store();
        store.write_atomic("@APPROVED@", b"x").expect("write");
        store.delete("@APPROVED@").expect("delete");
        store.delete("@APPROVED@").expect("delete again");
        assert_eq!(store.read("@APPROVED@").expect("read"), None);
    }

    #[test]
    fn test_corrupt_blob_is_reported() {
        let (_dir, store) = store();
        fs::write(store.paths().blob_path("@@ID@@"), b"garbage").expect("write garbage");
        assert!(matches!(
            store.read("@@ID@@"),
            Err(StorageError::Serialization(_))
        ));
    }
}
