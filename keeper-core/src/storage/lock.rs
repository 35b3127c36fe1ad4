//! Cross-process lock serializing blob writes.
//!
//! Backed by an advisory exclusive file lock (`flock` on Unix, `LockFileEx` on
//! Windows) through `fs2`. The lock is released when the guard is dropped.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use fs2::FileExt;

use super::error::{StorageError, StorageResult};

/// A file-backed lock that serializes storage mutations across processes.
#[derive(Debug, Clone)]
pub struct StorageLock {
    file: Arc<File>,
}

/// Guard that holds an exclusive lock for its lifetime.
#[derive(Debug)]
pub struct StorageLockGuard {
    file: Arc<File>,
}

impl StorageLock {
    /// Opens or creates the lock file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| map_io_err(&err))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| map_io_err(&err))?;
        Ok(Self {
            file: Arc::new(file),
        })
    }

    /// Blocks until the exclusive lock is acquired.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired.
    pub fn lock(&self) -> StorageResult<StorageLockGuard> {
        FileExt::lock_exclusive(&*self.file).map_err(|err| map_io_err(&err))?;
        Ok(StorageLockGuard {
            file: Arc::clone(&self.file),
        })
    }

    /// Attempts to acquire the exclusive lock without blocking.
    ///
    /// Returns `Ok(None)` when another holder owns the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt fails for any other reason.
    pub fn try_lock(&self) -> StorageResult<Option<StorageLockGuard>> {
        match FileExt::try_lock_exclusive(&*self.file) {
            Ok(()) => Ok(Some(StorageLockGuard {
                file: Arc::clone(&self.file),
            })),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(err) => Err(map_io_err(&err)),
        }
    }
}

impl Drop for StorageLockGuard {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&*self.file) {
            tracing::warn!(error = %err, "failed to release storage lock");
        }
    }
}

fn map_io_err(err: &std::io::Error) -> StorageError {
    StorageError::Lock(err.to_string())
}
