//! Storage path helpers.

use std::path::{Path, PathBuf};

const KEEPER_DIRNAME: &str = "keeper";
const BLOBS_DIRNAME: &str = "blobs";
const LOCK_FILENAME: &str = "lock";
const BLOB_EXTENSION: &str = "blob";

/// Paths for vault artifacts under `<root>/keeper`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    root: PathBuf,
    keeper_dir: PathBuf,
}

impl StoragePaths {
    /// Builds storage paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let keeper_dir = root.join(KEEPER_DIRNAME);
        Self { root, keeper_dir }
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the vault directory.
    #[must_use]
    pub fn keeper_dir(&self) -> &Path {
        &self.keeper_dir
    }

    /// Returns the directory holding one file per blob.
    #[must_use]
    pub fn blobs_dir(&self) -> PathBuf {
        self.keeper_dir.join(BLOBS_DIRNAME)
    }

    /// Returns the path to the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.keeper_dir.join(LOCK_FILENAME)
    }

    /// Returns the file holding blob `name`.
    ///
    /// Blob names contain `@` and `-`; the file name is their hex encoding so it
    /// is portable to every filesystem.
    #[must_use]
    pub fn blob_path(&self, name: &str) -> PathBuf {
        self.blobs_dir()
            .join(format!("{}.{BLOB_EXTENSION}", hex::encode(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_rooted() {
        let paths = StoragePaths::new("/tmp/data");
        assert_eq!(paths.keeper_dir(), Path::new("/tmp/data/keeper"));
        assert_eq!(paths.lock_path(), PathBuf::from("/tmp/data/keeper/lock"));
        assert_eq!(
            paths.blob_path("@@ID@@"),
            PathBuf::from("/tmp/data/keeper/blobs/404049444040.blob")
        );
    }
}
