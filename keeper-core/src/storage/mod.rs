//! Persistence for the vault's encrypted blobs.
//!
//! The vault never stores anything but opaque ciphertext strings, one blob per
//! [`CollectionKey`]. Where those bytes live is up to the [`BlobStore`]
//! implementation handed to the vault.

mod envelope;
mod error;
mod file;
mod lock;
mod memory;
mod paths;
mod traits;

pub use error::{StorageError, StorageResult};
pub use file::FileBlobStore;
pub use lock::{StorageLock, StorageLockGuard};
pub use memory::InMemoryBlobStore;
pub use paths::StoragePaths;
pub use traits::BlobStore;

use serde::{Deserialize, Serialize};

/// Names of the blobs the vault persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKey {
    /// Serialized identities.
    Identities,
    /// Commitment of the active identity.
    ActiveIdentity,
    /// Stored verifiable credentials.
    Credentials,
    /// Host permissions.
    Approvals,
    /// Operation history.
    History,
    /// Encrypted password check marker.
    Password,
    /// Mnemonic phrase encrypted under the password key.
    Mnemonic,
}

impl CollectionKey {
    /// Every key, in a stable order.
    pub const ALL: [Self; 7] = [
        Self::Identities,
        Self::ActiveIdentity,
        Self::Credentials,
        Self::Approvals,
        Self::History,
        Self::Password,
        Self::Mnemonic,
    ];

    /// Returns the blob name used by the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identities => "@@ID@@",
            Self::ActiveIdentity => "@@AID@@",
            Self::Credentials => "@@VERIFIABLE-CREDENTIALS@@",
            Self::Approvals => "@APPROVED@",
            Self::History => "@@HISTORY@@",
            Self::Password => "@@PASSWORD@@",
            Self::Mnemonic => "@@MNEMONIC@@",
        }
    }

    /// Resolves a blob name back to its key.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

impl std::fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
