//! Append-only log of user-visible vault operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::collection::{EncryptedCollection, JsonCodec, Keyed};
use crate::crypto::{CryptoEngine, KeySource};
use crate::error::{VaultError, VaultResult};
use crate::lock::LockController;
use crate::storage::{BlobStore, CollectionKey};

/// Kind of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// An identity was created.
    CreateIdentity,
    /// An identity was deleted.
    DeleteIdentity,
    /// Every identity was deleted.
    DeleteAllIdentities,
    /// A credential was added.
    AddVerifiableCredential,
    /// A credential was renamed.
    RenameVerifiableCredential,
    /// A credential was deleted.
    DeleteVerifiableCredential,
    /// Every credential was deleted.
    DeleteAllVerifiableCredentials,
    /// A request to add a credential was rejected.
    RejectVerifiableCredentialRequest,
    /// A backup was downloaded.
    DownloadBackup,
    /// A backup was restored.
    UploadBackup,
}

/// One history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Record id.
    pub id: Uuid,
    /// What happened.
    #[serde(rename = "type")]
    pub kind: OperationType,
    /// Commitment of the identity involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
}

impl Operation {
    fn new(kind: OperationType, identity: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            identity: identity.map(ToString::to_string),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_secs()),
        }
    }
}

impl Keyed for Operation {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Records operations unless history is disabled.
#[derive(Debug)]
pub struct HistoryService {
    operations: EncryptedCollection<JsonCodec<Operation>>,
    enabled: AtomicBool,
}

impl HistoryService {
    /// Creates the service over the `@@HISTORY@@` blob.
    #[must_use]
    pub fn new(
        lock: Arc<LockController>,
        store: Arc<dyn BlobStore>,
        crypto: CryptoEngine,
        enabled: bool,
    ) -> Self {
        Self {
            operations: EncryptedCollection::new(
                CollectionKey::History,
                KeySource::Password,
                lock,
                store,
                crypto,
            ),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Appends a record. A no-op while history is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be written.
    pub fn track_operation(
        &self,
        kind: OperationType,
        identity: Option<&str>,
    ) -> VaultResult<Option<Operation>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let operation = Operation::new(kind, identity);
        self.operations.insert_unique(&operation)?;
        tracing::debug!(operation = %kind, "operation tracked");
        Ok(Some(operation))
    }

    /// Every record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read.
    pub fn get_operations(&self) -> VaultResult<Vec<Operation>> {
        self.operations.get_all()
    }

    /// Deletes one record.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] if no record has `id`.
    pub fn delete_operation(&self, id: &str) -> VaultResult<()> {
        if self.operations.remove(id)? {
            Ok(())
        } else {
            Err(VaultError::NotFound(id.to_string()))
        }
    }

    /// Deletes every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be deleted.
    pub fn clear(&self) -> VaultResult<()> {
        self.operations.clear()
    }

    /// Turns tracking on or off. Existing records are kept.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Returns `true` while tracking is on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
