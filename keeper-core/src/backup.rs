//! Export and import of encrypted collections.
//!
//! A collection is exported by decrypting its blob with the session key and
//! re-encrypting the plaintext under a key derived from a backup password. The
//! resulting [`BackupPackage`] carries an HMAC tag over the new ciphertext,
//! which is verified before anything is decrypted on import.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use zeroize::Zeroizing;

use crate::approval::ApprovalService;
use crate::collection::{parse_entries, EncryptedCollection, Entries, EntityCodec};
use crate::credential::CredentialService;
use crate::crypto::KeySource;
use crate::error::{VaultError, VaultResult};
use crate::history::{HistoryService, OperationType};
use crate::identity::IdentityService;
use crate::lock::LockController;
use crate::storage::CollectionKey;

/// Version of the [`BackupBundle`] layout.
pub const BACKUP_VERSION: u32 = 1;

/// One exported collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPackage {
    /// Collection plaintext sealed under the backup-password key.
    pub ciphertext: String,
    /// Hex HMAC-SHA256 over `ciphertext`.
    pub tag: String,
}

/// How imported entries combine with existing ones sharing a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MergePolicy {
    /// The imported entry replaces the existing one.
    #[default]
    Overwrite,
    /// The existing entry is kept.
    PreserveExisting,
}

/// Merges `incoming` into `existing`.
///
/// Existing keys keep their position; new keys are appended in import order.
#[must_use]
pub fn merge_entries(mut existing: Entries, incoming: Entries, policy: MergePolicy) -> Entries {
    for (key, value) in incoming {
        match existing.iter_mut().find(|(existing_key, _)| *existing_key == key) {
            Some(slot) => {
                if policy == MergePolicy::Overwrite {
                    slot.1 = value;
                }
            }
            None => existing.push((key, value)),
        }
    }
    existing
}

/// A collection that can take part in backups.
pub trait Backupable: Send + Sync {
    /// Blob name, also the collection's name inside a [`BackupBundle`].
    fn backup_key(&self) -> CollectionKey;

    /// Re-encrypts the collection under `backup_password`. `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be decrypted or sealed.
    fn export_encrypted(&self, backup_password: &str) -> VaultResult<Option<BackupPackage>>;

    /// Verifies and opens `package`, checking every entry decodes.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Authentication`] if the tag does not match; nothing is decrypted.
    /// - [`VaultError::Decryption`] if the ciphertext does not open.
    /// - A decoding error if any entry is invalid.
    fn open_package(&self, package: &BackupPackage, backup_password: &str) -> VaultResult<Entries>;

    /// Merges already-verified entries into the collection and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read or written.
    fn merge_into(&self, incoming: Entries, policy: MergePolicy) -> VaultResult<()>;

    /// Fails unless the session could currently persist this collection.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] or [`VaultError::MnemonicNotSet`].
    fn ensure_writable(&self) -> VaultResult<()>;

    /// Verifies, opens and merges `package`.
    ///
    /// # Errors
    ///
    /// See [`Backupable::open_package`] and [`Backupable::merge_into`].
    fn import_encrypted(
        &self,
        package: &BackupPackage,
        backup_password: &str,
        policy: MergePolicy,
    ) -> VaultResult<()> {
        let incoming = self.open_package(package, backup_password)?;
        self.merge_into(incoming, policy)
    }

    /// The raw stored ciphertext.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn download_storage(&self) -> VaultResult<Option<String>>;

    /// Overwrites the raw ciphertext: `null` clears, a string is written as is.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidBackupFormat`] for any other JSON value.
    fn restore_storage(&self, data: &Value) -> VaultResult<()>;
}

impl<C: EntityCodec> Backupable for EncryptedCollection<C> {
    fn backup_key(&self) -> CollectionKey {
        self.key()
    }

    fn export_encrypted(&self, backup_password: &str) -> VaultResult<Option<BackupPackage>> {
        let Some(ciphertext) = self.read_ciphertext()? else {
            return Ok(None);
        };
        let plaintext = Zeroizing::new(self.lock().decrypt(&ciphertext, self.source())?);

        let crypto = self.crypto();
        let backup_key = crypto.derive_key(backup_password, KeySource::Backup)?;
        let ciphertext = crypto.encrypt(&plaintext, &backup_key)?;
        let tag = crypto.compute_auth_tag(&ciphertext, backup_password)?;
        tracing::debug!(collection = %self.key(), "collection exported");
        Ok(Some(BackupPackage { ciphertext, tag }))
    }

    fn open_package(&self, package: &BackupPackage, backup_password: &str) -> VaultResult<Entries> {
        let crypto = self.crypto();
        if !crypto.verify_auth_tag(&package.ciphertext, &package.tag, backup_password)? {
            tracing::warn!(collection = %self.key(), "backup tag mismatch");
            return Err(VaultError::Authentication);
        }

        let backup_key = crypto.derive_key(backup_password, KeySource::Backup)?;
        let plaintext = Zeroizing::new(crypto.decrypt(&package.ciphertext, &backup_key)?);
        let entries = parse_entries(&plaintext)?;
        for (key, raw) in &entries {
            let entity = C::deserialize(raw)?;
            if C::key_of(&entity) != *key {
                return Err(VaultError::InvalidBackupFormat(format!(
                    "entry {key} is stored under the wrong key"
                )));
            }
        }
        Ok(entries)
    }

    fn merge_into(&self, incoming: Entries, policy: MergePolicy) -> VaultResult<()> {
        let count = incoming.len();
        let merged = merge_entries(self.entries()?, incoming, policy);
        self.replace_all(&merged)?;
        tracing::debug!(collection = %self.key(), imported = count, %policy, "collection imported");
        Ok(())
    }

    fn ensure_writable(&self) -> VaultResult<()> {
        self.lock().encrypt(&[], self.source()).map(|_| ())
    }

    fn download_storage(&self) -> VaultResult<Option<String>> {
        self.read_ciphertext()
    }

    fn restore_storage(&self, data: &Value) -> VaultResult<()> {
        match data {
            Value::Null => self.clear(),
            Value::String(ciphertext) => self.write_ciphertext(ciphertext),
            other => Err(VaultError::InvalidBackupFormat(format!(
                "expected string or null for {}, found {other}",
                self.key()
            ))),
        }
    }
}

/// Combined backup of every backupable collection, keyed by blob name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupBundle {
    /// Layout version.
    pub version: u32,
    /// Exported collections. Collections with nothing stored are omitted.
    pub collections: BTreeMap<String, BackupPackage>,
}

impl Default for BackupBundle {
    fn default() -> Self {
        Self {
            version: BACKUP_VERSION,
            collections: BTreeMap::new(),
        }
    }
}

/// Produces and consumes [`BackupBundle`]s.
pub struct BackupService {
    lock: Arc<LockController>,
    identities: Arc<IdentityService>,
    credentials: Arc<CredentialService>,
    approvals: Arc<ApprovalService>,
    history: Arc<HistoryService>,
    policy: MergePolicy,
}

impl std::fmt::Debug for BackupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupService")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BackupService {
    /// Creates the service over the identities, credentials and approvals collections.
    #[must_use]
    pub const fn new(
        lock: Arc<LockController>,
        identities: Arc<IdentityService>,
        credentials: Arc<CredentialService>,
        approvals: Arc<ApprovalService>,
        history: Arc<HistoryService>,
        policy: MergePolicy,
    ) -> Self {
        Self {
            lock,
            identities,
            credentials,
            approvals,
            history,
            policy,
        }
    }

    /// Merge policy applied on upload.
    #[must_use]
    pub const fn policy(&self) -> MergePolicy {
        self.policy
    }

    fn backupables(&self) -> [&dyn Backupable; 3] {
        [
            self.identities.collection(),
            self.credentials.collection(),
            self.approvals.collection(),
        ]
    }

    fn find(&self, name: &str) -> VaultResult<&dyn Backupable> {
        self.backupables()
            .into_iter()
            .find(|backupable| backupable.backup_key().as_str() == name)
            .ok_or_else(|| VaultError::InvalidBackupFormat(format!("unknown collection {name}")))
    }

    /// Exports every non-empty collection under `backup_password`.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] without a session; otherwise any export failure.
    pub fn download_backup(&self, backup_password: &str) -> VaultResult<BackupBundle> {
        self.require_session(backup_password)?;
        let mut bundle = BackupBundle::default();
        for backupable in self.backupables() {
            if let Some(package) = backupable.export_encrypted(backup_password)? {
                bundle
                    .collections
                    .insert(backupable.backup_key().as_str().to_string(), package);
            }
        }
        self.history
            .track_operation(OperationType::DownloadBackup, None)?;
        tracing::info!(collections = bundle.collections.len(), "backup downloaded");
        Ok(bundle)
    }

    /// Imports `bundle`. Every package is verified and decoded before anything is written.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Locked`] without a session.
    /// - [`VaultError::InvalidBackupFormat`] for an unknown version or collection.
    /// - [`VaultError::Authentication`] if any tag does not match.
    pub fn upload_backup(&self, bundle: &BackupBundle, backup_password: &str) -> VaultResult<()> {
        self.require_session(backup_password)?;
        if bundle.version != BACKUP_VERSION {
            return Err(VaultError::InvalidBackupFormat(format!(
                "unsupported backup version {}",
                bundle.version
            )));
        }

        let mut staged = Vec::with_capacity(bundle.collections.len());
        for (name, package) in &bundle.collections {
            let backupable = self.find(name)?;
            let entries = backupable.open_package(package, backup_password)?;
            backupable.ensure_writable()?;
            staged.push((backupable, entries));
        }

        for (backupable, entries) in staged {
            backupable.merge_into(entries, self.policy)?;
        }
        self.identities.ensure_active()?;
        self.history
            .track_operation(OperationType::UploadBackup, None)?;
        tracing::info!(collections = bundle.collections.len(), "backup uploaded");
        Ok(())
    }

    /// Raw ciphertext of every collection, keyed by blob name (`null` when absent).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn download_storage(&self) -> VaultResult<BTreeMap<String, Value>> {
        self.backupables()
            .into_iter()
            .map(|backupable| {
                Ok((
                    backupable.backup_key().as_str().to_string(),
                    backupable
                        .download_storage()?
                        .map_or(Value::Null, Value::String),
                ))
            })
            .collect()
    }

    /// Restores raw ciphertext produced by [`BackupService::download_storage`].
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidBackupFormat`] for unknown collections or non-string values.
    pub fn restore_storage(&self, data: &BTreeMap<String, Value>) -> VaultResult<()> {
        let mut staged = Vec::with_capacity(data.len());
        for (name, value) in data {
            let backupable = self.find(name)?;
            if !matches!(value, Value::Null | Value::String(_)) {
                return Err(VaultError::InvalidBackupFormat(format!(
                    "expected string or null for {name}"
                )));
            }
            staged.push((backupable, value));
        }
        for (backupable, value) in staged {
            backupable.restore_storage(value)?;
        }
        if self.lock.is_unlocked() {
            self.identities.ensure_active()?;
        }
        Ok(())
    }

    fn require_session(&self, backup_password: &str) -> VaultResult<()> {
        if !self.lock.is_unlocked() {
            return Err(VaultError::Locked);
        }
        if backup_password.is_empty() {
            return Err(VaultError::PasswordNotProvided);
        }
        Ok(())
    }
}
