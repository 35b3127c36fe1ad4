//! Verifiable credentials held by the wallet.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::collection::{EncryptedCollection, JsonCodec, Keyed};
use crate::crypto::{CryptoEngine, KeySource};
use crate::error::{VaultError, VaultResult};
use crate::events::{EventBus, EventName};
use crate::history::{HistoryService, OperationType};
use crate::lock::LockController;
use crate::notification::{Notification, Notifier};
use crate::storage::{BlobStore, CollectionKey};

const VC_TYPE: &str = "VerifiableCredential";
const DEFAULT_CREDENTIAL_NAME: &str = "Verifiable Credential";

/// A W3C verifiable credential, kept as received apart from field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    /// JSON-LD contexts.
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    /// Credential id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Credential types; must include `VerifiableCredential`.
    #[serde(rename = "type")]
    pub kind: Vec<String>,
    /// Issuer, as an id string or an object with an `id`.
    pub issuer: Value,
    /// Issuance timestamp.
    pub issuance_date: String,
    /// Expiration timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    /// Claims about the subject.
    pub credential_subject: Value,
    /// Revocation information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<Value>,
    /// Issuer proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Value>,
    /// Every other member (`evidence`, `termsOfUse`, `refreshService`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VerifiableCredential {
    /// Parses and validates a serialized credential.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidCredential`] if `serialized` is not a well-formed credential.
    pub fn parse(serialized: &str) -> VaultResult<Self> {
        let credential: Self = serde_json::from_str(serialized)
            .map_err(|err| VaultError::InvalidCredential(err.to_string()))?;
        credential.validate()?;
        Ok(credential)
    }

    fn validate(&self) -> VaultResult<()> {
        if self.context.is_empty() {
            return Err(VaultError::InvalidCredential("@context is empty".into()));
        }
        if !self.kind.iter().any(|kind| kind == VC_TYPE) {
            return Err(VaultError::InvalidCredential(format!(
                "type must include {VC_TYPE}"
            )));
        }
        let issuer_ok = match &self.issuer {
            Value::String(id) => !id.is_empty(),
            Value::Object(map) => map
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| !id.is_empty()),
            _ => false,
        };
        if !issuer_ok {
            return Err(VaultError::InvalidCredential("issuer is missing".into()));
        }
        if self.issuance_date.trim().is_empty() {
            return Err(VaultError::InvalidCredential("issuanceDate is missing".into()));
        }
        if !self.credential_subject.is_object() {
            return Err(VaultError::InvalidCredential(
                "credentialSubject must be an object".into(),
            ));
        }
        Ok(())
    }

    /// Hex SHA-256 of the credential's canonical JSON.
    ///
    /// Unnamed members are part of the digest; they serialize in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential cannot be serialized.
    pub fn hash(&self) -> VaultResult<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(canonical)))
    }
}

/// Wallet-side data about a stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMetadata {
    /// Display name.
    pub name: String,
    /// Content hash, also the collection key.
    pub hash: String,
}

/// A credential together with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    /// The credential.
    pub verifiable_credential: VerifiableCredential,
    /// Wallet-side metadata.
    pub metadata: CredentialMetadata,
}

impl Keyed for StoredCredential {
    fn key(&self) -> String {
        self.metadata.hash.clone()
    }
}

#[derive(Serialize)]
struct CredentialAdded<'a> {
    hash: &'a str,
    name: &'a str,
}

/// Credential collection, sealed with the mnemonic key.
pub struct CredentialService {
    credentials: EncryptedCollection<JsonCodec<StoredCredential>>,
    events: EventBus,
    notifier: Arc<dyn Notifier>,
    history: Arc<HistoryService>,
}

impl fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialService")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl CredentialService {
    /// Creates the service over the `@@VERIFIABLE-CREDENTIALS@@` blob.
    #[must_use]
    pub fn new(
        lock: Arc<LockController>,
        store: Arc<dyn BlobStore>,
        crypto: CryptoEngine,
        events: EventBus,
        notifier: Arc<dyn Notifier>,
        history: Arc<HistoryService>,
    ) -> Self {
        Self {
            credentials: EncryptedCollection::new(
                CollectionKey::Credentials,
                KeySource::Mnemonic,
                lock,
                store,
                crypto,
            ),
            events,
            notifier,
            history,
        }
    }

    /// Underlying collection, for backups.
    #[must_use]
    pub const fn collection(&self) -> &EncryptedCollection<JsonCodec<StoredCredential>> {
        &self.credentials
    }

    /// Validates and stores a serialized credential.
    ///
    /// Returns `false` for an empty input or a credential that is already stored.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidCredential`] if the credential is malformed; the user is notified.
    pub fn add_credential(&self, serialized: &str, name: Option<&str>) -> VaultResult<bool> {
        if serialized.trim().is_empty() {
            return Ok(false);
        }

        let credential = match VerifiableCredential::parse(serialized) {
            Ok(credential) => credential,
            Err(err) => {
                self.notifier.notify(&Notification::new(
                    "Failed to add Verifiable Credential.",
                    "The Verifiable Credential you are trying to add is invalid.",
                ));
                return Err(err);
            }
        };

        let stored = StoredCredential {
            metadata: CredentialMetadata {
                name: name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or(DEFAULT_CREDENTIAL_NAME)
                    .to_string(),
                hash: credential.hash()?,
            },
            verifiable_credential: credential,
        };

        if !self.credentials.insert(&stored)? {
            self.notifier.notify(&Notification::new(
                "Failed to add Verifiable Credential.",
                "The Verifiable Credential you are trying to add already exists in your wallet.",
            ));
            return Ok(false);
        }

        self.history
            .track_operation(OperationType::AddVerifiableCredential, None)?;
        self.notifier.notify(&Notification::new(
            "Verifiable Credential added.",
            "Added 1 Verifiable Credential.",
        ));
        self.events.publish(
            EventName::CredentialAdded,
            CredentialAdded {
                hash: &stored.metadata.hash,
                name: &stored.metadata.name,
            },
        );
        Ok(true)
    }

    /// Records that the user declined a request to add a credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be written.
    pub fn reject_credential_request(&self) -> VaultResult<()> {
        self.history
            .track_operation(OperationType::RejectVerifiableCredentialRequest, None)?;
        self.notifier.notify(&Notification::new(
            "Request to add Verifiable Credential rejected",
            "Rejected a request to add 1 Verifiable Credential.",
        ));
        self.events.publish(EventName::CredentialRejected, ());
        Ok(())
    }

    /// Renames a credential. Returns `false` if unknown or `name` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be written.
    pub fn rename_credential(&self, hash: &str, name: &str) -> VaultResult<bool> {
        if hash.is_empty() || name.trim().is_empty() {
            return Ok(false);
        }
        if !self
            .credentials
            .update(hash, |stored| stored.metadata.name = name.to_string())?
        {
            return Ok(false);
        }
        self.history
            .track_operation(OperationType::RenameVerifiableCredential, None)?;
        self.notifier.notify(&Notification::new(
            "Verifiable Credential renamed.",
            "Renamed 1 Verifiable Credential.",
        ));
        Ok(true)
    }

    /// Deletes a credential. Returns `false` if unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be written.
    pub fn delete_credential(&self, hash: &str) -> VaultResult<bool> {
        if hash.is_empty() || !self.credentials.remove(hash)? {
            return Ok(false);
        }
        self.history
            .track_operation(OperationType::DeleteVerifiableCredential, None)?;
        self.notifier.notify(&Notification::new(
            "Verifiable Credential deleted.",
            "Deleted 1 Verifiable Credential.",
        ));
        Ok(true)
    }

    /// Deletes every credential. Returns `false` if there were none.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be deleted.
    pub fn delete_all_credentials(&self) -> VaultResult<bool> {
        let count = self.credentials.len()?;
        if count == 0 {
            return Ok(false);
        }
        self.credentials.clear()?;
        self.history
            .track_operation(OperationType::DeleteAllVerifiableCredentials, None)?;
        self.notifier.notify(&Notification::new(
            "All Verifiable Credentials deleted.",
            format!("Deleted {count} Verifiable Credential(s)."),
        ));
        Ok(true)
    }

    /// Every stored credential, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    pub fn get_all_credentials(&self) -> VaultResult<Vec<StoredCredential>> {
        self.credentials.get_all()
    }
}
