//! Zero-knowledge identities and the active-identity selection.

use std::fmt;
use std::sync::Arc;

use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::collection::{EncryptedCollection, EntityCodec};
use crate::crypto::{CryptoEngine, CryptoError, KeySource};
use crate::error::{VaultError, VaultResult};
use crate::events::{EventBus, EventName};
use crate::history::{HistoryService, OperationType};
use crate::lock::LockController;
use crate::notification::{ellipsify, Notification, Notifier};
use crate::storage::{BlobStore, CollectionKey};

const SECRET_SIZE: usize = 32;
const IDENTITY_SALT: &[u8] = b"keeper:identity:v1";
const COMMITMENT_DOMAIN: &[u8] = b"keeper:commitment:v1";

/// How an identity's secret was obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IdentityStrategy {
    /// Fresh randomness.
    #[default]
    Random,
    /// Derived from a wallet signature, so it can be recreated.
    Interrep,
}

/// User-facing data attached to an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMetadata {
    /// Display name.
    pub name: String,
    /// Strategy the identity was created with.
    #[serde(default)]
    pub identity_strategy: IdentityStrategy,
    /// Host the identity was created for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Groups the identity joined.
    #[serde(default)]
    pub groups: Vec<String>,
    /// `true` when the secret was derived from a signature.
    #[serde(default)]
    pub is_deterministic: bool,
    /// Wallet account that signed the derivation message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Web2 provider used for reputation-based identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web2_provider: Option<String>,
}

/// Trapdoor and nullifier of an identity. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct IdentitySecret {
    trapdoor: [u8; SECRET_SIZE],
    nullifier: [u8; SECRET_SIZE],
}

impl IdentitySecret {
    fn from_seed(seed: &[u8]) -> VaultResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(IDENTITY_SALT), seed);
        let mut secret = Self {
            trapdoor: [0u8; SECRET_SIZE],
            nullifier: [0u8; SECRET_SIZE],
        };
        hk.expand(b"trapdoor", &mut secret.trapdoor)
            .and_then(|()| hk.expand(b"nullifier", &mut secret.nullifier))
            .map_err(|err| CryptoError::KeyDerivation(err.to_string()))?;
        Ok(secret)
    }

    /// Trapdoor bytes.
    #[must_use]
    pub const fn trapdoor(&self) -> &[u8; SECRET_SIZE] {
        &self.trapdoor
    }

    /// Nullifier bytes.
    #[must_use]
    pub const fn nullifier(&self) -> &[u8; SECRET_SIZE] {
        &self.nullifier
    }

    fn commitment(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(COMMITMENT_DOMAIN);
        hasher.update(self.nullifier);
        hasher.update(self.trapdoor);
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

impl fmt::Debug for IdentitySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentitySecret([REDACTED])")
    }
}

/// A Semaphore-style identity: secret, public commitment and metadata.
#[derive(Debug, Clone)]
pub struct ZkIdentity {
    secret: IdentitySecret,
    commitment: String,
    metadata: IdentityMetadata,
}

impl PartialEq for ZkIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.commitment == other.commitment && self.metadata == other.metadata
    }
}

impl ZkIdentity {
    /// Creates an identity from fresh randomness.
    ///
    /// # Errors
    ///
    /// Returns an error if secret expansion fails.
    pub fn random(metadata: IdentityMetadata) -> VaultResult<Self> {
        let mut seed = Zeroizing::new([0u8; SECRET_SIZE]);
        OsRng.fill_bytes(&mut seed[..]);
        Self::from_seed(&seed[..], metadata)
    }

    /// Recreates the identity bound to `message_signature`.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidPayload`] for an empty signature.
    pub fn from_signature(message_signature: &str, mut metadata: IdentityMetadata) -> VaultResult<Self> {
        if message_signature.trim().is_empty() {
            return Err(VaultError::InvalidPayload("message signature is required".into()));
        }
        metadata.is_deterministic = true;
        Self::from_seed(message_signature.trim().as_bytes(), metadata)
    }

    fn from_seed(seed: &[u8], metadata: IdentityMetadata) -> VaultResult<Self> {
        let secret = IdentitySecret::from_seed(seed)?;
        let commitment = secret.commitment();
        Ok(Self {
            secret,
            commitment,
            metadata,
        })
    }

    /// Public commitment, a `0x`-prefixed hex digest of the secret.
    #[must_use]
    pub fn commitment(&self) -> &str {
        &self.commitment
    }

    /// Identity metadata.
    #[must_use]
    pub const fn metadata(&self) -> &IdentityMetadata {
        &self.metadata
    }

    /// Secret material, for the proving backend.
    #[must_use]
    pub const fn secret(&self) -> &IdentitySecret {
        &self.secret
    }

    /// Renames the identity.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.metadata.name = name.into();
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredIdentity {
    trapdoor: String,
    nullifier: String,
    commitment: String,
    metadata: IdentityMetadata,
}

/// Codec for the identities collection.
///
/// Decoding recomputes the commitment and rejects records where it does not
/// match the stored one.
pub struct IdentityCodec;

impl EntityCodec for IdentityCodec {
    type Entity = ZkIdentity;

    fn serialize(entity: &ZkIdentity) -> VaultResult<String> {
        let stored = StoredIdentity {
            trapdoor: hex::encode(entity.secret.trapdoor),
            nullifier: hex::encode(entity.secret.nullifier),
            commitment: entity.commitment.clone(),
            metadata: entity.metadata.clone(),
        };
        Ok(serde_json::to_string(&stored)?)
    }

    fn deserialize(raw: &str) -> VaultResult<ZkIdentity> {
        let mut stored: StoredIdentity = serde_json::from_str(raw)?;
        let secret = IdentitySecret {
            trapdoor: decode_secret(&stored.trapdoor)?,
            nullifier: decode_secret(&stored.nullifier)?,
        };
        stored.trapdoor.zeroize();
        stored.nullifier.zeroize();

        let commitment = secret.commitment();
        if commitment != stored.commitment {
            return Err(VaultError::Serialization(format!(
                "identity commitment mismatch for {}",
                stored.commitment
            )));
        }
        Ok(ZkIdentity {
            secret,
            commitment,
            metadata: stored.metadata,
        })
    }

    fn key_of(entity: &ZkIdentity) -> String {
        entity.commitment.clone()
    }
}

fn decode_secret(encoded: &str) -> VaultResult<[u8; SECRET_SIZE]> {
    let mut out = [0u8; SECRET_SIZE];
    hex::decode_to_slice(encoded, &mut out)
        .map_err(|err| VaultError::Serialization(format!("invalid identity secret: {err}")))?;
    Ok(out)
}

/// Parameters of `create-identity`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdentityRequest {
    /// Creation strategy.
    #[serde(default)]
    pub strategy: IdentityStrategy,
    /// Display name; defaults to `Account #<n>`.
    #[serde(default)]
    pub name: Option<String>,
    /// Wallet signature seeding an `interrep` identity.
    #[serde(default)]
    pub message_signature: Option<String>,
    /// Wallet account that produced the signature.
    #[serde(default)]
    pub account: Option<String>,
    /// Groups to record.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Host that requested the identity.
    #[serde(default)]
    pub host: Option<String>,
    /// Web2 provider for reputation-based identities.
    #[serde(default)]
    pub web2_provider: Option<String>,
}

/// Public view of a stored identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    /// Identity commitment.
    pub commitment: String,
    /// Identity metadata.
    pub metadata: IdentityMetadata,
}

impl From<&ZkIdentity> for IdentitySummary {
    fn from(identity: &ZkIdentity) -> Self {
        Self {
            commitment: identity.commitment.clone(),
            metadata: identity.metadata.clone(),
        }
    }
}

#[derive(Serialize)]
struct CommitmentPayload<'a> {
    commitment: Option<&'a str>,
}

/// Identity collection plus active-identity bookkeeping.
pub struct IdentityService {
    identities: EncryptedCollection<IdentityCodec>,
    lock: Arc<LockController>,
    store: Arc<dyn BlobStore>,
    events: EventBus,
    notifier: Arc<dyn Notifier>,
    history: Arc<HistoryService>,
}

impl fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityService")
            .field("identities", &self.identities)
            .finish_non_exhaustive()
    }
}

impl IdentityService {
    /// Creates the service over the `@@ID@@` and `@@AID@@` blobs.
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
            identities: EncryptedCollection::new(
                CollectionKey::Identities,
                KeySource::Password,
                Arc::clone(&lock),
                Arc::clone(&store),
                crypto,
            ),
            lock,
            store,
            events,
            notifier,
            history,
        }
    }

    /// Underlying collection, for backups.
    #[must_use]
    pub const fn collection(&self) -> &EncryptedCollection<IdentityCodec> {
        &self.identities
    }

    /// Selects a default identity after unlock.
    ///
    /// # Errors
    ///
    /// Returns an error if the identities cannot be read.
    pub fn on_unlock(&self) -> VaultResult<()> {
        self.ensure_active()
    }

    /// Selects the first stored identity when none (or a missing one) is active.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker or the identities cannot be read or written.
    pub fn ensure_active(&self) -> VaultResult<()> {
        if self.get_active_identity()?.is_none() {
            self.select_default()?;
        }
        Ok(())
    }

    /// Creates and stores an identity. Returns its commitment, or `None` if it already exists.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidPayload`] for an `interrep` request without signature.
    pub fn create_identity(&self, request: CreateIdentityRequest) -> VaultResult<Option<String>> {
        let name = match request.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => format!("Account #{}", self.identities.len()? + 1),
        };
        let metadata = IdentityMetadata {
            name,
            identity_strategy: request.strategy,
            host: request.host,
            groups: request.groups,
            is_deterministic: false,
            account: request.account,
            web2_provider: request.web2_provider,
        };

        let identity = match request.strategy {
            IdentityStrategy::Random => ZkIdentity::random(metadata)?,
            IdentityStrategy::Interrep => ZkIdentity::from_signature(
                request.message_signature.as_deref().unwrap_or_default(),
                metadata,
            )?,
        };

        let commitment = identity.commitment().to_string();
        Ok(self.insert(&identity)?.then_some(commitment))
    }

    /// Stores `identity` and makes it active. Returns `false` if it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be written.
    pub fn insert(&self, identity: &ZkIdentity) -> VaultResult<bool> {
        if !self.identities.insert(identity)? {
            return Ok(false);
        }
        self.notifier.notify(&Notification::new(
            "New identity has been created.",
            format!("Identity commitment: {}", ellipsify(identity.commitment())),
        ));
        self.history
            .track_operation(OperationType::CreateIdentity, Some(identity.commitment()))?;
        self.write_active(Some(identity.commitment()))?;
        Ok(true)
    }

    /// Makes the identity with `commitment` active. Returns `false` if unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the identities cannot be read or the marker written.
    pub fn set_active_identity(&self, commitment: &str) -> VaultResult<bool> {
        if !self.identities.contains(commitment)? {
            return Ok(false);
        }
        self.write_active(Some(commitment))?;
        Ok(true)
    }

    /// The active identity, if one is selected and still stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker or the identities cannot be read.
    pub fn get_active_identity(&self) -> VaultResult<Option<ZkIdentity>> {
        let Some(commitment) = self.read_active()? else {
            return Ok(None);
        };
        self.identities.get(&commitment)
    }

    /// Renames an identity. Returns `false` if unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be written.
    pub fn set_identity_name(&self, commitment: &str, name: &str) -> VaultResult<bool> {
        self.identities
            .update(commitment, |identity| identity.set_name(name))
    }

    /// Deletes an identity, reselecting the active one if needed. Returns `false` if unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be written.
    pub fn delete_identity(&self, commitment: &str) -> VaultResult<bool> {
        let was_active = self.read_active()?.as_deref() == Some(commitment);
        if !self.identities.remove(commitment)? {
            return Ok(false);
        }
        self.history
            .track_operation(OperationType::DeleteIdentity, Some(commitment))?;
        if was_active {
            self.select_default()?;
        }
        Ok(true)
    }

    /// Deletes every identity and clears the selection. Returns `false` if there were none.
    ///
    /// # Errors
    ///
    /// Returns an error if the blobs cannot be deleted.
    pub fn delete_all_identities(&self) -> VaultResult<bool> {
        if self.identities.is_empty()? {
            return Ok(false);
        }
        self.identities.clear()?;
        self.write_active(None)?;
        self.history
            .track_operation(OperationType::DeleteAllIdentities, None)?;
        Ok(true)
    }

    /// Public views of every identity, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the identities cannot be read.
    pub fn get_identities(&self) -> VaultResult<Vec<IdentitySummary>> {
        Ok(self
            .identities
            .get_all()?
            .iter()
            .map(IdentitySummary::from)
            .collect())
    }

    /// Commitments of every identity, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the identities cannot be read.
    pub fn get_identity_commitments(&self) -> VaultResult<Vec<String>> {
        self.identities.keys()
    }

    /// Number of stored identities.
    ///
    /// # Errors
    ///
    /// Returns an error if the identities cannot be read.
    pub fn count(&self) -> VaultResult<usize> {
        self.identities.len()
    }

    /// Reveals the active commitment to the requesting host.
    ///
    /// # Errors
    ///
    /// [`VaultError::NoActiveIdentity`] if no identity is selected.
    pub fn reveal_active_commitment(&self) -> VaultResult<String> {
        let identity = self
            .get_active_identity()?
            .ok_or(VaultError::NoActiveIdentity)?;
        let commitment = identity.commitment().to_string();
        self.events.publish(
            EventName::RevealCommitment,
            CommitmentPayload {
                commitment: Some(&commitment),
            },
        );
        Ok(commitment)
    }

    fn select_default(&self) -> VaultResult<()> {
        let first = self.identities.keys()?.into_iter().next();
        self.write_active(first.as_deref())
    }

    fn read_active(&self) -> VaultResult<Option<String>> {
        let Some(blob) = self.store.read(CollectionKey::ActiveIdentity.as_str())? else {
            return Ok(None);
        };
        let ciphertext =
            String::from_utf8(blob).map_err(|err| VaultError::Serialization(err.to_string()))?;
        let commitment = String::from_utf8(self.lock.decrypt(&ciphertext, KeySource::Password)?)
            .map_err(|err| VaultError::Serialization(err.to_string()))?;
        Ok((!commitment.is_empty()).then_some(commitment))
    }

    fn write_active(&self, commitment: Option<&str>) -> VaultResult<()> {
        match commitment {
            Some(commitment) => {
                let ciphertext = self.lock.encrypt(commitment.as_bytes(), KeySource::Password)?;
                self.store
                    .write_atomic(CollectionKey::ActiveIdentity.as_str(), ciphertext.as_bytes())?;
            }
            None => self.store.delete(CollectionKey::ActiveIdentity.as_str())?,
        }
        tracing::debug!(active = commitment.is_some(), "active identity changed");
        self.events
            .publish(EventName::IdentityChanged, CommitmentPayload { commitment });
        Ok(())
    }
}
