//! Proof requests.
//!
//! The vault never runs proving circuits. It checks that a request is
//! well-formed, resolves the active identity and hands both to an injected
//! [`ProofBackend`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{VaultError, VaultResult};
use crate::identity::{IdentityService, ZkIdentity};
use crate::lock::LockController;
use crate::validation::{
    ArtifactsProofValidator, MerkleProof, MerkleProofArtifacts, MerkleProofValidator,
};

/// Where the prover gets its Merkle proof from.
///
/// Exactly one source is used, in the order: provided proof, artifacts, storage address.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleSource {
    /// A ready-made inclusion proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_proof_provided: Option<MerkleProof>,
    /// A tree description the prover builds the proof from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_proof_artifacts: Option<MerkleProofArtifacts>,
    /// URL the prover fetches the proof from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_storage_address: Option<String>,
}

impl MerkleSource {
    /// Validates whichever source is present.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidProofShape`] for a malformed proof or artifact descriptor.
    /// - [`VaultError::InvalidPayload`] when no source is given.
    pub fn validate(&self) -> VaultResult<()> {
        if let Some(proof) = &self.merkle_proof_provided {
            MerkleProofValidator::new(proof).validate_proof()?;
            return Ok(());
        }
        if let Some(artifacts) = &self.merkle_proof_artifacts {
            ArtifactsProofValidator::new(artifacts).validate_proof()?;
            return Ok(());
        }
        match self.merkle_storage_address.as_deref().map(str::trim) {
            Some(address) if !address.is_empty() => Ok(()),
            _ => Err(VaultError::InvalidPayload(
                "a merkle proof, artifacts or storage address is required".to_string(),
            )),
        }
    }
}

/// Semaphore proof request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemaphoreProofRequest {
    /// Scope of the nullifier.
    pub external_nullifier: String,
    /// Signal being proven.
    pub signal: String,
    /// Merkle material.
    #[serde(flatten)]
    pub merkle: MerkleSource,
}

/// Rate-limiting nullifier proof request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RlnProofRequest {
    /// Application identifier.
    pub rln_identifier: String,
    /// Message being proven.
    pub message: String,
    /// Index of the message within the epoch.
    #[serde(default)]
    pub message_id: u64,
    /// Messages allowed per epoch.
    #[serde(default = "default_message_limit")]
    pub message_limit: u64,
    /// Epoch identifier.
    pub epoch: String,
    /// Merkle material.
    #[serde(flatten)]
    pub merkle: MerkleSource,
}

const fn default_message_limit() -> u64 {
    1
}

impl RlnProofRequest {
    fn validate(&self) -> VaultResult<()> {
        if self.message_limit == 0 {
            return Err(VaultError::InvalidPayload(
                "messageLimit must be positive".to_string(),
            ));
        }
        if self.message_id >= self.message_limit {
            return Err(VaultError::InvalidPayload(format!(
                "messageId {} exceeds messageLimit {}",
                self.message_id, self.message_limit
            )));
        }
        self.merkle.validate()
    }
}

/// External prover.
pub trait ProofBackend: Send + Sync {
    /// Generates a Semaphore proof for `identity`.
    ///
    /// # Errors
    ///
    /// A description of the prover failure.
    fn semaphore_proof(
        &self,
        identity: &ZkIdentity,
        request: &SemaphoreProofRequest,
    ) -> Result<Value, String>;

    /// Generates an RLN proof for `identity`.
    ///
    /// # Errors
    ///
    /// A description of the prover failure.
    fn rln_proof(&self, identity: &ZkIdentity, request: &RlnProofRequest) -> Result<Value, String>;
}

/// Validates proof requests and forwards them to the backend.
pub struct ProofService {
    lock: Arc<LockController>,
    identities: Arc<IdentityService>,
    backend: Option<Arc<dyn ProofBackend>>,
}

impl fmt::Debug for ProofService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofService")
            .field("has_backend", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

impl ProofService {
    /// Creates the service. Without a backend every request fails after validation.
    #[must_use]
    pub fn new(
        lock: Arc<LockController>,
        identities: Arc<IdentityService>,
        backend: Option<Arc<dyn ProofBackend>>,
    ) -> Self {
        Self {
            lock,
            identities,
            backend,
        }
    }

    /// Validates and proves a Semaphore request with the active identity.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Locked`] without a session.
    /// - [`VaultError::NoActiveIdentity`] when no identity is selected.
    /// - A validation error for a malformed request.
    /// - [`VaultError::ProofBackendUnavailable`] or [`VaultError::ProofBackend`].
    pub fn prepare_semaphore_proof(&self, request: &SemaphoreProofRequest) -> VaultResult<Value> {
        let identity = self.active_identity()?;
        request.merkle.validate()?;
        let backend = self.backend()?;
        let proof = backend
            .semaphore_proof(&identity, request)
            .map_err(VaultError::ProofBackend)?;
        tracing::info!(kind = "semaphore", "proof generated");
        Ok(proof)
    }

    /// Validates and proves an RLN request with the active identity.
    ///
    /// # Errors
    ///
    /// See [`ProofService::prepare_semaphore_proof`].
    pub fn prepare_rln_proof(&self, request: &RlnProofRequest) -> VaultResult<Value> {
        let identity = self.active_identity()?;
        request.validate()?;
        let backend = self.backend()?;
        let proof = backend
            .rln_proof(&identity, request)
            .map_err(VaultError::ProofBackend)?;
        tracing::info!(kind = "rln", "proof generated");
        Ok(proof)
    }

    fn active_identity(&self) -> VaultResult<ZkIdentity> {
        if !self.lock.is_unlocked() {
            return Err(VaultError::Locked);
        }
        self.identities
            .get_active_identity()?
            .ok_or(VaultError::NoActiveIdentity)
    }

    fn backend(&self) -> VaultResult<&Arc<dyn ProofBackend>> {
        self.backend
            .as_ref()
            .ok_or(VaultError::ProofBackendUnavailable)
    }
}
