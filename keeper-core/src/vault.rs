//! The vault is the entry point: it builds every service once over a shared
//! store, lock controller and event bus.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::approval::ApprovalService;
use crate::backup::BackupService;
use crate::config::VaultConfig;
use crate::credential::CredentialService;
use crate::crypto::CryptoEngine;
use crate::error::VaultResult;
use crate::events::{Event, EventBus};
use crate::history::HistoryService;
use crate::identity::IdentityService;
use crate::lock::{LockController, LockStatus};
use crate::notification::{LogNotifier, Notifier};
use crate::proof::{ProofBackend, ProofService};
use crate::storage::{BlobStore, InMemoryBlobStore};

/// Composition root owning every vault service.
pub struct Vault {
    config: VaultConfig,
    events: EventBus,
    lock: Arc<LockController>,
    history: Arc<HistoryService>,
    identities: Arc<IdentityService>,
    credentials: Arc<CredentialService>,
    approvals: Arc<ApprovalService>,
    backup: BackupService,
    proofs: ProofService,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("config", &self.config)
            .field("unlocked", &self.lock.is_unlocked())
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Starts building a vault over `store`.
    #[must_use]
    pub fn builder(store: Arc<dyn BlobStore>) -> VaultBuilder {
        VaultBuilder {
            store,
            config: VaultConfig::default(),
            notifier: Arc::new(LogNotifier),
            proof_backend: None,
        }
    }

    /// A vault whose blobs live only in memory.
    #[must_use]
    pub fn in_memory(config: VaultConfig) -> Self {
        Self::builder(Arc::new(InMemoryBlobStore::new()))
            .config(config)
            .build()
    }

    /// Sets up the password of a fresh vault and opens a session.
    ///
    /// # Errors
    ///
    /// See [`LockController::setup_password`].
    pub fn setup_password(&self, password: &str) -> VaultResult<LockStatus> {
        self.lock.setup_password(password)
    }

    /// Unlocks the vault, then selects a default identity if none is active.
    ///
    /// If the selection fails the session is closed again, so an `Err` always
    /// leaves the vault locked.
    ///
    /// # Errors
    ///
    /// See [`LockController::unlock`] and [`IdentityService::on_unlock`].
    pub fn unlock(&self, password: &str) -> VaultResult<bool> {
        let unlocked = self.lock.unlock(password)?;
        if let Err(err) = self.identities.on_unlock() {
            tracing::warn!(%err, "default identity selection failed; locking");
            self.lock.lock()?;
            return Err(err);
        }
        Ok(unlocked)
    }

    /// Drops the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the status cannot be read.
    pub fn lock(&self) -> VaultResult<LockStatus> {
        self.lock.lock()
    }

    /// Current lock status.
    ///
    /// # Errors
    ///
    /// Returns an error if the password marker cannot be read.
    pub fn status(&self) -> VaultResult<LockStatus> {
        self.lock.status()
    }

    /// Receives every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Configuration the vault was built with.
    #[must_use]
    pub const fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The session lock.
    #[must_use]
    pub const fn lock_controller(&self) -> &Arc<LockController> {
        &self.lock
    }

    /// Identity service.
    #[must_use]
    pub const fn identities(&self) -> &Arc<IdentityService> {
        &self.identities
    }

    /// Credential service.
    #[must_use]
    pub const fn credentials(&self) -> &Arc<CredentialService> {
        &self.credentials
    }

    /// Host approval service.
    #[must_use]
    pub const fn approvals(&self) -> &Arc<ApprovalService> {
        &self.approvals
    }

    /// Operation history.
    #[must_use]
    pub const fn history(&self) -> &Arc<HistoryService> {
        &self.history
    }

    /// Backup export and import.
    #[must_use]
    pub const fn backup(&self) -> &BackupService {
        &self.backup
    }

    /// Proof request handling.
    #[must_use]
    pub const fn proofs(&self) -> &ProofService {
        &self.proofs
    }
}

/// Configures and builds a [`Vault`].
pub struct VaultBuilder {
    store: Arc<dyn BlobStore>,
    config: VaultConfig,
    notifier: Arc<dyn Notifier>,
    proof_backend: Option<Arc<dyn ProofBackend>>,
}

impl fmt::Debug for VaultBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultBuilder")
            .field("config", &self.config)
            .field("has_proof_backend", &self.proof_backend.is_some())
            .finish_non_exhaustive()
    }
}

impl VaultBuilder {
    /// Replaces the default production configuration.
    #[must_use]
    pub fn config(mut self, config: VaultConfig) -> Self {
        self.config = config;
        self
    }

    /// Routes user notifications to `notifier` instead of the log.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Enables proof requests.
    #[must_use]
    pub fn proof_backend(mut self, backend: Arc<dyn ProofBackend>) -> Self {
        self.proof_backend = Some(backend);
        self
    }

    /// Wires every service.
    #[must_use]
    pub fn build(self) -> Vault {
        let Self {
            store,
            config,
            notifier,
            proof_backend,
        } = self;

        let crypto = CryptoEngine::new(config.kdf);
        let events = EventBus::new(config.event_capacity);
        let lock = Arc::new(LockController::new(
            crypto.clone(),
            Arc::clone(&store),
            events.clone(),
        ));
        let history = Arc::new(HistoryService::new(
            Arc::clone(&lock),
            Arc::clone(&store),
            crypto.clone(),
            config.history_enabled,
        ));
        let identities = Arc::new(IdentityService::new(
            Arc::clone(&lock),
            Arc::clone(&store),
            crypto.clone(),
            events.clone(),
            Arc::clone(&notifier),
            Arc::clone(&history),
        ));
        let credentials = Arc::new(CredentialService::new(
            Arc::clone(&lock),
            Arc::clone(&store),
            crypto.clone(),
            events.clone(),
            notifier,
            Arc::clone(&history),
        ));
        let approvals = Arc::new(ApprovalService::new(
            Arc::clone(&lock),
            store,
            crypto,
            events.clone(),
            config.environment,
        ));
        let backup = BackupService::new(
            Arc::clone(&lock),
            Arc::clone(&identities),
            Arc::clone(&credentials),
            Arc::clone(&approvals),
            Arc::clone(&history),
            config.merge_policy,
        );
        let proofs = ProofService::new(Arc::clone(&lock), Arc::clone(&identities), proof_backend);

        tracing::debug!(environment = %config.environment, "vault built");
        Vault {
            config,
            events,
            lock,
            history,
            identities,
            credentials,
            approvals,
            backup,
            proofs,
        }
    }
}
