//! Session lock state machine.
//!
//! The vault is `Uninitialized` until a password is set up, then alternates
//! between `Locked` and `Unlocked`. While unlocked, the controller holds the
//! password-derived key (and, once a mnemonic is saved, the mnemonic-derived
//! key) and hands out encrypt/decrypt capabilities; the keys themselves never
//! leave this module.

mod mnemonic;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::crypto::{CryptoEngine, KeySource, SessionKey};
use crate::error::{VaultError, VaultResult};
use crate::events::{EventBus, EventName};
use crate::storage::{BlobStore, CollectionKey, StorageError};

/// Plaintext of the password marker.
pub const PASSWORD_CHECKER: &str = "Password is correct";

/// Coarse lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockState {
    /// No password has been set up yet.
    Uninitialized,
    /// A password exists but no session is active.
    Locked,
    /// A session key is held.
    Unlocked,
}

/// Status published with `login`/`logout` events and returned by `get-status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    /// A password marker exists.
    pub is_initialized: bool,
    /// A session is active.
    pub is_unlocked: bool,
    /// A mnemonic has been saved.
    pub is_mnemonic_generated: bool,
}

struct Session {
    password_key: SessionKey,
    mnemonic_key: Option<SessionKey>,
}

/// Owns the session keys and gates every privileged operation.
pub struct LockController {
    crypto: CryptoEngine,
    store: Arc<dyn BlobStore>,
    events: EventBus,
    session: Mutex<Option<Session>>,
    unlocked: watch::Sender<bool>,
}

impl std::fmt::Debug for LockController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockController")
            .field("unlocked", &*self.unlocked.borrow())
            .finish_non_exhaustive()
    }
}

impl LockController {
    /// Creates a locked controller over `store`.
    #[must_use]
    pub fn new(crypto: CryptoEngine, store: Arc<dyn BlobStore>, events: EventBus) -> Self {
        let (unlocked, _) = watch::channel(false);
        Self {
            crypto,
            store,
            events,
            session: Mutex::new(None),
            unlocked,
        }
    }

    /// Returns `true` once a password marker has been persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn is_initialized(&self) -> VaultResult<bool> {
        Ok(self.store.read(CollectionKey::Password.as_str())?.is_some())
    }

    /// Returns `true` while a session key is held.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        *self.unlocked.borrow()
    }

    /// Returns the current [`LockState`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn state(&self) -> VaultResult<LockState> {
        if self.is_unlocked() {
            return Ok(LockState::Unlocked);
        }
        if self.is_initialized()? {
            Ok(LockState::Locked)
        } else {
            Ok(LockState::Uninitialized)
        }
    }

    /// Returns the current [`LockStatus`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn status(&self) -> VaultResult<LockStatus> {
        Ok(LockStatus {
            is_initialized: self.is_initialized()?,
            is_unlocked: self.is_unlocked(),
            is_mnemonic_generated: self.store.read(CollectionKey::Mnemonic.as_str())?.is_some(),
        })
    }

    /// Sets the vault password and opens a session with it.
    ///
    /// # Errors
    ///
    /// - [`VaultError::AlreadyInitialized`] if a password was set up before.
    /// - [`VaultError::PasswordNotProvided`] for an empty password.
    pub fn setup_password(&self, password: &str) -> VaultResult<LockStatus> {
        if password.is_empty() {
            return Err(VaultError::PasswordNotProvided);
        }
        if self.is_initialized()? {
            return Err(VaultError::AlreadyInitialized);
        }

        let password_key = self.crypto.derive_key(password, KeySource::Password)?;
        let marker = self.crypto.encrypt(PASSWORD_CHECKER.as_bytes(), &password_key)?;
        self.store
            .write_atomic(CollectionKey::Password.as_str(), marker.as_bytes())?;

        self.activate(Session {
            password_key,
            mnemonic_key: None,
        })?;
        tracing::info!("vault password set up");
        self.publish_status(EventName::Login)
    }

    /// Opens a session if `password` matches the persisted marker.
    ///
    /// Succeeds immediately, without checking the password, while already unlocked.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NoCipherText`] if no password was ever set up.
    /// - [`VaultError::IncorrectPassword`] if the marker does not open.
    pub fn unlock(&self, password: &str) -> VaultResult<bool> {
        if self.is_unlocked() {
            return Ok(true);
        }
        if password.is_empty() {
            return Err(VaultError::PasswordNotProvided);
        }

        let marker = self
            .store
            .read(CollectionKey::Password.as_str())?
            .ok_or(VaultError::NoCipherText)?;
        let marker = String::from_utf8(marker).map_err(|_| VaultError::IncorrectPassword)?;

        let password_key = self.crypto.derive_key(password, KeySource::Password)?;
        let checker = self
            .crypto
            .decrypt(&marker, &password_key)
            .map_err(|_| VaultError::IncorrectPassword)?;
        if checker != PASSWORD_CHECKER.as_bytes() {
            return Err(VaultError::IncorrectPassword);
        }

        let mnemonic_key = self.load_mnemonic_key(&password_key)?;
        self.activate(Session {
            password_key,
            mnemonic_key,
        })?;
        tracing::info!("vault unlocked");
        self.publish_status(EventName::Login)?;
        Ok(true)
    }

    /// Drops the session keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the status cannot be read for the `logout` event.
    pub fn lock(&self) -> VaultResult<LockStatus> {
        self.session()?.take();
        self.unlocked.send_replace(false);
        tracing::info!("vault locked");
        self.publish_status(EventName::Logout)
    }

    /// Same as [`LockController::lock`]; kept as the user-facing verb.
    ///
    /// # Errors
    ///
    /// See [`LockController::lock`].
    pub fn logout(&self) -> VaultResult<LockStatus> {
        self.lock()
    }

    /// Returns `payload` unchanged while unlocked, `None` otherwise.
    pub fn ensure<T>(&self, payload: T) -> Option<T> {
        self.is_unlocked().then_some(payload)
    }

    /// Resolves as soon as the vault is unlocked.
    pub async fn await_unlock(&self) {
        let mut rx = self.unlocked.subscribe();
        if rx.wait_for(|unlocked| *unlocked).await.is_err() {
            tracing::warn!("unlock signal closed while waiting");
        }
    }

    /// Returns `true` if the pending-unlock gate is currently open.
    #[must_use]
    pub fn on_unlocked(&self) -> bool {
        self.is_unlocked()
    }

    /// Generates a 24-word phrase for the user to write down. Nothing is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] if no session is active.
    pub fn generate_mnemonic(&self) -> VaultResult<String> {
        self.require_unlocked()?;
        mnemonic::generate()
    }

    /// Validates and persists `phrase`, then activates the mnemonic key.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Locked`] if no session is active.
    /// - [`VaultError::MnemonicAlreadySaved`] if a phrase was saved before.
    /// - [`VaultError::InvalidMnemonic`] if `phrase` is not valid BIP-39.
    pub fn save_mnemonic(&self, phrase: &str) -> VaultResult<LockStatus> {
        self.require_unlocked()?;
        if self.store.read(CollectionKey::Mnemonic.as_str())?.is_some() {
            return Err(VaultError::MnemonicAlreadySaved);
        }

        let phrase = mnemonic::normalize(phrase)?;
        let mnemonic_key = self.crypto.derive_key(&phrase, KeySource::Mnemonic)?;
        let ciphertext = self.encrypt(phrase.as_bytes(), KeySource::Password)?;
        self.store
            .write_atomic(CollectionKey::Mnemonic.as_str(), ciphertext.as_bytes())?;

        self.session()?
            .as_mut()
            .ok_or(VaultError::Locked)?
            .mnemonic_key = Some(mnemonic_key);
        tracing::info!("mnemonic saved");
        self.status()
    }

    /// Encrypts `plaintext` with the session key selected by `source`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Locked`] if no session is active.
    /// - [`VaultError::MnemonicNotSet`] if the mnemonic key is requested before a phrase is saved.
    pub fn encrypt(&self, plaintext: &[u8], source: KeySource) -> VaultResult<String> {
        let session = self.session()?;
        let key = Self::select_key(session.as_ref(), source)?;
        Ok(self.crypto.encrypt(plaintext, key)?)
    }

    /// Decrypts `ciphertext` with the session key selected by `source`.
    ///
    /// # Errors
    ///
    /// As [`LockController::encrypt`], plus [`VaultError::Decryption`] on a bad ciphertext.
    pub fn decrypt(&self, ciphertext: &str, source: KeySource) -> VaultResult<Vec<u8>> {
        let session = self.session()?;
        let key = Self::select_key(session.as_ref(), source)?;
        Ok(self.crypto.decrypt(ciphertext, key)?)
    }

    fn select_key(session: Option<&Session>, source: KeySource) -> VaultResult<&SessionKey> {
        let session = session.ok_or(VaultError::Locked)?;
        match source {
            KeySource::Password => Ok(&session.password_key),
            KeySource::Mnemonic => session
                .mnemonic_key
                .as_ref()
                .ok_or(VaultError::MnemonicNotSet),
            KeySource::Backup => Err(VaultError::InvalidPayload(
                "backup keys are never held by the session".into(),
            )),
        }
    }

    fn require_unlocked(&self) -> VaultResult<()> {
        if self.is_unlocked() {
            Ok(())
        } else {
            Err(VaultError::Locked)
        }
    }

    fn load_mnemonic_key(&self, password_key: &SessionKey) -> VaultResult<Option<SessionKey>> {
        let Some(blob) = self.store.read(CollectionKey::Mnemonic.as_str())? else {
            return Ok(None);
        };
        let ciphertext = String::from_utf8(blob)
            .map_err(|err| VaultError::Serialization(err.to_string()))?;
        let phrase = zeroize::Zeroizing::new(self.crypto.decrypt(&ciphertext, password_key)?);
        let phrase = std::str::from_utf8(&phrase)
            .map_err(|err| VaultError::Serialization(err.to_string()))?;
        Ok(Some(self.crypto.derive_key(phrase, KeySource::Mnemonic)?))
    }

    fn activate(&self, session: Session) -> VaultResult<()> {
        *self.session()? = Some(session);
        self.unlocked.send_replace(true);
        Ok(())
    }

    fn publish_status(&self, event: EventName) -> VaultResult<LockStatus> {
        let status = self.status()?;
        self.events.publish(event, status);
        Ok(status)
    }

    fn session(&self) -> VaultResult<MutexGuard<'_, Option<Session>>> {
        self.session
            .lock()
            .map_err(|_| StorageError::Lock("session mutex poisoned".into()).into())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::crypto::KdfParams;
    use crate::storage::InMemoryBlobStore;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn controller() -> (Arc<InMemoryBlobStore>, EventBus, LockController) {
        let store = Arc::new(InMemoryBlobStore::new());
        let events = EventBus::new(16);
        let lock = LockController::new(
            CryptoEngine::new(KdfParams::insecure_fast()),
            store.clone(),
            events.clone(),
        );
        (store, events, lock)
    }

    #[test]
    fn test_state_transitions() {
        let (_store, _events, lock) = controller();
        assert_eq!(lock.state().expect("state"), LockState::Uninitialized);

        lock.setup_password("pw").expect("setup");
        assert_eq!(lock.state().expect("state"), LockState::Unlocked);

        lock.lock().expect("lock");
        assert_eq!(lock.state().expect("state"), LockState::Locked);

        assert!(lock.unlock("pw").expect("unlock"));
        assert_eq!(lock.state().expect("state"), LockState::Unlocked);
    }

    #[test]
    fn test_setup_twice_fails() {
        let (_store, _events, lock) = controller();
        lock.setup_password("pw").expect("setup");
        assert!(matches!(
            lock.setup_password("pw"),
            Err(VaultError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_unlock_without_marker() {
        let (_store, _events, lock) = controller();
        assert!(matches!(lock.unlock("pw"), Err(VaultError::NoCipherText)));
    }

    #[test]
    fn test_wrong_password_keeps_vault_locked() {
        let (_store, _events, lock) = controller();
        lock.setup_password("pw").expect("setup");
        lock.lock().expect("lock");

        assert!(matches!(
            lock.unlock("wrong"),
            Err(VaultError::IncorrectPassword)
        ));
        assert!(!lock.is_unlocked());
        assert!(matches!(
            lock.encrypt(b"x", KeySource::Password),
            Err(VaultError::Locked)
        ));
    }

    #[test]
    fn test_unlock_is_idempotent_while_unlocked() {
        let (_store, _events, lock) = controller();
        lock.setup_password("pw").expect("setup");
        assert!(lock.unlock("anything").expect("unlock"));
    }

    #[test]
    fn test_ensure() {
        let (_store, _events, lock) = controller();
        assert_eq!(lock.ensure(vec![1, 2, 3]), None);
        lock.setup_password("pw").expect("setup");
        assert_eq!(lock.ensure(vec![1, 2, 3]), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_login_and_logout_events_carry_status() {
        let (_store, events, lock) = controller();
        let mut rx = events.subscribe();

        lock.setup_password("pw").expect("setup");
        lock.lock().expect("lock");

        let login = rx.try_recv().expect("login event");
        assert_eq!(login.name, EventName::Login);
        assert_eq!(login.payload["isUnlocked"], serde_json::json!(true));

        let logout = rx.try_recv().expect("logout event");
        assert_eq!(logout.name, EventName::Logout);
        assert_eq!(logout.payload["isUnlocked"], serde_json::json!(false));
        assert_eq!(logout.payload["isInitialized"], serde_json::json!(true));
    }

    #[test]
    fn test_mnemonic_key_requires_saved_phrase() {
        let (_store, _events, lock) = controller();
        lock.setup_password("pw").expect("setup");
        assert!(matches!(
            lock.encrypt(b"x", KeySource::Mnemonic),
            Err(VaultError::MnemonicNotSet)
        ));

        let status = lock.save_mnemonic(MNEMONIC).expect("save");
        assert!(status.is_mnemonic_generated);
        let sealed = lock.encrypt(b"x", KeySource::Mnemonic).expect("encrypt");
        assert_eq!(lock.decrypt(&sealed, KeySource::Mnemonic).expect("decrypt"), b"x");

        assert!(matches!(
            lock.save_mnemonic(MNEMONIC),
            Err(VaultError::MnemonicAlreadySaved)
        ));
    }

    #[test]
    fn test_mnemonic_key_is_restored_on_unlock() {
        let (_store, _events, lock) = controller();
        lock.setup_password("pw").expect("setup");
        lock.save_mnemonic(MNEMONIC).expect("save");
        let sealed = lock.encrypt(b"vc", KeySource::Mnemonic).expect("encrypt");

        lock.lock().expect("lock");
        lock.unlock("pw").expect("unlock");
        assert_eq!(lock.decrypt(&sealed, KeySource::Mnemonic).expect("decrypt"), b"vc");
    }

    #[test]
    fn test_mnemonic_operations_require_session() {
        let (_store, _events, lock) = controller();
        assert!(matches!(lock.generate_mnemonic(), Err(VaultError::Locked)));
        assert!(matches!(lock.save_mnemonic(MNEMONIC), Err(VaultError::Locked)));
    }

    #[tokio::test]
    async fn test_await_unlock_wakes_waiters() {
        let (_store, _events, lock) = controller();
        lock.setup_password("pw").expect("setup");
        lock.lock().expect("lock");
        let lock = Arc::new(lock);

        let waiter = tokio::spawn({
            let lock = Arc::clone(&lock);
            async move { lock.await_unlock().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        lock.unlock("pw").expect("unlock");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .expect("join");
        assert!(lock.on_unlocked());
    }
}
