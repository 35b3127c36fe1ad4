//! Key derivation, authenticated encryption and backup tags.
//!
//! Everything persisted by the vault goes through [`CryptoEngine`]:
//!
//! - secrets (password, mnemonic, backup password) are stretched with Argon2id
//!   into a [`SessionKey`],
//! - payloads are sealed with XChaCha20-Poly1305 and encoded as
//!   `base64(nonce || ciphertext || tag)`,
//! - backup packages carry an HMAC-SHA256 tag keyed from the backup password.

mod aead;
mod kdf;
mod mac;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use kdf::KdfParams;

/// Size in bytes of every symmetric key handled by the engine.
pub const KEY_SIZE: usize = 32;

/// Errors raised by the cryptographic primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Ciphertext could not be opened: wrong key, tampering, bad encoding or short input.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Sealing a payload failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Stretching or expanding a secret failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// The secret a [`SessionKey`] was derived from.
///
/// The source also selects the Argon2 salt, so the same string used as a
/// password and as a backup password yields two unrelated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// The user's unlock password.
    Password,
    /// The saved BIP-39 mnemonic phrase.
    Mnemonic,
    /// A one-off password protecting an exported backup.
    Backup,
}

/// 256-bit symmetric key derived from a user secret.
///
/// The key bytes are wiped on drop and never appear in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    bytes: [u8; KEY_SIZE],
    #[zeroize(skip)]
    source: KeySource,
}

impl SessionKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE], source: KeySource) -> Self {
        Self { bytes, source }
    }

    /// Returns the secret this key was derived from.
    #[must_use]
    pub const fn source(&self) -> KeySource {
        self.source
    }

    pub(crate) const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("source", &self.source)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Stateless facade over the vault's primitives, parameterized by [`KdfParams`].
#[derive(Debug, Clone, Default)]
pub struct CryptoEngine {
    params: KdfParams,
}

impl CryptoEngine {
    /// Creates an engine that stretches secrets with `params`.
    #[must_use]
    pub const fn new(params: KdfParams) -> Self {
        Self { params }
    }

    /// Returns the Argon2 parameters in use.
    #[must_use]
    pub const fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Derives a key from `secret`. Deterministic for a given secret, source and parameter set.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivation`] if the parameters are rejected by Argon2.
    pub fn derive_key(&self, secret: &str, source: KeySource) -> Result<SessionKey, CryptoError> {
        let bytes = kdf::derive(secret.as_bytes(), source, &self.params)?;
        Ok(SessionKey::from_bytes(bytes, source))
    }

    /// Seals `plaintext` under `key` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &[u8], key: &SessionKey) -> Result<String, CryptoError> {
        aead::seal(key.as_bytes(), plaintext)
    }

    /// Opens a ciphertext produced by [`CryptoEngine::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] on a wrong key, tampered or truncated input.
    pub fn decrypt(&self, ciphertext: &str, key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
        aead::open(key.as_bytes(), ciphertext)
    }

    /// Computes the hex HMAC-SHA256 tag of `payload` keyed by `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivation`] if the secret cannot be stretched.
    pub fn compute_auth_tag(&self, payload: &str, secret: &str) -> Result<String, CryptoError> {
        let key = self.derive_key(secret, KeySource::Backup)?;
        mac::tag(&key, payload.as_bytes())
    }

    /// Checks `tag` against `payload` in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivation`] if the secret cannot be stretched.
    /// A malformed or mismatching tag is reported as `Ok(false)`.
    pub fn verify_auth_tag(
        &self,
        payload: &str,
        tag: &str,
        secret: &str,
    ) -> Result<bool, CryptoError> {
        let key = self.derive_key(secret, KeySource::Backup)?;
        mac::verify(&key, payload.as_bytes(), tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CryptoEngine {
        CryptoEngine::new(KdfParams::insecure_fast())
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let engine = engine();
        let a = engine.derive_key("hunter2", KeySource::Password).unwrap();
        let b = engine.derive_key("hunter2", KeySource::Password).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_derive_key_separates_sources() {
        let engine = engine();
        let password = engine.derive_key("same", KeySource::Password).unwrap();
        let backup = engine.derive_key("same", KeySource::Backup).unwrap();
        assert_ne!(password.as_bytes(), backup.as_bytes());
    }

    #[test]
    fn test_encrypt_decrypt() {
        let engine = engine();
        let key = engine.derive_key("pw", KeySource::Password).unwrap();
        let ciphertext = engine.encrypt(b"attack at dawn", &key).unwrap();
        assert_eq!(engine.decrypt(&ciphertext, &key).unwrap(), b"attack at dawn");
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() {
        let engine = engine();
        let key = engine.derive_key("pw", KeySource::Password).unwrap();
        let other = engine.derive_key("not-pw", KeySource::Password).unwrap();
        let ciphertext = engine.encrypt(b"secret", &key).unwrap();
        assert!(matches!(
            engine.decrypt(&ciphertext, &other),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn test_auth_tag() {
        let engine = engine();
        let tag = engine.compute_auth_tag("payload", "backup-pw").unwrap();
        assert!(engine.verify_auth_tag("payload", &tag, "backup-pw").unwrap());
        assert!(!engine.verify_auth_tag("payload!", &tag, "backup-pw").unwrap());
        assert!(!engine.verify_auth_tag("payload", &tag, "other-pw").unwrap());
        assert!(!engine.verify_auth_tag("payload", "zz-not-hex", "backup-pw").unwrap());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = SessionKey::from_bytes([7u8; KEY_SIZE], KeySource::Password);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains('7'));
    }
}
