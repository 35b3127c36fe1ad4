use thiserror::Error;

use crate::crypto::CryptoError;
use crate::storage::StorageError;
use crate::validation::ProofValidationError;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors surfaced by the vault and its services.
///
/// The `Display` of each variant is what the bridge sends back to callers in
/// the error slot of a response.
#[derive(Debug, Error)]
pub enum VaultError {
    /// A password marker already exists
    #[error("Password is already initialized")]
    AlreadyInitialized,
    /// Unlock was attempted before any password was set up
    #[error("Something badly gone wrong (reinstallation probably required)")]
    NoCipherText,
    /// The supplied password does not open the marker
    #[error("Incorrect password")]
    IncorrectPassword,
    /// An empty password was supplied
    #[error("Password is not provided")]
    PasswordNotProvided,
    /// Backup tag verification failed
    #[error("This backup file is corrupted")]
    Authentication,
    /// A stored ciphertext could not be opened
    #[error("decryption_error: {0}")]
    Decryption(String),
    /// An entity with the same key is already stored
    #[error("duplicate_key: {0}")]
    DuplicateKey(String),
    /// No entity is stored under the key
    #[error("not_found: {0}")]
    NotFound(String),
    /// A Merkle proof or artifact descriptor has the wrong shape
    #[error(transparent)]
    InvalidProofShape(#[from] ProofValidationError),
    /// The operation requires an unlocked session
    #[error("Keeper is locked")]
    Locked,
    /// The operation requires a saved mnemonic
    #[error("Mnemonic is not set")]
    MnemonicNotSet,
    /// A mnemonic was already saved for this vault
    #[error("Mnemonic is already saved")]
    MnemonicAlreadySaved,
    /// The phrase is not a valid BIP-39 mnemonic
    #[error("invalid_mnemonic: {0}")]
    InvalidMnemonic(String),
    /// A backup payload does not have the expected shape
    #[error("Backup format is invalid: {0}")]
    InvalidBackupFormat(String),
    /// A verifiable credential failed validation
    #[error("invalid_credential: {0}")]
    InvalidCredential(String),
    /// No identity is selected
    #[error("No connected identity found")]
    NoActiveIdentity,
    /// No proving backend was injected
    #[error("proof backend is not available")]
    ProofBackendUnavailable,
    /// The proving backend failed
    #[error("proof_backend_error: {0}")]
    ProofBackend(String),
    /// An RPC payload could not be interpreted
    #[error("invalid_payload: {0}")]
    InvalidPayload(String),
    /// The operation is disabled in the current environment
    #[error("not_supported: {0}")]
    NotSupported(String),
    /// Persistence failure
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Cryptographic failure other than decryption
    #[error(transparent)]
    Crypto(CryptoError),
    /// Unexpected error serializing information
    #[error("serialization_error: {0}")]
    Serialization(String),
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Decryption(reason) => Self::Decryption(reason),
            other => Self::Crypto(other),
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decryption_maps_to_dedicated_variant() {
        let err: VaultError = CryptoError::Decryption("bad tag".into()).into();
        assert!(matches!(err, VaultError::Decryption(reason) if reason == "bad tag"));

        let err: VaultError = CryptoError::KeyDerivation("params".into()).into();
        assert!(matches!(err, VaultError::Crypto(CryptoError::KeyDerivation(_))));
    }

    #[test]
    fn test_proof_shape_display_is_the_rule_code() {
        let err: VaultError = ProofValidationError::InvalidRoot.into();
        assert_eq!(err.to_string(), "invalid-root");
    }
}
