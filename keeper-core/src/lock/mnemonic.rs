//! BIP-39 phrase generation and validation.

use bip39::{Language, Mnemonic};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// Entropy for a 24-word phrase.
const ENTROPY_BYTES: usize = 32;

/// Generates a fresh 24-word English phrase.
pub(crate) fn generate() -> VaultResult<String> {
    let mut entropy = Zeroizing::new([0u8; ENTROPY_BYTES]);
    OsRng.fill_bytes(&mut entropy[..]);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..])
        .map_err(|err| VaultError::InvalidMnemonic(err.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Validates `phrase` and returns its canonical single-space form.
pub(crate) fn normalize(phrase: &str) -> VaultResult<String> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase.trim())
        .map_err(|err| VaultError::InvalidMnemonic(err.to_string()))?;
    Ok(mnemonic.to_string())
}
