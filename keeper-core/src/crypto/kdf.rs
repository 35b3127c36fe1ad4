//! Argon2id stretching of user secrets.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use super::{CryptoError, KeySource, KEY_SIZE};

const SALT_PASSWORD: &[u8] = b"keeper:kdf:password:v1";
const SALT_MNEMONIC: &[u8] = b"keeper:kdf:mnemonic:v1";
const SALT_BACKUP: &[u8] = b"keeper:kdf:backup:v1";

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of passes.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    /// Minimal parameters for tests and throwaway vaults. Never use for real data.
    #[must_use]
    pub const fn insecure_fast() -> Self {
        Self {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

const fn salt_for(source: KeySource) -> &'static [u8] {
    match source {
        KeySource::Password => SALT_PASSWORD,
        KeySource::Mnemonic => SALT_MNEMONIC,
        KeySource::Backup => SALT_BACKUP,
    }
}

pub(super) fn derive(
    secret: &[u8],
    source: KeySource,
    params: &KdfParams,
) -> Result<[u8; KEY_SIZE], CryptoError> {
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_SIZE))
        .map_err(|err| CryptoError::KeyDerivation(err.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(secret, salt_for(source), &mut out)
        .map_err(|err| CryptoError::KeyDerivation(err.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_params() {
        let params = KdfParams {
            m_cost: 1,
            t_cost: 0,
            p_cost: 0,
        };
        assert!(matches!(
            derive(b"pw", KeySource::Password, &params),
            Err(CryptoError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_empty_secret_still_derives() {
        let key = derive(b"", KeySource::Password, &KdfParams::insecure_fast())
            .expect("derive");
        assert_ne!(key, [0u8; KEY_SIZE]);
    }
}
