//! HMAC-SHA256 tags over exported backups.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{CryptoError, SessionKey, KEY_SIZE};

type HmacSha256 = Hmac<Sha256>;

const AUTH_INFO: &[u8] = b"keeper:backup-auth";

fn auth_key(key: &SessionKey) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, key.as_bytes());
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(AUTH_INFO, &mut okm[..])
        .map_err(|err| CryptoError::KeyDerivation(err.to_string()))?;
    Ok(okm)
}

fn keyed_mac(key: &SessionKey) -> Result<HmacSha256, CryptoError> {
    let okm = auth_key(key)?;
    HmacSha256::new_from_slice(&okm[..])
        .map_err(|err| CryptoError::KeyDerivation(err.to_string()))
}

pub(super) fn tag(key: &SessionKey, payload: &[u8]) -> Result<String, CryptoError> {
    let mut mac = keyed_mac(key)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub(super) fn verify(key: &SessionKey, payload: &[u8], tag: &str) -> Result<bool, CryptoError> {
    let Ok(expected) = hex::decode(tag.trim()) else {
        return Ok(false);
    };
    let mut mac = keyed_mac(key)?;
    mac.update(payload);
    Ok(mac.verify_slice(&expected).is_ok())
}
