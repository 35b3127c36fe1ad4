//! XChaCha20-Poly1305 sealing with base64 framing.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};

use super::{CryptoError, KEY_SIZE};

/// Size of the random XChaCha20 nonce prepended to every ciphertext.
pub(super) const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 tag appended by the AEAD.
const TAG_SIZE: usize = 16;

/// Associated data bound to every vault ciphertext.
const VAULT_AD: &[u8] = b"keeper:vault:v1";

pub(super) fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<String, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: VAULT_AD,
            },
        )
        .map_err(|_| CryptoError::Encryption("XChaCha20-Poly1305 encryption failed".into()))?;

    let mut framed = Vec::with_capacity(NONCE_SIZE + sealed.len());
    framed.extend_from_slice(&nonce);
    framed.extend_from_slice(&sealed);
    Ok(STANDARD.encode(framed))
}

pub(super) fn open(key: &[u8; KEY_SIZE], encoded: &str) -> Result<Vec<u8>, CryptoError> {
    let framed = STANDARD
        .decode(encoded.trim())
        .map_err(|err| CryptoError::Decryption(format!("invalid base64: {err}")))?;
    if framed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "ciphertext too short: {} bytes",
            framed.len()
        )));
    }

    let (nonce, sealed) = framed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: VAULT_AD,
            },
        )
        .map_err(|_| CryptoError::Decryption("authentication failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_SIZE] = [0x42; KEY_SIZE];

    #[test]
    fn test_nonce_is_random() {
        let a = seal(&KEY, b"same").expect("seal");
        let b = seal(&KEY, b"same").expect("seal");
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let sealed = seal(&KEY, b"payload").expect("seal");
        let mut raw = STANDARD.decode(&sealed).expect("base64");
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = STANDARD.encode(raw);
        assert!(matches!(open(&KEY, &tampered), Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_short_and_garbage_input_rejected() {
        assert!(matches!(open(&KEY, "AAAA"), Err(CryptoError::Decryption(_))));
        assert!(matches!(open(&KEY, "%%%"), Err(CryptoError::Decryption(_))));
        assert!(matches!(open(&KEY, ""), Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_empty_plaintext() {
        let sealed = seal(&KEY, b"").expect("seal");
        assert!(open(&KEY, &sealed).expect("open").is_empty());
    }
}
