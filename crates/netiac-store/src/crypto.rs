use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

const NONCE_LEN: usize = 12;

fn derive_key(secret: &str) -> Key<Aes256Gcm> {
    let digest = Sha256::digest(secret.as_bytes());
    *Key::<Aes256Gcm>::from_slice(&digest)
}

/// Encrypts `plaintext` under a key derived by SHA-256 of `secret`.
/// Returns `iv:authTag:ciphertext`, all hex, colon-separated. A fresh random
/// nonce is generated per call (AES-GCM: never reuse a nonce under the same
/// key).
pub fn encrypt(secret: &str, plaintext: &[u8]) -> Result<String, StoreError> {
    let cipher = Aes256Gcm::new(&derive_key(secret));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| StoreError::Integrity("encryption failed".into()))?;
    // aes-gcm appends the 16-byte auth tag to the ciphertext; split it back
    // out so the on-disk format names both explicitly.
    let tag_start = sealed.len() - 16;
    let (ciphertext, tag) = sealed.split_at(tag_start);
    Ok(format!("{}:{}:{}", hex::encode(nonce), hex::encode(tag), hex::encode(ciphertext)))
}

/// Inverse of [`encrypt`]. Returns [`StoreError::Integrity`] on any
/// malformed record or authentication failure (wrong key, truncated file,
/// bit-flip corruption).
pub fn decrypt(secret: &str, record: &str) -> Result<Vec<u8>, StoreError> {
    let mut parts = record.splitn(3, ':');
    let (iv_hex, tag_hex, ciphertext_hex) = match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => return Err(StoreError::Integrity("malformed encrypted record".into())),
    };
    let iv = hex::decode(iv_hex).map_err(|_| StoreError::Integrity("malformed iv".into()))?;
    let tag = hex::decode(tag_hex).map_err(|_| StoreError::Integrity("malformed auth tag".into()))?;
    let ciphertext =
        hex::decode(ciphertext_hex).map_err(|_| StoreError::Integrity("malformed ciphertext".into()))?;
    if iv.len() != NONCE_LEN {
        return Err(StoreError::Integrity("invalid iv length".into()));
    }
    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(&derive_key(secret));
    let nonce = Nonce::from_slice(&iv);
    cipher
        .decrypt(nonce, sealed.as_ref())
        .map_err(|_| StoreError::Integrity("decryption failed: wrong key or corrupt state".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let cipher_text = encrypt("super-secret", b"hello deployment").unwrap();
        let plain = decrypt("super-secret", &cipher_text).unwrap();
        assert_eq!(plain, b"hello deployment");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let cipher_text = encrypt("correct-secret", b"payload").unwrap();
        assert!(decrypt("wrong-secret", &cipher_text).is_err());
    }

    #[test]
    fn malformed_record_is_rejected() {
        assert!(decrypt("secret", "not-a-valid-record").is_err());
    }

    #[test]
    fn each_call_uses_a_fresh_nonce() {
        let a = encrypt("secret", b"same plaintext").unwrap();
        let b = encrypt("secret", b"same plaintext").unwrap();
        assert_ne!(a, b);
    }
}
