use aes_gcm::{aead::Aead, aead::KeyInit, Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::CryptoError;
use mochi_core::EncryptedKey;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Encrypts a 32-byte Ed25519 secret key at rest with a passphrase, via
/// PBKDF2-derived AES-256-GCM.
pub fn encrypt_secret_key(secret: &[u8; 32], passphrase: &str) -> Result<EncryptedKey, CryptoError> {
    if passphrase.is_empty() {
        return Err(CryptoError::EmptyPassphrase);
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut key);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, secret.as_slice())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(EncryptedKey {
        ciphertext,
        salt: salt.to_vec(),
        nonce: nonce_bytes.to_vec(),
    })
}

/// Reverses [`encrypt_secret_key`]. Returns `DecryptionFailed` on wrong
/// passphrase or tampered ciphertext (AES-GCM tag mismatch), never partial
/// plaintext.
pub fn decrypt_secret_key(envelope: &EncryptedKey, passphrase: &str) -> Result<[u8; 32], CryptoError> {
    if passphrase.is_empty() {
        return Err(CryptoError::EmptyPassphrase);
    }
    if envelope.salt.len() != SALT_LEN || envelope.nonce.len() != NONCE_LEN {
        return Err(CryptoError::Encoding("malformed envelope".into()));
    }

    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(
        passphrase.as_bytes(),
        &envelope.salt,
        PBKDF2_ITERATIONS,
        &mut key,
    );

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(&envelope.nonce);

    let plaintext = cipher
        .decrypt(nonce, envelope.ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)?;

    plaintext
        .try_into()
        .map_err(|_| CryptoError::Encoding("decrypted key has wrong length".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let secret = [7u8; 32];
        let envelope = encrypt_secret_key(&secret, "correct horse").unwrap();
        let decrypted = decrypt_secret_key(&envelope, "correct horse").unwrap();
        assert_eq!(secret, decrypted);
    }

    #[test]
    fn wrong_passphrase_fails_decryption() {
        let secret = [7u8; 32];
        let envelope = encrypt_secret_key(&secret, "correct horse").unwrap();
        let err = decrypt_secret_key(&envelope, "wrong horse").unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed));
    }

    #[test]
    fn empty_passphrase_is_rejected() {
        let err = encrypt_secret_key(&[1u8; 32], "").unwrap_err();
        assert!(matches!(err, CryptoError::EmptyPassphrase));
    }
}
