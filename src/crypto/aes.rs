use crate::error::{AppError, Result};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// The size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A secure key wrapper that ensures the key is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureKey([u8; KEY_SIZE]);

impl SecureKey {
    /// Creates a new `SecureKey` from a byte array.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Returns a reference to the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Derives a purpose-bound key from the configured session secret.
///
/// Each caller passes a distinct domain label so the session-sealing key and
/// the face-proof MAC key can never be confused for one another.
pub fn derive_key(label: &str, secret: &[u8]) -> SecureKey {
    let digest = Sha256::new()
        .chain_update(label.as_bytes())
        .chain_update(secret)
        .finalize();
    SecureKey::new(digest.into())
}

/// Generates a new random AES-GCM nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts a plaintext using AES-256-GCM.
///
/// # Arguments
///
/// * `key` - The AES-256 key.
/// * `plaintext` - The data to encrypt.
///
/// # Returns
///
/// A tuple containing the ciphertext (with the 16-byte tag appended) and the
/// nonce used for encryption.
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
    let cipher = Aes256Gcm::new(key.into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AppError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok((ciphertext, nonce_bytes))
}

/// Decrypts a ciphertext using AES-256-GCM.
///
/// # Arguments
///
/// * `key` - The AES-256 key.
/// * `ciphertext` - The data to decrypt (tag appended).
/// * `nonce` - The nonce used for encryption.
///
/// # Returns
///
/// The decrypted plaintext.
pub fn decrypt(key: &[u8; KEY_SIZE], ciphertext: &[u8], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from(*nonce);

    cipher
        .decrypt(&nonce, ciphertext)
        .map_err(|e| AppError::Encryption(format!("Decryption failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = derive_key("test", b"secret material");
        let (ct, nonce) = encrypt(key.as_bytes(), b"hello voter").unwrap();
        let pt = decrypt(key.as_bytes(), &ct, &nonce).unwrap();
        assert_eq!(pt, b"hello voter");
    }

    #[test]
    fn derive_key_is_label_bound() {
        let a = derive_key("session-token", b"secret");
        let b = derive_key("face-proof", b"secret");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn decrypt_rejects_tampered_ciphertext() {
        let key = derive_key("test", b"secret material");
        let (mut ct, nonce) = encrypt(key.as_bytes(), b"payload").unwrap();
        ct[0] ^= 0x01;
        assert!(decrypt(key.as_bytes(), &ct, &nonce).is_err());
    }
}
