use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::RngCore;
use thiserror::Error;
use zeroize::ZeroizeOnDrop;

/// Characters used by [`generate_secure_password`].
const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// Default length for generated passwords.
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key text is not base64, or decodes to the wrong number of bytes.
    #[error("invalid key format")]
    InvalidKeyFormat,
    #[error("encryption failed")]
    EncryptionFailed,
    /// One variant for bad base64, a wrong-length nonce, tag verification
    /// failure, and non-UTF-8 plaintext. Callers cannot tell which stage
    /// rejected the input.
    #[error("decryption failed")]
    DecryptionFailed,
}

/// 32-byte AES-256-GCM key. Wiped from memory on drop.
#[derive(ZeroizeOnDrop)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Generate a fresh random 256-bit key from the OS random source.
pub fn generate_key() -> EncryptionKey {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    EncryptionKey(key)
}

/// Serialize a key for URL-fragment embedding: standard base64 of the raw
/// 32 bytes, nothing else.
pub fn export_key(key: &EncryptionKey) -> String {
    B64.encode(key.as_bytes())
}

/// Inverse of [`export_key`].
pub fn import_key(encoded: &str) -> Result<EncryptionKey, CryptoError> {
    let bytes = B64
        .decode(encoded)
        .map_err(|_| CryptoError::InvalidKeyFormat)?;
    if bytes.len() != 32 {
        return Err(CryptoError::InvalidKeyFormat);
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(EncryptionKey(key))
}

/// Encrypt `plaintext` with `key`, returning `(ciphertext, iv)`, both
/// standard base64. A fresh 96-bit nonce is drawn per call, so the same
/// plaintext and key never produce the same output twice.
pub fn encrypt(plaintext: &str, key: &EncryptionKey) -> Result<(String, String), CryptoError> {
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::EncryptionFailed)?;

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok((B64.encode(ciphertext), B64.encode(nonce_bytes)))
}

/// Decrypt base64 `ciphertext` with `key` and base64 `iv`, returning the
/// original UTF-8 plaintext. Any failure is [`CryptoError::DecryptionFailed`];
/// no partial plaintext is ever returned.
pub fn decrypt(ciphertext: &str, key: &EncryptionKey, iv: &str) -> Result<String, CryptoError> {
    let ct_bytes = B64
        .decode(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let iv_bytes = B64.decode(iv).map_err(|_| CryptoError::DecryptionFailed)?;
    if iv_bytes.len() != 12 {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::DecryptionFailed)?;
    let nonce = Nonce::from_slice(&iv_bytes);

    let plaintext = cipher
        .decrypt(nonce, ct_bytes.as_ref())
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
}

/// Generate a random password of `length` characters drawn from a fixed
/// 70-character alphabet. Each random byte is reduced modulo the alphabet
/// size; 256 is not a multiple of 70, so early characters are very slightly
/// favored. Fine for passwords, do not use for keys.
pub fn generate_secure_password(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| PASSWORD_CHARSET[*b as usize % PASSWORD_CHARSET.len()] as char)
        .collect()
}
