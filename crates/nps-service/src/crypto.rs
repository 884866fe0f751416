//! Cryptographic utilities.
//!
//! HMAC-SHA256 for webhook signatures and upload URL signing, and the
//! AES-256-GCM cipher that document storage keys are stored under.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Cryptographic failures.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The MAC could not be keyed.
    #[error("invalid HMAC key")]
    InvalidKey,

    /// Encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// The ciphertext is malformed or was produced under another key.
    #[error("decryption failed")]
    Decrypt,
}

/// Compute HMAC-SHA256 over raw bytes.
///
/// # Errors
///
/// Returns `CryptoError::InvalidKey` if the key is rejected.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Compute HMAC-SHA256 and return the hex-encoded result (64 characters).
///
/// # Errors
///
/// Returns `CryptoError::InvalidKey` if the key is rejected.
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Result<String, CryptoError> {
    hmac_sha256(secret.as_bytes(), message.as_bytes()).map(hex::encode)
}

/// Hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Encrypts blob storage keys before they reach the datastore.
///
/// Output is hex of `nonce || ciphertext`, with a fresh 12-byte nonce per call.
/// The AES key is the SHA-256 of the configured secret, so any secret length works.
#[derive(Clone)]
pub struct PathCipher {
    key: [u8; 32],
}

impl PathCipher {
    /// Cipher keyed from `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            key: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    /// Encrypt `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encrypt` if the AEAD fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    /// Decrypt a value produced by [`PathCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Decrypt` on malformed input or a key mismatch.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let bytes = hex::decode(encoded).map_err(|_| CryptoError::Decrypt)?;
        if bytes.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }
}

impl std::fmt::Debug for PathCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PathCipher(..)")
    }
}
