//! AES-256-GCM implementation.

use super::STORE_KEY_SIZE;
use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the derived AES-256 key.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag.
pub const TAG_SIZE: usize = 16;

const HKDF_INFO: &[u8] = b"keepdb-store-key-v1";
const KEY_CHECK_PLAINTEXT: &[u8] = b"keepdb key check";

/// Derived AES key material. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Derives the cipher key from a 64-byte store key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKeySize`] unless `store_key` is exactly
    /// [`STORE_KEY_SIZE`] bytes.
    pub fn derive(store_key: &[u8]) -> CoreResult<Self> {
        if store_key.len() != STORE_KEY_SIZE {
            return Err(CoreError::invalid_key_size(store_key.len(), STORE_KEY_SIZE));
        }
        let hk = Hkdf::<Sha256>::new(None, store_key);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(HKDF_INFO, &mut bytes)
            .map_err(|_| CoreError::encryption_failed("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    /// Generates a random 64-byte store key.
    #[must_use]
    pub fn generate_store_key() -> Vec<u8> {
        let mut key = vec![0u8; STORE_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts and decrypts payloads for one store.
///
/// Output layout is `nonce (12) || ciphertext || tag (16)`.
pub struct CryptoManager {
    cipher: Aes256Gcm,
}

impl CryptoManager {
    /// Creates a manager from an already-derived key.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Derives the cipher key from a 64-byte store key and builds a manager.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKeySize`] for keys of the wrong length.
    pub fn from_store_key(store_key: &[u8]) -> CoreResult<Self> {
        Ok(Self::new(&EncryptionKey::derive(store_key)?))
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Fails if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CoreError::encryption_failed("encryption error"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend(ciphertext);
        Ok(out)
    }

    /// Decrypts data produced by [`CryptoManager::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DecryptionFailed`] on a wrong key or tampered data.
    pub fn decrypt(&self, data: &[u8]) -> CoreResult<Vec<u8>> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::decryption_failed("ciphertext too short"));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::decryption_failed("wrong key or corrupted data"))
    }

    /// Produces the block stored in the manifest to recognize this key.
    ///
    /// # Errors
    ///
    /// Fails if encryption fails.
    pub fn key_check(&self) -> CoreResult<Vec<u8>> {
        self.encrypt(KEY_CHECK_PLAINTEXT)
    }

    /// Verifies a block produced by [`CryptoManager::key_check`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DecryptionFailed`] if the block was made with
    /// another key.
    pub fn verify_key_check(&self, block: &[u8]) -> CoreResult<()> {
        let plain = self.decrypt(block)?;
        if plain != KEY_CHECK_PLAINTEXT {
            return Err(CoreError::decryption_failed("encryption key does not match store"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CryptoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoManager")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}
