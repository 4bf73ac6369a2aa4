//! Encryption at rest.
//!
//! Stores opened with a key encrypt row payloads in the WAL and segment
//! file, and the schema blob in the manifest. The caller supplies a 64-byte
//! key; an AES-256-GCM key is derived from it with HKDF-SHA256.
//!
//! Encryption is compiled in through the `encryption` feature (on by
//! default). Without it, opening a store with a key fails with
//! [`CoreError::EncryptionNotEnabled`](crate::CoreError::EncryptionNotEnabled).

/// Length of the key callers pass in [`Config::encryption_key`](crate::Config::encryption_key).
pub const STORE_KEY_SIZE: usize = 64;

#[cfg(feature = "encryption")]
mod encrypted;

#[cfg(feature = "encryption")]
pub use encrypted::*;

#[cfg(not(feature = "encryption"))]
mod stub {
    use crate::error::{CoreError, CoreResult};

    /// Crypto manager (stub when encryption is disabled).
    #[derive(Debug)]
    pub struct CryptoManager {
        _private: (),
    }

    impl CryptoManager {
        /// Always fails when encryption is disabled.
        pub fn from_store_key(_key: &[u8]) -> CoreResult<Self> {
            Err(CoreError::EncryptionNotEnabled)
        }

        /// Always fails when encryption is disabled.
        pub fn encrypt(&self, _data: &[u8]) -> CoreResult<Vec<u8>> {
            Err(CoreError::EncryptionNotEnabled)
        }

        /// Always fails when encryption is disabled.
        pub fn decrypt(&self, _data: &[u8]) -> CoreResult<Vec<u8>> {
            Err(CoreError::EncryptionNotEnabled)
        }

        /// Always fails when encryption is disabled.
        pub fn key_check(&self) -> CoreResult<Vec<u8>> {
            Err(CoreError::EncryptionNotEnabled)
        }

        /// Always fails when encryption is disabled.
        pub fn verify_key_check(&self, _block: &[u8]) -> CoreResult<()> {
            Err(CoreError::EncryptionNotEnabled)
        }
    }
}

#[cfg(not(feature = "encryption"))]
pub use stub::*;
