//! Store manifest.
//!
//! Layout:
//!
//! ```text
//! magic "KMFN" | version u16 | format major u16 | format minor u16
//! | schema version u64
//! | has checkpoint u8 [| checkpoint sequence u64]
//! | has key check u8 [| key check blob]
//! | catalog blob
//! ```
//!
//! Blobs carry a `u32` length prefix. The catalog blob is encrypted when
//! a key check is present.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use crate::wire::{put_blob, ByteReader};

/// Magic bytes opening the manifest.
pub const MANIFEST_MAGIC: [u8; 4] = *b"KMFN";

/// Current manifest version.
pub const MANIFEST_VERSION: u16 = 1;

/// Persisted store metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Format version (major, minor).
    pub format_version: (u16, u16),
    /// Schema version the catalog describes.
    pub schema_version: u64,
    /// Sequence of the last checkpoint.
    pub last_checkpoint: Option<SequenceNumber>,
    /// Encrypted probe used to verify the key on open.
    pub key_check: Option<Vec<u8>>,
    /// Encoded table catalog, encrypted when `key_check` is set.
    pub catalog: Vec<u8>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new((1, 0))
    }
}

impl Manifest {
    /// Creates an empty manifest at schema version 0.
    #[must_use]
    pub fn new(format_version: (u16, u16)) -> Self {
        Self {
            format_version,
            schema_version: 0,
            last_checkpoint: None,
            key_check: None,
            catalog: Vec::new(),
        }
    }

    /// Whether the store was created with an encryption key.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.key_check.is_some()
    }

    /// Encodes the manifest.
    ///
    /// # Errors
    ///
    /// Fails if a blob exceeds 4 GiB.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(32 + self.catalog.len());
        buf.extend_from_slice(&MANIFEST_MAGIC);
        buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.format_version.0.to_le_bytes());
        buf.extend_from_slice(&self.format_version.1.to_le_bytes());
        buf.extend_from_slice(&self.schema_version.to_le_bytes());

        match self.last_checkpoint {
            Some(seq) => {
                buf.push(1);
                buf.extend_from_slice(&seq.as_u64().to_le_bytes());
            }
            None => buf.push(0),
        }

        match &self.key_check {
            Some(block) => {
                buf.push(1);
                put_blob(&mut buf, block)?;
            }
            None => buf.push(0),
        }

        put_blob(&mut buf, &self.catalog)?;
        Ok(buf)
    }

    /// Decodes a manifest.
    ///
    /// # Errors
    ///
    /// Fails on bad magic, a newer version or truncated data.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < 4 || data[0..4] != MANIFEST_MAGIC {
            return Err(CoreError::invalid_format("invalid manifest magic"));
        }
        let mut r = ByteReader::new(&data[4..], |m| CoreError::invalid_format(m));

        let version = r.u16("manifest version")?;
        if version > MANIFEST_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported manifest version: {version}"
            )));
        }

        let major = r.u16("format version")?;
        let minor = r.u16("format version")?;
        let schema_version = r.u64("schema version")?;

        let last_checkpoint = match r.u8("checkpoint flag")? {
            0 => None,
            _ => Some(SequenceNumber::new(r.u64("checkpoint")?)),
        };
        let key_check = match r.u8("key check flag")? {
            0 => None,
            _ => Some(r.blob("key check")?.to_vec()),
        };
        let catalog = r.blob("catalog")?.to_vec();
        r.finish("manifest")?;

        Ok(Self {
            format_version: (major, minor),
            schema_version,
            last_checkpoint,
            key_check,
            catalog,
        })
    }
}
