//! WAL record types and payload serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::{ObjectKey, SequenceNumber, TableId, TransactionId};
use crate::wire::{put_blob, ByteReader};

/// Magic bytes opening every WAL record.
pub const WAL_MAGIC: [u8; 4] = *b"KWAL";

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// Type byte of a WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// Transaction start.
    Begin = 1,
    /// Row insert or update.
    Put = 2,
    /// Row removal.
    Delete = 3,
    /// Transaction commit.
    Commit = 4,
    /// Transaction abort.
    Abort = 5,
    /// Checkpoint marker.
    Checkpoint = 6,
    /// Remove every row of a table.
    Clear = 7,
    /// Schema catalog and version change.
    Schema = 8,
}

impl WalRecordType {
    /// Parses a type byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Commit),
            5 => Some(Self::Abort),
            6 => Some(Self::Checkpoint),
            7 => Some(Self::Clear),
            8 => Some(Self::Schema),
            _ => None,
        }
    }

    /// The type byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A logged operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Transaction start.
    Begin {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Row insert or update.
    Put {
        /// Transaction ID.
        txid: TransactionId,
        /// Table holding the row.
        table: TableId,
        /// Row key.
        key: ObjectKey,
        /// Encoded row, encrypted when the store has a key.
        payload: Vec<u8>,
    },

    /// Row removal.
    Delete {
        /// Transaction ID.
        txid: TransactionId,
        /// Table holding the row.
        table: TableId,
        /// Row key.
        key: ObjectKey,
    },

    /// Removal of every row in a table.
    Clear {
        /// Transaction ID.
        txid: TransactionId,
        /// The table.
        table: TableId,
    },

    /// New schema catalog.
    Schema {
        /// Transaction ID.
        txid: TransactionId,
        /// Schema version after the change. Kept in the clear so the version
        /// can be read without the key.
        version: u64,
        /// Encoded catalog, encrypted when the store has a key.
        catalog: Vec<u8>,
    },

    /// Transaction commit.
    Commit {
        /// Transaction ID.
        txid: TransactionId,
        /// Sequence number of the commit.
        sequence: SequenceNumber,
    },

    /// Transaction abort.
    Abort {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Everything up to `sequence` is in the segment file and manifest.
    Checkpoint {
        /// Last checkpointed sequence.
        sequence: SequenceNumber,
    },
}

impl WalRecord {
    /// The record's type byte.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Begin { .. } => WalRecordType::Begin,
            Self::Put { .. } => WalRecordType::Put,
            Self::Delete { .. } => WalRecordType::Delete,
            Self::Clear { .. } => WalRecordType::Clear,
            Self::Schema { .. } => WalRecordType::Schema,
            Self::Commit { .. } => WalRecordType::Commit,
            Self::Abort { .. } => WalRecordType::Abort,
            Self::Checkpoint { .. } => WalRecordType::Checkpoint,
        }
    }

    /// The transaction the record belongs to, if any.
    #[must_use]
    pub fn txid(&self) -> Option<TransactionId> {
        match self {
            Self::Begin { txid }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Clear { txid, .. }
            | Self::Schema { txid, .. }
            | Self::Commit { txid, .. }
            | Self::Abort { txid } => Some(*txid),
            Self::Checkpoint { .. } => None,
        }
    }

    /// Serializes the payload (without the envelope).
    ///
    /// # Errors
    ///
    /// Fails if a row or catalog payload exceeds 4 GiB.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Begin { txid } | Self::Abort { txid } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
            }
            Self::Put {
                txid,
                table,
                key,
                payload,
            } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&table.as_u32().to_le_bytes());
                buf.extend_from_slice(&key.as_u64().to_le_bytes());
                put_blob(&mut buf, payload)?;
            }
            Self::Delete { txid, table, key } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&table.as_u32().to_le_bytes());
                buf.extend_from_slice(&key.as_u64().to_le_bytes());
            }
            Self::Clear { txid, table } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&table.as_u32().to_le_bytes());
            }
            Self::Schema {
                txid,
                version,
                catalog,
            } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&version.to_le_bytes());
                put_blob(&mut buf, catalog)?;
            }
            Self::Commit { txid, sequence } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
            Self::Checkpoint { sequence } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
        }
        Ok(buf)
    }

    /// Parses a payload of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WalCorruption`] on short or oversized payloads.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut r = ByteReader::new(payload, |m| CoreError::wal_corruption(m));
        let record = match record_type {
            WalRecordType::Begin => Self::Begin {
                txid: TransactionId::new(r.u64("txid")?),
            },
            WalRecordType::Abort => Self::Abort {
                txid: TransactionId::new(r.u64("txid")?),
            },
            WalRecordType::Put => Self::Put {
                txid: TransactionId::new(r.u64("txid")?),
                table: TableId::new(r.u32("table")?),
                key: ObjectKey::new(r.u64("key")?),
                payload: r.blob("row payload")?.to_vec(),
            },
            WalRecordType::Delete => Self::Delete {
                txid: TransactionId::new(r.u64("txid")?),
                table: TableId::new(r.u32("table")?),
                key: ObjectKey::new(r.u64("key")?),
            },
            WalRecordType::Clear => Self::Clear {
                txid: TransactionId::new(r.u64("txid")?),
                table: TableId::new(r.u32("table")?),
            },
            WalRecordType::Schema => Self::Schema {
                txid: TransactionId::new(r.u64("txid")?),
                version: r.u64("schema version")?,
                catalog: r.blob("catalog")?.to_vec(),
            },
            WalRecordType::Commit => Self::Commit {
                txid: TransactionId::new(r.u64("txid")?),
                sequence: SequenceNumber::new(r.u64("sequence")?),
            },
            WalRecordType::Checkpoint => Self::Checkpoint {
                sequence: SequenceNumber::new(r.u64("sequence")?),
            },
        };
        r.finish(&format!("{record_type:?} record"))?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(record: &WalRecord) -> WalRecord {
        let payload = record.encode_payload().unwrap();
        WalRecord::decode_payload(record.record_type(), &payload).unwrap()
    }

    #[test]
    fn record_type_bytes() {
        for b in 1..=8 {
            assert_eq!(WalRecordType::from_byte(b).unwrap().as_byte(), b);
        }
        assert_eq!(WalRecordType::from_byte(0), None);
        assert_eq!(WalRecordType::from_byte(9), None);
    }

    #[test]
    fn put_and_schema_carry_blobs() {
        let put = WalRecord::Put {
            txid: TransactionId::new(4),
            table: TableId::new(2),
            key: ObjectKey::new(77),
            payload: vec![0xa1, 0x61, b'x', 0x01],
        };
        assert_eq!(roundtrip(&put), put);

        let schema = WalRecord::Schema {
            txid: TransactionId::new(4),
            version: 3,
            catalog: b"catalog".to_vec(),
        };
        assert_eq!(roundtrip(&schema), schema);
        assert_eq!(schema.txid(), Some(TransactionId::new(4)));
    }

    #[test]
    fn checkpoint_has_no_txid() {
        let record = WalRecord::Checkpoint {
            sequence: SequenceNumber::new(9),
        };
        assert_eq!(record.txid(), None);
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = WalRecord::Clear {
            txid: TransactionId::new(1),
            table: TableId::new(1),
        }
        .encode_payload()
        .unwrap();
        payload.push(0);
        assert!(matches!(
            WalRecord::decode_payload(WalRecordType::Clear, &payload),
            Err(CoreError::WalCorruption { .. })
        ));
    }

    #[test]
    fn short_payload_is_corruption() {
        assert!(matches!(
            WalRecord::decode_payload(WalRecordType::Commit, &[1, 2, 3]),
            Err(CoreError::WalCorruption { .. })
        ));
    }
}
