//! Segment record encoding.

use crate::error::{CoreError, CoreResult};
use crate::types::{ObjectKey, SequenceNumber, TableId};
use crate::wire::{compute_crc32, ByteReader};

/// Flag bits of a segment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentRecordFlags(u8);

impl SegmentRecordFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The row was deleted.
    pub const TOMBSTONE: Self = Self(0x01);
    /// The payload is encrypted.
    pub const ENCRYPTED: Self = Self(0x02);
    /// Every earlier row of the table is gone.
    pub const CLEAR: Self = Self(0x04);

    /// Wraps a raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// The raw byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Whether the tombstone bit is set.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & Self::TOMBSTONE.0 != 0
    }

    /// Whether the encrypted bit is set.
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED.0 != 0
    }

    /// Whether the clear bit is set.
    #[must_use]
    pub const fn is_clear(self) -> bool {
        self.0 & Self::CLEAR.0 != 0
    }

    /// Adds the encrypted bit.
    #[must_use]
    pub const fn with_encrypted(self) -> Self {
        Self(self.0 | Self::ENCRYPTED.0)
    }
}

/// One record in the segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Table the row belongs to.
    pub table: TableId,
    /// Row key; zero for clear records.
    pub key: ObjectKey,
    /// Flag bits.
    pub flags: SegmentRecordFlags,
    /// Commit that produced the record.
    pub sequence: SequenceNumber,
    /// Encoded row, or empty for tombstones and clears.
    pub payload: Vec<u8>,
}

impl SegmentRecord {
    /// len (4) + table (4) + key (8) + flags (1) + sequence (8).
    pub const HEADER_SIZE: usize = 25;
    /// Trailing CRC size.
    pub const CRC_SIZE: usize = 4;

    /// A row put.
    #[must_use]
    pub fn put(table: TableId, key: ObjectKey, payload: Vec<u8>, sequence: SequenceNumber) -> Self {
        Self {
            table,
            key,
            flags: SegmentRecordFlags::NONE,
            sequence,
            payload,
        }
    }

    /// A row deletion.
    #[must_use]
    pub fn tombstone(table: TableId, key: ObjectKey, sequence: SequenceNumber) -> Self {
        Self {
            table,
            key,
            flags: SegmentRecordFlags::TOMBSTONE,
            sequence,
            payload: Vec::new(),
        }
    }

    /// A table clear.
    #[must_use]
    pub fn clear(table: TableId, sequence: SequenceNumber) -> Self {
        Self {
            table,
            key: ObjectKey::new(0),
            flags: SegmentRecordFlags::CLEAR,
            sequence,
            payload: Vec::new(),
        }
    }

    /// Encoded length of this record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len() + Self::CRC_SIZE
    }

    /// Encodes the record.
    ///
    /// # Errors
    ///
    /// Fails if the record would exceed 4 GiB.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let record_len = u32::try_from(self.encoded_len())
            .map_err(|_| CoreError::configuration("segment record larger than 4 GiB"))?;
        let mut buf = Vec::with_capacity(record_len as usize);
        buf.extend_from_slice(&record_len.to_le_bytes());
        buf.extend_from_slice(&self.table.as_u32().to_le_bytes());
        buf.extend_from_slice(&self.key.as_u64().to_le_bytes());
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(&self.sequence.as_u64().to_le_bytes());
        buf.extend_from_slice(&self.payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes one complete record.
    ///
    /// # Errors
    ///
    /// Fails on short input or a CRC mismatch.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < Self::HEADER_SIZE + Self::CRC_SIZE {
            return Err(CoreError::segment_corruption("record too short"));
        }
        let record_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_len < Self::HEADER_SIZE + Self::CRC_SIZE || data.len() < record_len {
            return Err(CoreError::segment_corruption("incomplete record"));
        }

        let (body, crc) = data[..record_len].split_at(record_len - Self::CRC_SIZE);
        let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let computed = compute_crc32(body);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let mut r = ByteReader::new(&body[4..], |m| CoreError::segment_corruption(m));
        let table = TableId::new(r.u32("table")?);
        let key = ObjectKey::new(r.u64("key")?);
        let flags = SegmentRecordFlags::from_byte(r.u8("flags")?);
        let sequence = SequenceNumber::new(r.u64("sequence")?);
        let payload = r.bytes(record_len - Self::HEADER_SIZE - Self::CRC_SIZE, "payload")?;
        Ok(Self {
            table,
            key,
            flags,
            sequence,
            payload: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        let f = SegmentRecordFlags::TOMBSTONE.with_encrypted();
        assert!(f.is_tombstone());
        assert!(f.is_encrypted());
        assert!(!f.is_clear());
        assert!(SegmentRecordFlags::CLEAR.is_clear());
    }

    #[test]
    fn put_roundtrip() {
        let record = SegmentRecord::put(
            TableId::new(3),
            ObjectKey::new(11),
            b"payload".to_vec(),
            SequenceNumber::new(5),
        );
        let bytes = record.encode().unwrap();
        assert_eq!(bytes.len(), record.encoded_len());
        assert_eq!(SegmentRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn clear_has_empty_payload() {
        let record = SegmentRecord::clear(TableId::new(2), SequenceNumber::new(1));
        let bytes = record.encode().unwrap();
        assert_eq!(bytes.len(), SegmentRecord::HEADER_SIZE + SegmentRecord::CRC_SIZE);
        assert!(SegmentRecord::decode(&bytes).unwrap().flags.is_clear());
    }

    #[test]
    fn corrupted_record_fails_crc() {
        let record =
            SegmentRecord::tombstone(TableId::new(1), ObjectKey::new(1), SequenceNumber::new(1));
        let mut bytes = record.encode().unwrap();
        bytes[6] ^= 0x10;
        assert!(matches!(
            SegmentRecord::decode(&bytes),
            Err(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn short_input_fails() {
        assert!(matches!(
            SegmentRecord::decode(&[0u8; 10]),
            Err(CoreError::SegmentCorruption { .. })
        ));
    }
}
