//! Streaming WAL record iterator.

use super::{CRC_SIZE, HEADER_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::wal::record::{WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
use crate::wire::compute_crc32;
use keepdb_storage::StorageBackend;

/// Bytes fetched from the backend per read.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Iterates WAL records as `(offset, record)` pairs.
///
/// Memory use is bounded by the read window, which grows only when a single
/// record is larger than it. A torn tail ends iteration cleanly and is
/// reported by [`WalRecordIterator::truncated_tail`]. Corruption yields an
/// error and ends iteration.
pub struct WalRecordIterator<'a> {
    backend: &'a dyn StorageBackend,
    total_size: u64,
    offset: u64,
    window: Vec<u8>,
    window_start: u64,
    finished: bool,
    truncated_tail: bool,
}

impl<'a> WalRecordIterator<'a> {
    /// Starts iterating at `start_offset`.
    ///
    /// # Errors
    ///
    /// Fails if the backend size cannot be read.
    pub fn new(backend: &'a dyn StorageBackend, start_offset: u64) -> CoreResult<Self> {
        Ok(Self {
            backend,
            total_size: backend.size()?,
            offset: start_offset,
            window: Vec::new(),
            window_start: start_offset,
            finished: false,
            truncated_tail: false,
        })
    }

    /// Whether iteration stopped at an incomplete trailing record.
    #[must_use]
    pub fn truncated_tail(&self) -> bool {
        self.truncated_tail
    }

    /// Offset just past the last complete record read so far.
    #[must_use]
    pub fn valid_end(&self) -> u64 {
        self.offset
    }

    /// Makes `len` bytes from the current offset available in the window.
    fn ensure(&mut self, len: usize) -> CoreResult<bool> {
        let end = self.offset + len as u64;
        if end > self.total_size {
            return Ok(false);
        }
        let window_end = self.window_start + self.window.len() as u64;
        if self.offset >= self.window_start && end <= window_end {
            return Ok(true);
        }
        let read_len = (len.max(READ_BUFFER_SIZE) as u64).min(self.total_size - self.offset);
        self.window = self.backend.read_at(self.offset, read_len as usize)?;
        self.window_start = self.offset;
        Ok(true)
    }

    fn slice(&self, len: usize) -> &[u8] {
        let start = (self.offset - self.window_start) as usize;
        &self.window[start..start + len]
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, WalRecord)>> {
        let record_offset = self.offset;

        if !self.ensure(HEADER_SIZE)? {
            self.truncated_tail = self.offset < self.total_size;
            return Ok(None);
        }
        let header = self.slice(HEADER_SIZE);
        if header[0..4] != WAL_MAGIC {
            return Err(CoreError::wal_corruption(format!(
                "invalid magic at offset {record_offset}"
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > WAL_VERSION {
            return Err(CoreError::wal_corruption(format!(
                "unsupported version {version} at offset {record_offset}"
            )));
        }
        let type_byte = header[6];
        let record_type = WalRecordType::from_byte(type_byte).ok_or_else(|| {
            CoreError::wal_corruption(format!(
                "unknown record type {type_byte} at offset {record_offset}"
            ))
        })?;
        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let total_len = HEADER_SIZE + payload_len + CRC_SIZE;
        if !self.ensure(total_len)? {
            self.truncated_tail = true;
            return Ok(None);
        }

        let record = self.slice(total_len);
        let body = &record[..HEADER_SIZE + payload_len];
        let crc_bytes = &record[HEADER_SIZE + payload_len..];
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed = compute_crc32(body);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let decoded = WalRecord::decode_payload(record_type, &body[HEADER_SIZE..])?;
        self.offset += total_len as u64;
        Ok(Some((record_offset, decoded)))
    }
}

impl Iterator for WalRecordIterator<'_> {
    type Item = CoreResult<(u64, WalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
