//! WAL appends, flushes and truncation.

use super::{CRC_SIZE, HEADER_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::wal::iterator::WalRecordIterator;
use crate::wal::record::{WalRecord, WAL_MAGIC, WAL_VERSION};
use crate::wire::compute_crc32;
use keepdb_storage::StorageBackend;

/// Owns the WAL backend.
///
/// Callers serialize access; the store keeps the manager behind its
/// durability lock.
pub struct WalManager {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
}

impl WalManager {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend,
            sync_on_commit,
        }
    }

    /// Frames `record` with the envelope.
    ///
    /// # Errors
    ///
    /// Fails if the payload exceeds 4 GiB.
    pub fn encode(record: &WalRecord) -> CoreResult<Vec<u8>> {
        let payload = record.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::configuration("WAL record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&WAL_MAGIC);
        data.extend_from_slice(&WAL_VERSION.to_le_bytes());
        data.push(record.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    /// Appends one record and returns its offset.
    ///
    /// # Errors
    ///
    /// Fails on encoding or I/O errors.
    pub fn append(&mut self, record: &WalRecord) -> CoreResult<u64> {
        let data = Self::encode(record)?;
        Ok(self.backend.append(&data)?)
    }

    /// Appends several records in one write and returns the first offset.
    ///
    /// # Errors
    ///
    /// Fails on encoding or I/O errors.
    pub fn append_batch(&mut self, records: &[WalRecord]) -> CoreResult<u64> {
        let mut data = Vec::new();
        for record in records {
            data.extend(Self::encode(record)?);
        }
        Ok(self.backend.append(&data)?)
    }

    /// Makes appended records durable, honouring `sync_on_commit`.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn commit_barrier(&mut self) -> CoreResult<()> {
        if self.sync_on_commit {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }
        Ok(())
    }

    /// Current WAL size in bytes.
    ///
    /// # Errors
    ///
    /// Fails if the backend size cannot be read.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Iterates records from the start of the log.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be accessed.
    pub fn iter(&self) -> CoreResult<WalRecordIterator<'_>> {
        WalRecordIterator::new(self.backend.as_ref(), 0)
    }

    /// Reads every record. Intended for small logs and tooling.
    ///
    /// # Errors
    ///
    /// Fails on corruption.
    pub fn read_all(&self) -> CoreResult<Vec<(u64, WalRecord)>> {
        self.iter()?.collect()
    }

    /// Cuts the log back to `size`, dropping a partially written batch.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or if `size` exceeds the log.
    pub fn truncate(&mut self, size: u64) -> CoreResult<()> {
        self.backend.truncate(size)?;
        Ok(())
    }

    /// Empties the log.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.backend.truncate(0)?;
        Ok(())
    }

    /// Direct backend access for crash-simulation tests.
    #[cfg(test)]
    pub(crate) fn backend_mut(&mut self) -> &mut dyn StorageBackend {
        self.backend.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectKey, SequenceNumber, TableId, TransactionId};
    use keepdb_storage::InMemoryBackend;

    fn wal() -> WalManager {
        WalManager::new(Box::new(InMemoryBackend::new()), true)
    }

    fn txn(id: u64) -> Vec<WalRecord> {
        let txid = TransactionId::new(id);
        vec![
            WalRecord::Begin { txid },
            WalRecord::Put {
                txid,
                table: TableId::new(1),
                key: ObjectKey::new(id),
                payload: vec![1, 2, 3],
            },
            WalRecord::Commit {
                txid,
                sequence: SequenceNumber::new(id),
            },
        ]
    }

    #[test]
    fn append_then_iterate() {
        let mut wal = wal();
        wal.append_batch(&txn(1)).unwrap();
        wal.append_batch(&txn(2)).unwrap();
        wal.commit_barrier().unwrap();

        let records: Vec<_> = wal.read_all().unwrap().into_iter().map(|(_, r)| r).collect();
        assert_eq!(records.len(), 6);
        assert_eq!(records[..3], txn(1)[..]);
        assert_eq!(records[3..], txn(2)[..]);
    }

    #[test]
    fn truncated_tail_is_tolerated() {
        let mut wal = wal();
        wal.append_batch(&txn(1)).unwrap();
        let full = wal.size().unwrap();
        wal.append_batch(&txn(2)).unwrap();
        let torn = wal.size().unwrap() - 3;
        wal.backend_mut().truncate(torn).unwrap();

        let mut iter = wal.iter().unwrap();
        let mut count = 0;
        for item in iter.by_ref() {
            item.unwrap();
            count += 1;
        }
        // Begin and Put of the second transaction survive; its Commit is torn.
        assert_eq!(count, 5);
        assert!(iter.truncated_tail());
        assert!(iter.valid_end() > full);
    }

    #[test]
    fn crc_mismatch_is_fatal() {
        let mut wal = wal();
        wal.append_batch(&txn(1)).unwrap();
        let mut bytes = wal.backend_mut().read_all().unwrap();
        // Flip a byte inside the first record's payload.
        bytes[HEADER_SIZE] ^= 0xff;
        wal.backend_mut().rewrite(&bytes).unwrap();

        let first = wal.iter().unwrap().next().unwrap();
        assert!(matches!(first, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut wal = wal();
        wal.backend_mut().append(&[0u8; 32]).unwrap();
        let first = wal.iter().unwrap().next().unwrap();
        assert!(matches!(first, Err(CoreError::WalCorruption { .. })));
    }

    #[test]
    fn clear_empties_log() {
        let mut wal = wal();
        wal.append_batch(&txn(1)).unwrap();
        wal.clear().unwrap();
        assert_eq!(wal.size().unwrap(), 0);
        assert!(wal.read_all().unwrap().is_empty());
    }

    #[test]
    fn large_records_grow_the_window() {
        let mut wal = wal();
        let txid = TransactionId::new(1);
        let big = WalRecord::Put {
            txid,
            table: TableId::new(1),
            key: ObjectKey::new(1),
            payload: vec![7u8; 200 * 1024],
        };
        wal.append(&big).unwrap();
        let records = wal.read_all().unwrap();
        assert_eq!(records, vec![(0, big)]);
    }
}
