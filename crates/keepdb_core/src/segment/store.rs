//! Segment file access.

use crate::error::CoreResult;
use crate::segment::record::SegmentRecord;
use keepdb_storage::StorageBackend;

/// Owns the segment backend.
pub struct SegmentStore {
    backend: Box<dyn StorageBackend>,
}

impl SegmentStore {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Appends records in one write.
    ///
    /// # Errors
    ///
    /// Fails on encoding or I/O errors.
    pub fn append_batch(&mut self, records: &[SegmentRecord]) -> CoreResult<()> {
        let mut data = Vec::with_capacity(records.iter().map(SegmentRecord::encoded_len).sum());
        for record in records {
            data.extend(record.encode()?);
        }
        self.backend.append(&data)?;
        Ok(())
    }

    /// Pushes appended records to the OS.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Forces the segment file to stable storage.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    /// Size of the segment file.
    ///
    /// # Errors
    ///
    /// Fails if the size cannot be read.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Visits every complete record in file order.
    ///
    /// A torn trailing record is skipped; the WAL still holds its commit.
    ///
    /// # Errors
    ///
    /// Fails on CRC mismatches or if `visit` fails.
    pub fn scan(&self, mut visit: impl FnMut(SegmentRecord) -> CoreResult<()>) -> CoreResult<()> {
        let size = self.backend.size()?;
        let mut offset = 0u64;
        while offset + 4 <= size {
            let len_bytes = self.backend.read_at(offset, 4)?;
            let record_len =
                u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as u64;
            if record_len == 0 || offset + record_len > size {
                tracing::warn!(offset, "ignoring torn segment tail");
                break;
            }
            let data = self.backend.read_at(offset, record_len as usize)?;
            visit(SegmentRecord::decode(&data)?)?;
            offset += record_len;
        }
        Ok(())
    }

    /// Atomically replaces the file with `records`.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors; the old file is intact on failure.
    pub fn rewrite(&mut self, records: &[SegmentRecord]) -> CoreResult<()> {
        let mut data = Vec::with_capacity(records.iter().map(SegmentRecord::encoded_len).sum());
        for record in records {
            data.extend(record.encode()?);
        }
        self.backend.rewrite(&data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectKey, SequenceNumber, TableId};
    use keepdb_storage::InMemoryBackend;

    fn put(key: u64, seq: u64) -> SegmentRecord {
        SegmentRecord::put(
            TableId::new(1),
            ObjectKey::new(key),
            vec![key as u8],
            SequenceNumber::new(seq),
        )
    }

    fn collect(store: &SegmentStore) -> Vec<SegmentRecord> {
        let mut out = Vec::new();
        store
            .scan(|r| {
                out.push(r);
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn scan_returns_appended_records() {
        let mut store = SegmentStore::new(Box::new(InMemoryBackend::new()));
        store.append_batch(&[put(1, 1), put(2, 1)]).unwrap();
        store.append_batch(&[put(1, 2)]).unwrap();
        assert_eq!(collect(&store), vec![put(1, 1), put(2, 1), put(1, 2)]);
    }

    #[test]
    fn torn_tail_is_skipped() {
        let full = put(1, 1).encode().unwrap();
        let mut bytes = full.clone();
        bytes.extend_from_slice(&put(2, 2).encode().unwrap()[..10]);
        let store = SegmentStore::new(Box::new(InMemoryBackend::with_data(bytes)));
        assert_eq!(collect(&store), vec![put(1, 1)]);
    }

    #[test]
    fn rewrite_replaces_records() {
        let mut store = SegmentStore::new(Box::new(InMemoryBackend::new()));
        store.append_batch(&[put(1, 1), put(1, 2), put(1, 3)]).unwrap();
        let before = store.size().unwrap();
        store.rewrite(&[put(1, 3)]).unwrap();
        assert!(store.size().unwrap() < before);
        assert_eq!(collect(&store), vec![put(1, 3)]);
    }
}
