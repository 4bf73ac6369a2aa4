//! The shared store behind every handle on one path.
//!
//! Owns the WAL, the segment file and the manifest, and the committed
//! snapshot readers see. All handles opened on the same path in a process
//! share one `SharedStore`.
//!
//! ## Commit Protocol
//!
//! 1. Log `Begin`, an optional `Schema`, the row changes and `Commit`.
//! 2. Flush the WAL (fsync when `sync_on_commit` is set).
//! 3. Append the same changes to the segment file.
//! 4. Publish the new snapshot.
//!
//! The commit is durable once step 2 succeeds. If step 3 fails the segment
//! file is marked stale: later commits skip it and the next checkpoint
//! rebuilds it from the committed snapshot before the WAL is reset.
//!
//! The durable lock is always taken before the committed snapshot lock, and
//! the snapshot is published while the durable lock is still held, so a
//! checkpoint never persists a catalog older than the segments it syncs.
//!
//! ## Recovery
//!
//! Segments are scanned in file order, then committed WAL transactions are
//! replayed over them. Transactions without a `Commit` are discarded. If
//! anything was replayed the segments are rewritten and the WAL is reset
//! before the store is handed out.

use crate::change_feed::{ChangeEvent, ChangeFeed, ChangeType};
use crate::config::Config;
use crate::crypto::CryptoManager;
use crate::dir::StoreDir;
use crate::engine::catalog::Catalog;
use crate::engine::row::{decode_row, encode_row};
use crate::engine::snapshot::Snapshot;
use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use crate::schema::Schema;
use crate::segment::{SegmentRecord, SegmentStore};
use crate::transaction::{WriteTransaction, WriterGate};
use crate::types::{ObjectKey, SequenceNumber, TableId, TransactionId};
use crate::wal::{WalManager, WalRecord};
use keepdb_storage::{FileBackend, InMemoryBackend};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Sequence of the commit, or the current sequence for empty commits.
    pub sequence: SequenceNumber,
    /// Number of rows written or deleted.
    pub writes: usize,
}

/// Result of [`SharedStore::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Rows written to the new segment file.
    pub live_rows: usize,
    /// Segment file size before compaction.
    pub bytes_before: u64,
    /// Segment file size after compaction.
    pub bytes_after: u64,
}

struct Durable {
    wal: WalManager,
    segments: SegmentStore,
    manifest: Manifest,
    segments_stale: bool,
}

struct Recovered {
    snapshot: Snapshot,
    replayed: usize,
    needs_checkpoint: bool,
    next_txid: u64,
}

/// Durable state and the committed snapshot of one store.
pub struct SharedStore {
    path: Option<PathBuf>,
    dir: Option<StoreDir>,
    durable: Mutex<Durable>,
    committed: RwLock<Arc<Snapshot>>,
    crypto: Option<CryptoManager>,
    gate: WriterGate,
    change_feed: ChangeFeed,
    next_txid: AtomicU64,
    initialized: AtomicBool,
    skip_checkpoint_on_drop: AtomicBool,
}

impl SharedStore {
    /// Opens or creates the store directory at `path` and recovers it.
    ///
    /// A store that has no manifest yet is reported as new; it is not
    /// written to disk until [`SharedStore::initialize`] runs.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DatabaseLocked`] if another process holds the store
    /// - [`CoreError::DecryptionFailed`] if the key does not match
    /// - [`CoreError::InvalidKeySize`] for a key of the wrong length
    /// - corruption and I/O errors from recovery
    pub fn open(path: &Path, config: &Config) -> CoreResult<Arc<Self>> {
        let crypto = build_crypto(config)?;
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let (manifest, is_new) = match dir.load_manifest()? {
            Some(manifest) => {
                verify_key(&manifest, crypto.as_ref())?;
                (manifest, false)
            }
            None => (new_manifest(config, crypto.as_ref())?, true),
        };

        let wal = WalManager::new(
            Box::new(FileBackend::open(&dir.wal_path())?),
            config.sync_on_commit,
        );
        let segments = SegmentStore::new(Box::new(FileBackend::open(&dir.segment_path())?));

        let store = Self::assemble(
            Some(path.to_path_buf()),
            Some(dir),
            Durable {
                wal,
                segments,
                manifest,
                segments_stale: false,
            },
            crypto,
            is_new,
        )?;
        info!(path = %path.display(), is_new, "opened store");
        Ok(store)
    }

    /// Creates a store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Fails for an unusable encryption key.
    pub fn open_in_memory(config: &Config) -> CoreResult<Arc<Self>> {
        let crypto = build_crypto(config)?;
        let manifest = new_manifest(config, crypto.as_ref())?;
        Self::assemble(
            None,
            None,
            Durable {
                wal: WalManager::new(Box::new(InMemoryBackend::new()), false),
                segments: SegmentStore::new(Box::new(InMemoryBackend::new())),
                manifest,
                segments_stale: false,
            },
            crypto,
            true,
        )
    }

    fn assemble(
        path: Option<PathBuf>,
        dir: Option<StoreDir>,
        durable: Durable,
        crypto: Option<CryptoManager>,
        is_new: bool,
    ) -> CoreResult<Arc<Self>> {
        let recovered = recover(&durable, crypto.as_ref())?;
        let store = Self {
            path,
            dir,
            durable: Mutex::new(durable),
            committed: RwLock::new(Arc::new(recovered.snapshot)),
            crypto,
            gate: WriterGate::new(),
            change_feed: ChangeFeed::new(),
            next_txid: AtomicU64::new(recovered.next_txid),
            initialized: AtomicBool::new(!is_new),
            skip_checkpoint_on_drop: AtomicBool::new(false),
        };

        if recovered.needs_checkpoint && !is_new {
            let mut durable = store.durable.lock();
            let snapshot = store.committed();
            store.rewrite_segments(&mut durable, &snapshot)?;
            store.checkpoint_locked(&mut durable, &snapshot)?;
            info!(
                transactions = recovered.replayed,
                sequence = %snapshot.sequence(),
                "recovered store from WAL"
            );
        }
        Ok(Arc::new(store))
    }

    /// Writes the first schema of a new store.
    ///
    /// Returns `false` without writing if another handle initialized the
    /// store first.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn initialize(&self, schema: &Schema, schema_version: u64) -> CoreResult<bool> {
        let mut durable = self.durable.lock();
        if !self.is_new() {
            return Ok(false);
        }
        let mut snapshot = Snapshot::empty(schema_version);
        snapshot.apply_schema(schema)?;
        self.checkpoint_locked(&mut durable, &snapshot)?;
        *self.committed.write() = Arc::new(snapshot);
        self.initialized.store(true, Ordering::SeqCst);
        debug!(schema_version, types = schema.len(), "initialized store");
        Ok(true)
    }

    /// Whether the store has no persisted schema yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        !self.initialized.load(Ordering::SeqCst)
    }

    /// Directory of the store, `None` in memory.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether payloads are encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.crypto.is_some()
    }

    /// The latest committed snapshot.
    #[must_use]
    pub fn committed(&self) -> Arc<Snapshot> {
        Arc::clone(&self.committed.read())
    }

    /// The committed schema version.
    #[must_use]
    pub fn schema_version(&self) -> u64 {
        self.committed.read().schema_version()
    }

    /// Per-object change stream.
    #[must_use]
    pub fn change_feed(&self) -> &ChangeFeed {
        &self.change_feed
    }

    /// The writer gate shared by every handle on this store.
    #[must_use]
    pub fn gate(&self) -> &WriterGate {
        &self.gate
    }

    /// Current WAL size in bytes.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn wal_size(&self) -> CoreResult<u64> {
        self.durable.lock().wal.size()
    }

    /// Current segment file size in bytes.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn segment_size(&self) -> CoreResult<u64> {
        self.durable.lock().segments.size()
    }

    /// The manifest as last written.
    #[must_use]
    pub fn manifest(&self) -> Manifest {
        self.durable.lock().manifest.clone()
    }

    /// Starts a write transaction for `handle`.
    ///
    /// Waits up to `timeout` for another handle's transaction to finish.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NestedTransaction`] if `handle` already holds the gate
    /// - [`CoreError::Busy`] on timeout
    pub fn begin(&self, handle: u64, timeout: Duration) -> CoreResult<WriteTransaction> {
        self.gate.acquire(handle, timeout)?;
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        debug!(txid = %txid, handle, "began transaction");
        Ok(WriteTransaction::new(txid, handle, self.committed()))
    }

    /// Makes `txn` durable and visible, then releases the writer gate.
    ///
    /// # Errors
    ///
    /// Fails on I/O or encryption errors. If the WAL could not be written,
    /// nothing of the transaction persists. Once the WAL holds the commit it
    /// is published even if the segment write fails.
    pub fn commit(&self, txn: WriteTransaction) -> CoreResult<CommitOutcome> {
        let handle = txn.handle();
        let result = self.commit_inner(txn);
        self.gate.release(handle);
        result
    }

    fn commit_inner(&self, txn: WriteTransaction) -> CoreResult<CommitOutcome> {
        let txid = txn.txid();
        let mut durable = self.durable.lock();
        let current = self.committed().sequence();
        if txn.is_empty() {
            debug!(txid = %txid, "committed empty transaction");
            return Ok(CommitOutcome {
                sequence: current,
                writes: 0,
            });
        }

        let sequence = current.next();
        let batch = self.build_batch(&txn, sequence)?;
        let writes = batch.events.len();

        let mark = durable.wal.size()?;
        let logged = durable
            .wal
            .append_batch(&batch.wal)
            .and_then(|_| durable.wal.commit_barrier());
        if let Err(err) = logged {
            if let Err(cut) = durable.wal.truncate(mark) {
                warn!(txid = %txid, error = %cut, "failed to drop partial WAL batch");
            }
            return Err(err);
        }

        if !durable.segments_stale {
            let written = durable
                .segments
                .append_batch(&batch.segments)
                .and_then(|()| durable.segments.flush());
            if let Err(err) = written {
                warn!(txid = %txid, error = %err, "segment write failed; rebuilding at next checkpoint");
                durable.segments_stale = true;
            }
        }

        let mut working = txn.into_working();
        working.set_sequence(sequence);
        *self.committed.write() = Arc::new(working);
        drop(durable);

        self.change_feed.emit_batch(batch.events);
        debug!(txid = %txid, sequence = %sequence, writes, "committed transaction");
        Ok(CommitOutcome { sequence, writes })
    }

    fn build_batch(&self, txn: &WriteTransaction, sequence: SequenceNumber) -> CoreResult<Batch> {
        let txid = txn.txid();
        let base = txn.base();
        let working = txn.working();
        let mut batch = Batch::default();
        batch.wal.push(WalRecord::Begin { txid });

        if txn.schema_changed() {
            let catalog = self.seal(&working.catalog().encode()?)?;
            batch.wal.push(WalRecord::Schema {
                txid,
                version: working.schema_version(),
                catalog,
            });
        }

        let cleared: BTreeSet<TableId> = txn
            .dropped()
            .iter()
            .chain(txn.rewritten())
            .copied()
            .collect();
        for &table in &cleared {
            batch.wal.push(WalRecord::Clear { txid, table });
            batch.segments.push(SegmentRecord::clear(table, sequence));
        }

        let mut rows: BTreeSet<(TableId, ObjectKey)> = txn
            .dirty()
            .iter()
            .filter(|(table, _)| !txn.dropped().contains(table))
            .copied()
            .collect();
        for &id in txn.rewritten() {
            if let Some(table) = working.table(id) {
                rows.extend(table.keys().iter().map(|&key| (id, key)));
            }
        }

        for &(table_id, key) in &rows {
            let existed = base.table(table_id).is_some_and(|t| t.contains(key));
            let current = working
                .table(table_id)
                .and_then(|table| table.row(key).map(|row| (table, row)));
            match current {
                Some((table, row)) => {
                    let plain = encode_row(table.schema(), &row)?;
                    let sealed = self.seal(&plain)?;
                    batch.wal.push(WalRecord::Put {
                        txid,
                        table: table_id,
                        key,
                        payload: sealed.clone(),
                    });
                    batch
                        .segments
                        .push(self.segment_put(table_id, key, sealed, sequence));
                    let change_type = if existed {
                        ChangeType::Update
                    } else {
                        ChangeType::Insert
                    };
                    batch
                        .events
                        .push(event(sequence, table_id, table.name(), key, change_type, Some(plain)));
                }
                None => {
                    if !cleared.contains(&table_id) {
                        batch.wal.push(WalRecord::Delete {
                            txid,
                            table: table_id,
                            key,
                        });
                        batch
                            .segments
                            .push(SegmentRecord::tombstone(table_id, key, sequence));
                    }
                    if let Some(table) = base.table(table_id).filter(|_| existed) {
                        batch.events.push(event(
                            sequence,
                            table_id,
                            table.name(),
                            key,
                            ChangeType::Delete,
                            None,
                        ));
                    }
                }
            }
        }

        // Rows that vanished with a cleared table without being touched.
        for &table_id in &cleared {
            let Some(table) = base.table(table_id) else { continue };
            for &key in table.keys() {
                let survives = working.table(table_id).is_some_and(|t| t.contains(key));
                if !survives && !rows.contains(&(table_id, key)) {
                    batch.events.push(event(
                        sequence,
                        table_id,
                        table.name(),
                        key,
                        ChangeType::Delete,
                        None,
                    ));
                }
            }
        }

        batch.wal.push(WalRecord::Commit { txid, sequence });
        Ok(batch)
    }

    /// Discards `txn` and releases the writer gate.
    pub fn rollback(&self, txn: WriteTransaction) {
        self.gate.release(txn.handle());
        debug!(txid = %txn.txid(), "rolled back transaction");
    }

    /// Moves committed state into the manifest and resets the WAL.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn checkpoint(&self) -> CoreResult<()> {
        let mut durable = self.durable.lock();
        let snapshot = self.committed();
        self.checkpoint_locked(&mut durable, &snapshot)?;
        info!(sequence = %snapshot.sequence(), "checkpoint complete");
        Ok(())
    }

    /// Rewrites the segment file with only live rows, then checkpoints.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors; the old segment file is intact on failure.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        let mut durable = self.durable.lock();
        let snapshot = self.committed();
        let bytes_before = durable.segments.size()?;
        let live_rows = self.rewrite_segments(&mut durable, &snapshot)?;
        self.checkpoint_locked(&mut durable, &snapshot)?;
        let bytes_after = durable.segments.size()?;
        info!(live_rows, bytes_before, bytes_after, "compacted segments");
        Ok(CompactionStats {
            live_rows,
            bytes_before,
            bytes_after,
        })
    }

    fn checkpoint_locked(&self, durable: &mut Durable, snapshot: &Snapshot) -> CoreResult<()> {
        if durable.segments_stale {
            self.rewrite_segments(durable, snapshot)?;
        }
        durable.segments.sync()?;
        durable.manifest.schema_version = snapshot.schema_version();
        durable.manifest.catalog = self.seal(&snapshot.catalog().encode()?)?;
        durable.manifest.last_checkpoint = Some(snapshot.sequence());
        if let Some(dir) = &self.dir {
            dir.save_manifest(&durable.manifest)?;
        }
        durable.wal.clear()?;
        durable.wal.append(&WalRecord::Checkpoint {
            sequence: snapshot.sequence(),
        })?;
        durable.wal.commit_barrier()
    }

    fn rewrite_segments(&self, durable: &mut Durable, snapshot: &Snapshot) -> CoreResult<usize> {
        let mut records = Vec::new();
        for table in snapshot.tables() {
            for (key, row) in table.rows() {
                let payload = self.seal(&encode_row(table.schema(), &row)?)?;
                records.push(self.segment_put(table.id(), key, payload, snapshot.sequence()));
            }
        }
        durable.segments.rewrite(&records)?;
        durable.segments_stale = false;
        Ok(records.len())
    }

    fn segment_put(
        &self,
        table: TableId,
        key: ObjectKey,
        payload: Vec<u8>,
        sequence: SequenceNumber,
    ) -> SegmentRecord {
        let mut record = SegmentRecord::put(table, key, payload, sequence);
        if self.crypto.is_some() {
            record.flags = record.flags.with_encrypted();
        }
        record
    }

    fn seal(&self, plain: &[u8]) -> CoreResult<Vec<u8>> {
        match &self.crypto {
            Some(crypto) => crypto.encrypt(plain),
            None => Ok(plain.to_vec()),
        }
    }

    /// Stops the store from checkpointing when dropped, leaving the WAL as
    /// a crashed process would.
    #[cfg(test)]
    pub(crate) fn simulate_crash(&self) {
        self.skip_checkpoint_on_drop.store(true, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn with_durable<R>(
        &self,
        f: impl FnOnce(&mut WalManager, &mut SegmentStore) -> R,
    ) -> R {
        let mut durable = self.durable.lock();
        let Durable { wal, segments, .. } = &mut *durable;
        f(wal, segments)
    }
}

impl Drop for SharedStore {
    fn drop(&mut self) {
        if self.skip_checkpoint_on_drop.load(Ordering::SeqCst) || self.is_new() {
            return;
        }
        if let Err(err) = self.checkpoint() {
            warn!(error = %err, "checkpoint on close failed");
        }
        debug!(path = ?self.path, "closed store");
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("path", &self.path)
            .field("encrypted", &self.crypto.is_some())
            .field("sequence", &self.committed.read().sequence())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Batch {
    wal: Vec<WalRecord>,
    segments: Vec<SegmentRecord>,
    events: Vec<ChangeEvent>,
}

fn event(
    sequence: SequenceNumber,
    table: TableId,
    object_type: &str,
    key: ObjectKey,
    change_type: ChangeType,
    payload: Option<Vec<u8>>,
) -> ChangeEvent {
    ChangeEvent {
        sequence,
        table,
        object_type: object_type.to_string(),
        key,
        change_type,
        payload,
    }
}

fn build_crypto(config: &Config) -> CoreResult<Option<CryptoManager>> {
    config
        .encryption_key
        .as_deref()
        .map(CryptoManager::from_store_key)
        .transpose()
}

fn new_manifest(config: &Config, crypto: Option<&CryptoManager>) -> CoreResult<Manifest> {
    let mut manifest = Manifest::new(config.format_version);
    manifest.key_check = crypto.map(CryptoManager::key_check).transpose()?;
    Ok(manifest)
}

/// Checks a key against a persisted manifest.
///
/// # Errors
///
/// Returns [`CoreError::DecryptionFailed`] when the key is wrong, missing
/// for an encrypted store, or given for a plain one.
pub(crate) fn verify_key(manifest: &Manifest, crypto: Option<&CryptoManager>) -> CoreResult<()> {
    match (&manifest.key_check, crypto) {
        (Some(block), Some(crypto)) => crypto.verify_key_check(block),
        (Some(_), None) => Err(CoreError::decryption_failed(
            "store is encrypted and no key was given",
        )),
        (None, Some(_)) => Err(CoreError::decryption_failed(
            "store is not encrypted but a key was given",
        )),
        (None, None) => Ok(()),
    }
}

fn unseal(crypto: Option<&CryptoManager>, data: &[u8]) -> CoreResult<Vec<u8>> {
    match crypto {
        Some(crypto) if !data.is_empty() => crypto.decrypt(data),
        _ => Ok(data.to_vec()),
    }
}

enum PendingOp {
    Put(TableId, ObjectKey, Vec<u8>),
    Delete(TableId, ObjectKey),
    Clear(TableId),
    Schema(u64, Vec<u8>),
}

type RawRows = BTreeMap<(TableId, ObjectKey), Vec<u8>>;

fn clear_table(rows: &mut RawRows, table: TableId) {
    rows.retain(|(t, _), _| *t != table);
}

fn recover(durable: &Durable, crypto: Option<&CryptoManager>) -> CoreResult<Recovered> {
    let mut catalog = Catalog::decode(&unseal(crypto, &durable.manifest.catalog)?)?;
    let mut schema_version = durable.manifest.schema_version;
    let mut sequence = durable.manifest.last_checkpoint.unwrap_or_default();

    // WAL first: committed transactions in commit order.
    let mut pending: HashMap<TransactionId, Vec<PendingOp>> = HashMap::new();
    let mut committed: Vec<PendingOp> = Vec::new();
    let mut replayed = 0usize;
    let mut saw_data = false;
    let mut max_txid = 0u64;

    let mut iter = durable.wal.iter()?;
    for entry in iter.by_ref() {
        let (_, record) = entry?;
        if let Some(txid) = record.txid() {
            max_txid = max_txid.max(txid.as_u64());
        }
        match record {
            WalRecord::Begin { txid } => {
                saw_data = true;
                pending.insert(txid, Vec::new());
            }
            WalRecord::Put {
                txid,
                table,
                key,
                payload,
            } => {
                let plain = unseal(crypto, &payload)?;
                pending
                    .entry(txid)
                    .or_default()
                    .push(PendingOp::Put(table, key, plain));
            }
            WalRecord::Delete { txid, table, key } => {
                pending
                    .entry(txid)
                    .or_default()
                    .push(PendingOp::Delete(table, key));
            }
            WalRecord::Clear { txid, table } => {
                pending.entry(txid).or_default().push(PendingOp::Clear(table));
            }
            WalRecord::Schema {
                txid,
                version,
                catalog,
            } => {
                let plain = unseal(crypto, &catalog)?;
                pending
                    .entry(txid)
                    .or_default()
                    .push(PendingOp::Schema(version, plain));
            }
            WalRecord::Commit {
                txid,
                sequence: at,
            } => {
                saw_data = true;
                committed.extend(pending.remove(&txid).unwrap_or_default());
                sequence = sequence.max(at);
                replayed += 1;
            }
            WalRecord::Abort { txid } => {
                saw_data = true;
                pending.remove(&txid);
            }
            WalRecord::Checkpoint { sequence: at } => {
                sequence = sequence.max(at);
            }
        }
    }
    let truncated = iter.truncated_tail();
    if truncated {
        warn!(
            valid_end = iter.valid_end(),
            "discarding incomplete WAL tail"
        );
    }
    if !pending.is_empty() {
        debug!(
            transactions = pending.len(),
            "discarding uncommitted transactions"
        );
    }

    // Segment records past the last durable commit belong to a commit
    // whose WAL record never completed.
    let durable_sequence = sequence;
    let mut orphaned = 0usize;
    let mut rows = RawRows::new();
    durable.segments.scan(|record| {
        if record.sequence > durable_sequence {
            orphaned += 1;
            return Ok(());
        }
        if record.flags.is_clear() {
            clear_table(&mut rows, record.table);
        } else if record.flags.is_tombstone() {
            rows.remove(&(record.table, record.key));
        } else {
            let payload = if record.flags.is_encrypted() {
                match crypto {
                    Some(crypto) => crypto.decrypt(&record.payload)?,
                    None => {
                        return Err(CoreError::decryption_failed(
                            "encrypted segment record but no key",
                        ))
                    }
                }
            } else {
                record.payload
            };
            rows.insert((record.table, record.key), payload);
        }
        Ok(())
    })?;
    if orphaned > 0 {
        debug!(records = orphaned, "ignoring segment records of torn commits");
    }

    for op in committed {
        match op {
            PendingOp::Put(table, key, payload) => {
                rows.insert((table, key), payload);
            }
            PendingOp::Delete(table, key) => {
                rows.remove(&(table, key));
            }
            PendingOp::Clear(table) => clear_table(&mut rows, table),
            PendingOp::Schema(version, encoded) => {
                catalog = Catalog::decode(&encoded)?;
                schema_version = version;
            }
        }
    }

    let mut snapshot = Snapshot::from_catalog(&catalog, schema_version)?;
    for ((table_id, key), payload) in rows {
        // Rows of tables the catalog no longer knows were dropped.
        let Some(table) = snapshot.table_mut(table_id) else { continue };
        let row = decode_row(table.schema(), &payload)?;
        table.insert(key, row)?;
    }
    snapshot.set_sequence(sequence);

    Ok(Recovered {
        snapshot,
        replayed,
        needs_checkpoint: saw_data || truncated || orphaned > 0,
        next_txid: max_txid + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Value;
    use crate::schema::{ObjectSchema, PropertyDescriptor, PropertyType};
    use keepdb_storage::StorageBackend;
    use tempfile::tempdir;

    fn person_schema() -> Schema {
        Schema::from_object_schemas(vec![ObjectSchema::new("Person")
            .with_property(PropertyDescriptor::new("name", PropertyType::String))
            .with_property(PropertyDescriptor::new("age", PropertyType::Int))])
        .unwrap()
    }

    fn add_person(store: &SharedStore, name: &str, age: i64) -> ObjectKey {
        let mut txn = store.begin(1, Duration::from_millis(10)).unwrap();
        let id = txn.working().table_id("Person").unwrap();
        let table = txn.working_mut().table_mut(id).unwrap();
        let key = table.allocate_key();
        table
            .insert(key, vec![Value::from(name), Value::Int(age)])
            .unwrap();
        txn.mark_dirty(id, key);
        store.commit(txn).unwrap();
        key
    }

    fn names(store: &SharedStore) -> Vec<String> {
        let snapshot = store.committed();
        let table = snapshot.table_by_name("Person").unwrap();
        table
            .rows()
            .map(|(_, row)| row[0].as_str().unwrap().to_string())
            .collect()
    }

    /// Segment backend whose writes always fail.
    struct FailingBackend;

    impl StorageBackend for FailingBackend {
        fn read_at(&self, offset: u64, len: usize) -> keepdb_storage::StorageResult<Vec<u8>> {
            Err(keepdb_storage::StorageError::ReadPastEnd {
                offset,
                len,
                size: 0,
            })
        }

        fn append(&mut self, _data: &[u8]) -> keepdb_storage::StorageResult<u64> {
            Err(std::io::Error::other("disk full").into())
        }

        fn flush(&mut self) -> keepdb_storage::StorageResult<()> {
            Ok(())
        }

        fn size(&self) -> keepdb_storage::StorageResult<u64> {
            Ok(0)
        }

        fn sync(&mut self) -> keepdb_storage::StorageResult<()> {
            Ok(())
        }

        fn truncate(&mut self, _new_size: u64) -> keepdb_storage::StorageResult<()> {
            Ok(())
        }

        fn rewrite(&mut self, _data: &[u8]) -> keepdb_storage::StorageResult<()> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    #[test]
    fn new_store_is_not_written_until_initialized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let store = SharedStore::open(&path, &Config::default()).unwrap();
        assert!(store.is_new());
        drop(store);
        assert!(crate::dir::read_manifest(&path).unwrap().is_none());
    }

    #[test]
    fn commit_survives_clean_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = SharedStore::open(&path, &Config::default()).unwrap();
            assert!(store.initialize(&person_schema(), 0).unwrap());
            add_person(&store, "Alice", 30);
        }
        let store = SharedStore::open(&path, &Config::default()).unwrap();
        assert!(!store.is_new());
        assert_eq!(names(&store), vec!["Alice"]);
        assert_eq!(store.committed().sequence(), SequenceNumber::new(1));
    }

    #[test]
    fn commit_survives_crash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = SharedStore::open(&path, &Config::default()).unwrap();
            store.initialize(&person_schema(), 0).unwrap();
            add_person(&store, "Alice", 30);
            add_person(&store, "Bob", 40);
            // Lose the segment file so only the WAL holds the commits.
            store.with_durable(|_, segments| segments.rewrite(&[]).unwrap());
            store.simulate_crash();
        }
        let store = SharedStore::open(&path, &Config::default()).unwrap();
        assert_eq!(names(&store), vec!["Alice", "Bob"]);
    }

    #[test]
    fn uncommitted_transaction_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = SharedStore::open(&path, &Config::default()).unwrap();
            store.initialize(&person_schema(), 0).unwrap();
            add_person(&store, "Alice", 30);
            let txid = TransactionId::new(99);
            store.with_durable(|wal, _| {
                wal.append(&WalRecord::Begin { txid }).unwrap();
                wal.append(&WalRecord::Put {
                    txid,
                    table: TableId::new(1),
                    key: ObjectKey::new(50),
                    payload: vec![0xa0],
                })
                .unwrap();
            });
            store.simulate_crash();
        }
        let store = SharedStore::open(&path, &Config::default()).unwrap();
        assert_eq!(names(&store), vec!["Alice"]);
    }

    #[test]
    fn torn_wal_tail_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = SharedStore::open(&path, &Config::default()).unwrap();
            store.initialize(&person_schema(), 0).unwrap();
            add_person(&store, "Alice", 30);
            store.with_durable(|wal, _| {
                wal.backend_mut().append(b"KWAL\x01").unwrap();
            });
            store.simulate_crash();
        }
        let store = SharedStore::open(&path, &Config::default()).unwrap();
        assert_eq!(names(&store), vec!["Alice"]);
        assert!(store.wal_size().unwrap() > 0);
    }

    #[test]
    fn segment_rows_of_a_torn_commit_are_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = SharedStore::open(&path, &Config::default()).unwrap();
            store.initialize(&person_schema(), 0).unwrap();
            add_person(&store, "Alice", 30);
            add_person(&store, "Bob", 40);
            store.with_durable(|wal, _| {
                let size = wal.size().unwrap();
                wal.truncate(size - 2).unwrap();
            });
            store.simulate_crash();
        }
        let store = SharedStore::open(&path, &Config::default()).unwrap();
        assert_eq!(names(&store), vec!["Alice"]);
        drop(store);

        let store = SharedStore::open(&path, &Config::default()).unwrap();
        assert_eq!(names(&store), vec!["Alice"]);
        add_person(&store, "Carol", 50);
        assert_eq!(names(&store), vec!["Alice", "Carol"]);
    }

    #[test]
    fn rollback_leaves_no_trace() {
        let store = SharedStore::open_in_memory(&Config::default()).unwrap();
        store.initialize(&person_schema(), 0).unwrap();
        let mut txn = store.begin(1, Duration::from_millis(10)).unwrap();
        let id = txn.working().table_id("Person").unwrap();
        let table = txn.working_mut().table_mut(id).unwrap();
        let key = table.allocate_key();
        table.insert(key, vec![Value::from("x"), Value::Int(1)]).unwrap();
        store.rollback(txn);
        assert!(names(&store).is_empty());
        assert_eq!(store.gate().owner(), None);
    }

    #[test]
    fn change_feed_reports_inserts_updates_and_deletes() {
        let store = SharedStore::open_in_memory(&Config::default()).unwrap();
        store.initialize(&person_schema(), 0).unwrap();
        let events = store.change_feed().subscribe();
        let key = add_person(&store, "Alice", 30);

        let mut txn = store.begin(1, Duration::from_millis(10)).unwrap();
        let id = txn.working().table_id("Person").unwrap();
        txn.working_mut()
            .table_mut(id)
            .unwrap()
            .set(key, 1, Value::Int(31))
            .unwrap();
        txn.mark_dirty(id, key);
        store.commit(txn).unwrap();

        let mut txn = store.begin(1, Duration::from_millis(10)).unwrap();
        txn.working_mut().table_mut(id).unwrap().remove(key);
        txn.mark_dirty(id, key);
        store.commit(txn).unwrap();

        let kinds: Vec<_> = events.try_iter().map(|e| e.change_type).collect();
        assert_eq!(
            kinds,
            vec![ChangeType::Insert, ChangeType::Update, ChangeType::Delete]
        );
    }

    #[test]
    fn compaction_drops_dead_records() {
        let store = SharedStore::open_in_memory(&Config::default()).unwrap();
        store.initialize(&person_schema(), 0).unwrap();
        let key = add_person(&store, "Alice", 30);
        for age in 31..40 {
            let mut txn = store.begin(1, Duration::from_millis(10)).unwrap();
            let id = txn.working().table_id("Person").unwrap();
            txn.working_mut()
                .table_mut(id)
                .unwrap()
                .set(key, 1, Value::Int(age))
                .unwrap();
            txn.mark_dirty(id, key);
            store.commit(txn).unwrap();
        }
        let stats = store.compact().unwrap();
        assert_eq!(stats.live_rows, 1);
        assert!(stats.bytes_after < stats.bytes_before);
    }

    #[test]
    fn wrong_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let config = Config::new().encryption_key(vec![1u8; 64]);
            let store = SharedStore::open(&path, &config).unwrap();
            store.initialize(&person_schema(), 0).unwrap();
            add_person(&store, "Alice", 30);
        }
        let wrong = Config::new().encryption_key(vec![2u8; 64]);
        assert!(matches!(
            SharedStore::open(&path, &wrong),
            Err(CoreError::DecryptionFailed { .. })
        ));
        assert!(matches!(
            SharedStore::open(&path, &Config::default()),
            Err(CoreError::DecryptionFailed { .. })
        ));

        let right = Config::new().encryption_key(vec![1u8; 64]);
        let store = SharedStore::open(&path, &right).unwrap();
        assert_eq!(names(&store), vec!["Alice"]);
    }

    #[test]
    fn encrypted_segments_hide_plaintext() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let config = Config::new().encryption_key(vec![1u8; 64]);
            let store = SharedStore::open(&path, &config).unwrap();
            store.initialize(&person_schema(), 0).unwrap();
            add_person(&store, "Secret Name", 30);
        }
        let segment = std::fs::read(path.join(crate::dir::SEGMENT_FILE)).unwrap();
        let needle = b"Secret Name";
        assert!(!segment.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn second_initialize_is_a_no_op() {
        let store = SharedStore::open_in_memory(&Config::default()).unwrap();
        assert!(store.initialize(&person_schema(), 2).unwrap());
        add_person(&store, "Alice", 30);
        assert!(!store.initialize(&Schema::default(), 0).unwrap());
        assert_eq!(store.schema_version(), 2);
        assert_eq!(names(&store), vec!["Alice"]);
    }

    #[test]
    fn failed_segment_write_still_publishes_the_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = SharedStore::open(&path, &Config::default()).unwrap();
            store.initialize(&person_schema(), 0).unwrap();
            add_person(&store, "Alice", 30);

            let healthy = store.with_durable(|_, segments| {
                std::mem::replace(segments, SegmentStore::new(Box::new(FailingBackend)))
            });
            add_person(&store, "Bob", 40);
            assert_eq!(store.committed().sequence(), SequenceNumber::new(2));
            add_person(&store, "Carol", 50);
            assert_eq!(store.committed().sequence(), SequenceNumber::new(3));
            assert_eq!(names(&store), vec!["Alice", "Bob", "Carol"]);

            // The WAL is kept while the segment file cannot be rebuilt.
            assert!(store.checkpoint().is_err());
            assert!(store.wal_size().unwrap() > 0);

            store.with_durable(|_, segments| *segments = healthy);
        }
        let store = SharedStore::open(&path, &Config::default()).unwrap();
        assert_eq!(names(&store), vec!["Alice", "Bob", "Carol"]);
        assert_eq!(store.committed().sequence(), SequenceNumber::new(3));
    }
}
