//! Transaction state.

use crate::engine::Snapshot;
use crate::types::{ObjectKey, TableId, TransactionId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// An open write transaction.
///
/// Holds the snapshot it started from and the working copy all reads and
/// writes of the owning handle go to. The write set records which rows and
/// tables commit has to log.
#[derive(Debug)]
pub struct WriteTransaction {
    txid: TransactionId,
    handle: u64,
    base: Arc<Snapshot>,
    working: Snapshot,
    dirty: BTreeSet<(TableId, ObjectKey)>,
    rewritten: BTreeSet<TableId>,
    dropped: BTreeSet<TableId>,
    schema_changed: bool,
}

impl WriteTransaction {
    pub(crate) fn new(txid: TransactionId, handle: u64, base: Arc<Snapshot>) -> Self {
        Self {
            txid,
            handle,
            working: Snapshot::clone(&base),
            base,
            dirty: BTreeSet::new(),
            rewritten: BTreeSet::new(),
            dropped: BTreeSet::new(),
            schema_changed: false,
        }
    }

    /// Transaction id.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        self.txid
    }

    /// Handle that owns the writer gate.
    #[must_use]
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Snapshot the transaction started from.
    #[must_use]
    pub fn base(&self) -> &Snapshot {
        &self.base
    }

    /// State including this transaction's writes.
    #[must_use]
    pub fn working(&self) -> &Snapshot {
        &self.working
    }

    /// Mutable working state. Callers record what they touch.
    pub fn working_mut(&mut self) -> &mut Snapshot {
        &mut self.working
    }

    /// Records a changed, inserted or removed row.
    pub fn mark_dirty(&mut self, table: TableId, key: ObjectKey) {
        self.dirty.insert((table, key));
    }

    pub(crate) fn unmark_dirty(&mut self, table: TableId, key: ObjectKey) {
        self.dirty.remove(&(table, key));
    }

    /// Records a table whose rows must all be relogged.
    pub fn mark_rewritten(&mut self, table: TableId) {
        self.rewritten.insert(table);
    }

    /// Records a dropped table.
    pub fn mark_dropped(&mut self, table: TableId) {
        self.rewritten.remove(&table);
        self.dropped.insert(table);
    }

    /// Records a schema or schema-version change.
    pub fn mark_schema_changed(&mut self) {
        self.schema_changed = true;
    }

    /// Rows touched individually.
    #[must_use]
    pub fn dirty(&self) -> &BTreeSet<(TableId, ObjectKey)> {
        &self.dirty
    }

    /// Tables relogged in full.
    #[must_use]
    pub fn rewritten(&self) -> &BTreeSet<TableId> {
        &self.rewritten
    }

    /// Tables dropped.
    #[must_use]
    pub fn dropped(&self) -> &BTreeSet<TableId> {
        &self.dropped
    }

    /// Whether the schema or version changed.
    #[must_use]
    pub fn schema_changed(&self) -> bool {
        self.schema_changed
    }

    /// Whether commit has anything to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
            && self.rewritten.is_empty()
            && self.dropped.is_empty()
            && !self.schema_changed
    }

    pub(crate) fn into_working(self) -> Snapshot {
        self.working
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_write_set() {
        let base = Arc::new(Snapshot::empty(0));
        let mut txn = WriteTransaction::new(TransactionId::new(1), 9, base);
        assert!(txn.is_empty());
        assert_eq!(txn.handle(), 9);

        txn.mark_dirty(TableId::new(1), ObjectKey::new(2));
        txn.mark_rewritten(TableId::new(3));
        txn.mark_dropped(TableId::new(3));
        assert!(!txn.is_empty());
        assert!(txn.rewritten().is_empty());
        assert_eq!(txn.dropped().len(), 1);
        assert_eq!(txn.dirty().len(), 1);
    }
}
