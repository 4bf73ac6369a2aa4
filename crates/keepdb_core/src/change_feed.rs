//! Per-object change stream.
//!
//! Every commit emits one event per inserted, updated or deleted object,
//! in commit order, to all subscribers of the store. Unlike `on("change")`
//! listeners, which are registered per handle and only learn that a commit
//! happened, the feed is shared by every handle on a path and says what
//! changed.
//!
//! ```rust,ignore
//! let events = realm.subscribe_changes()?;
//! realm.write(|r| r.create("Person", values, UpdateMode::Disallowed).map(drop))?;
//! let event = events.recv()?;
//! assert_eq!(event.change_type, ChangeType::Insert);
//! ```

use crate::types::{ObjectKey, SequenceNumber, TableId};
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// The object did not exist before the commit.
    Insert,
    /// The object existed and was modified.
    Update,
    /// The object was removed.
    Delete,
}

/// One object changed by a commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Commit sequence.
    pub sequence: SequenceNumber,
    /// Table of the object.
    pub table: TableId,
    /// Object type name.
    pub object_type: String,
    /// Row key.
    pub key: ObjectKey,
    /// Kind of change.
    pub change_type: ChangeType,
    /// Encoded row after the change; `None` for deletes.
    pub payload: Option<Vec<u8>>,
}

/// Fan-out of change events to subscribers, with bounded history.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    history: RwLock<Vec<ChangeEvent>>,
    max_history: usize,
}

impl ChangeFeed {
    /// A feed keeping the last 10 000 events.
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// A feed keeping the last `max_history` events.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
        }
    }

    /// Receives every event emitted from now on.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits the events of one commit. Disconnected subscribers are dropped.
    pub fn emit_batch(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        {
            let mut history = self.history.write();
            history.extend(events.iter().cloned());
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(0..excess);
            }
        }
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| events.iter().all(|e| tx.send(e.clone()).is_ok()));
    }

    /// Events with a sequence above `cursor`, at most `limit`.
    pub fn poll(&self, cursor: SequenceNumber, limit: usize) -> Vec<ChangeEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Sequence of the newest event in history.
    pub fn latest_sequence(&self) -> SequenceNumber {
        self.history
            .read()
            .last()
            .map(|e| e.sequence)
            .unwrap_or_default()
    }

    /// Live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Events held in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
