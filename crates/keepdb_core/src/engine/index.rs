//! Table indexes.
//!
//! The primary key uses a unique [`HashIndex`]; `indexed` properties use a
//! [`SortedIndex`]. Both are rebuilt from the columns when a table is
//! loaded and maintained on every row change.

use crate::object::Value;
use crate::types::ObjectKey;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Key of an index entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    /// Null value of an optional property.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// String.
    String(String),
    /// Date in milliseconds.
    Date(i64),
}

impl IndexKey {
    /// The index key of an indexable value.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(IndexKey::Null),
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Int(i) => Some(IndexKey::Int(*i)),
            Value::String(s) => Some(IndexKey::String(s.clone())),
            Value::Date(ms) => Some(IndexKey::Date(*ms)),
            _ => None,
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Null => f.write_str("null"),
            IndexKey::Bool(b) => write!(f, "{b}"),
            IndexKey::Int(i) => write!(f, "{i}"),
            IndexKey::String(s) => f.write_str(s),
            IndexKey::Date(ms) => write!(f, "{ms}ms"),
        }
    }
}

/// Unique key to row mapping.
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    entries: HashMap<IndexKey, ObjectKey>,
}

impl HashIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `key` to `row`, returning the row it displaced.
    pub fn insert(&mut self, key: IndexKey, row: ObjectKey) -> Option<ObjectKey> {
        self.entries.insert(key, row)
    }

    /// Removes `key` if it maps to `row`.
    pub fn remove(&mut self, key: &IndexKey, row: ObjectKey) {
        if self.entries.get(key) == Some(&row) {
            self.entries.remove(key);
        }
    }

    /// The row holding `key`.
    #[must_use]
    pub fn get(&self, key: &IndexKey) -> Option<ObjectKey> {
        self.entries.get(key).copied()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Ordered, non-unique key to rows mapping.
#[derive(Debug, Clone, Default)]
pub struct SortedIndex {
    entries: BTreeMap<IndexKey, BTreeSet<ObjectKey>>,
}

impl SortedIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `row` under `key`.
    pub fn insert(&mut self, key: IndexKey, row: ObjectKey) {
        self.entries.entry(key).or_default().insert(row);
    }

    /// Removes `row` from under `key`.
    pub fn remove(&mut self, key: &IndexKey, row: ObjectKey) {
        if let Some(rows) = self.entries.get_mut(key) {
            rows.remove(&row);
            if rows.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Rows holding `key`, in key order.
    #[must_use]
    pub fn lookup(&self, key: &IndexKey) -> Vec<ObjectKey> {
        self.entries
            .get(key)
            .map(|rows| rows.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn distinct_keys(&self) -> usize {
        self.entries.len()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
