//! Storage engine: tables, snapshots and the shared durable store.
//!
//! Rows live in column-major [`Table`]s. A [`Snapshot`] is an immutable map
//! of tables; writers copy tables on first touch. [`SharedStore`] owns the
//! WAL and segment file and publishes snapshots on commit.

mod catalog;
mod index;
pub(crate) mod row;
mod snapshot;
mod store;
mod table;

pub use index::IndexKey;
pub use snapshot::Snapshot;
pub use store::{CommitOutcome, CompactionStats, SharedStore};
pub use table::Table;

pub(crate) use store::verify_key;
