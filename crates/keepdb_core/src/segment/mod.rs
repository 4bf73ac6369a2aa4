//! Segment file holding the applied row state.
//!
//! Committed rows are appended here after the WAL flush. The file is an
//! append-only log of puts, tombstones and table clears; the latest record
//! for a row wins. Compaction rewrites it with only live rows.

mod record;
mod store;

pub use record::{SegmentRecord, SegmentRecordFlags};
pub use store::SegmentStore;
