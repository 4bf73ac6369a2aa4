//! Write-ahead log.
//!
//! Every commit is appended here, and flushed, before its effects reach the
//! segment file or become visible to readers. On open, committed
//! transactions are replayed over the segment state.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Recovery Policy
//!
//! - A truncated header or payload at the tail is a crash mid-append. The
//!   iterator stops there and the incomplete transaction is discarded.
//! - A CRC mismatch, bad magic, unknown type or future version is
//!   corruption and fails the open.

mod iterator;
mod record;
mod writer;

pub use iterator::WalRecordIterator;
pub use record::{WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
pub use writer::WalManager;

/// Header size: magic (4) + version (2) + type (1) + length (4).
pub(crate) const HEADER_SIZE: usize = 11;

/// Trailing CRC size.
pub(crate) const CRC_SIZE: usize = 4;
