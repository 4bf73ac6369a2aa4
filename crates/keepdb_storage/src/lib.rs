//! # KeepDB Storage
//!
//! Byte-store backends used by the KeepDB engine.
//!
//! A backend knows nothing about write-ahead logs, segments or objects.
//! It stores bytes at offsets and makes them durable when asked. The core
//! crate owns every file format built on top of it.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] for in-memory stores and tests
//! - [`FileBackend`] for persistent stores
//!
//! ## Example
//!
//! ```rust
//! use keepdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"row bytes").unwrap();
//! assert_eq!(backend.read_at(offset, 9).unwrap(), b"row bytes");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
