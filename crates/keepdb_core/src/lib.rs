//! # KeepDB Core
//!
//! Embedded, schema-managed object store.
//!
//! This crate provides:
//! - Schema registry with validation, versioning and migrations
//! - Live objects and result sets that always reflect committed state
//! - Serialized write transactions with all-or-nothing commit
//! - WAL (Write-Ahead Log) plus segment file for crash-safe persistence
//! - Commit listeners and a per-object change feed
//! - Optional encryption at rest (`encryption` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use keepdb_core::{Config, ObjectSchema, PropertyDescriptor, PropertyType, Realm, UpdateMode, Values};
//!
//! let person = ObjectSchema::new("Person")
//!     .with_property(PropertyDescriptor::new("name", PropertyType::String))
//!     .with_property(PropertyDescriptor::new("age", PropertyType::Int).optional());
//!
//! let realm = Realm::open(Config::new().path("people.keepdb").schema([person]))?;
//! let alice = realm.write(|r| {
//!     r.create("Person", Values::new().with("name", "Alice").with("age", 30), UpdateMode::Disallowed)
//! })?;
//! assert_eq!(alice.get("name")?.as_str(), Some("Alice"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod config;
mod crypto;
mod dir;
mod engine;
mod error;
mod manifest;
mod notify;
mod object;
mod realm;
mod schema;
mod segment;
mod transaction;
mod types;
mod wal;
mod wire;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeType};
pub use config::{default_path, set_default_path, Config};
pub use crypto::STORE_KEY_SIZE;
pub use engine::CompactionStats;
pub use error::{CoreError, CoreResult};
pub use manifest::Manifest;
pub use notify::{Listener, CHANGE_EVENT};
pub use object::{Deletable, Input, Object, ObjectFactory, ResultSet, UpdateMode, Value, Values};
pub use realm::{schema_version_of, Realm, SnapshotView, StorageStats};
pub use schema::{
    MigrationContext, MigrationFn, ObjectSchema, PropertyDescriptor, PropertyType, Schema,
    SchemaItem,
};
pub use types::{ObjectKey, SequenceNumber, TableId, TransactionId};
pub use wal::{WalManager, WalRecord};
pub use wire::compute_crc32;

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Read-only access to a store's files, for tooling.
pub mod inspect {
    pub use crate::dir::{manifest_path, read_manifest, wal_path};
    pub use crate::wal::{WalRecordIterator, WalRecordType};
}
