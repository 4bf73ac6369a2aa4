//! # KeepDB Testkit
//!
//! Test utilities for KeepDB.
//!
//! This crate provides:
//! - Schema fixtures and temp-dir backed realms
//! - Property-based generators and a reference model using proptest
//! - Crash images for recovery tests
//! - Concurrent writer stress helpers
//!
//! The behavioral suite lives in this crate's `tests/` directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keepdb_testkit::prelude::*;
//!
//! #[test]
//! fn creates_objects() {
//!     let test = TestRealm::new();
//!     scenarios::populate_test_objects(&test, 3);
//!     assert_eq!(test.objects("TestObject").unwrap().len().unwrap(), 3);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
