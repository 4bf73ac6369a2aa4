//! Write transactions.
//!
//! A handle moves `Idle -> InTransaction -> Idle`. Beginning takes the
//! store's [`WriterGate`], so at most one transaction per store is open.
//! Mutations go to a private copy of the committed snapshot; commit logs
//! and applies them, rollback drops the copy.

mod gate;
mod scope;
mod state;

pub use gate::WriterGate;
pub use state::WriteTransaction;

pub(crate) use scope::WriteScope;
