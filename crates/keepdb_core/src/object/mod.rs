//! Typed objects, result sets and the create / upsert / delete machinery.
//!
//! Objects are never copied out of the store: an [`Object`] is a
//! `(realm, table, key)` triple and every read goes through the realm's
//! current view. A [`ResultSet`] is likewise recomputed on each access.

mod factory;
mod handle;
mod results;
mod value;
pub(crate) mod writer;

pub use factory::ObjectFactory;
pub use handle::Object;
pub use results::{Deletable, ResultSet};
pub use value::{Input, UpdateMode, Value, Values};

pub(crate) use factory::same_factory;
