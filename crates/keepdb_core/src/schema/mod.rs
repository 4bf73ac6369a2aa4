//! Schema registry.
//!
//! Object types are declared as [`ObjectSchema`]s, optionally bound to an
//! [`ObjectFactory`](crate::ObjectFactory), and validated into a [`Schema`]
//! before any storage is touched. At open the validated schema is
//! reconciled against the persisted one, which may extend it, migrate it
//! to a newer version or reject the open.

mod migration;
mod object_schema;
mod property;
mod registry;

pub use migration::{MigrationContext, MigrationFn};
pub use object_schema::ObjectSchema;
pub use property::{PropertyDescriptor, PropertyType};
pub use registry::{Schema, SchemaItem};

pub(crate) use migration::{plan, SchemaPlan};
pub(crate) use property::{coerce_value, describe_input};
