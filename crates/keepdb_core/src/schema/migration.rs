//! Schema versions and migrations.
//!
//! A store records the schema version its catalog was written at. Opening
//! with a version compares it with the persisted one:
//!
//! - no version requested, or an equal one: open at the persisted version;
//!   the caller may add types but not change existing ones
//! - lower: rejected
//! - higher: the caller's migration runs in the transaction that commits
//!   the new schema and version

use crate::error::{CoreError, CoreResult};
use crate::realm::Realm;
use crate::schema::registry::Schema;
use std::sync::Arc;

/// Migration callback run when the requested schema version is newer.
pub type MigrationFn = Arc<dyn Fn(&MigrationContext<'_>) -> CoreResult<()> + Send + Sync>;

/// What a migration callback sees.
///
/// The callback runs inside the write transaction that commits the new
/// schema, so `realm` already exposes the new types.
pub struct MigrationContext<'a> {
    /// Version the store was at.
    pub old_version: u64,
    /// Version being committed.
    pub new_version: u64,
    /// Handle to the store being migrated.
    pub realm: &'a Realm,
}

/// How the persisted schema has to change at open.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SchemaPlan {
    /// Nothing to write.
    Keep,
    /// Commit `schema` at the persisted version.
    Extend(Schema),
    /// Commit `schema` at `version` after running the migration.
    Migrate {
        /// The new schema.
        schema: Schema,
        /// The new version.
        version: u64,
    },
}

/// Decides how to reconcile the requested schema with the persisted one.
pub(crate) fn plan(
    persisted: &Schema,
    persisted_version: u64,
    requested: Option<&Schema>,
    requested_version: Option<u64>,
    has_migration: bool,
) -> CoreResult<SchemaPlan> {
    let mismatch = |requested| CoreError::SchemaVersionMismatch {
        persisted: persisted_version,
        requested,
    };

    match requested_version {
        Some(version) if version < persisted_version => Err(mismatch(version)),
        Some(version) if version > persisted_version => {
            if !has_migration {
                return Err(mismatch(version));
            }
            Ok(SchemaPlan::Migrate {
                schema: requested.cloned().unwrap_or_else(|| persisted.clone()),
                version,
            })
        }
        _ => {
            let Some(schema) = requested else {
                return Ok(SchemaPlan::Keep);
            };
            extend(persisted, schema)
        }
    }
}

/// Adds the new types of `requested` to `persisted`. A type that exists on
/// both sides must be identical, since its rows are laid out for the stored
/// definition.
fn extend(persisted: &Schema, requested: &Schema) -> CoreResult<SchemaPlan> {
    for object_schema in requested.object_schemas() {
        if let Some(existing) = persisted.get(&object_schema.name) {
            if existing != object_schema {
                return Err(CoreError::schema_validation(format!(
                    "object type '{}' differs from the stored definition; \
                     changing it requires a schema version bump",
                    object_schema.name
                )));
            }
        }
    }
    let merged = persisted.overlay(requested)?;
    if merged == *persisted {
        Ok(SchemaPlan::Keep)
    } else {
        Ok(SchemaPlan::Extend(merged))
    }
}
