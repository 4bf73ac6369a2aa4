//! Schema-version command implementation.

use super::StoreArgs;
use crate::error::CliResult;
use keepdb_core::schema_version_of;

/// Runs the schema-version command.
pub fn run(store: &StoreArgs) -> CliResult<()> {
    println!("{}", version(store)?);
    Ok(())
}

fn version(store: &StoreArgs) -> CliResult<i64> {
    Ok(schema_version_of(&store.path, store.key.as_deref())?)
}
