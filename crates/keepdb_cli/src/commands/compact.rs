//! Compact command implementation.

use super::{format_size, StoreArgs};
use crate::error::CliResult;
use keepdb_core::CompactionStats;
use tracing::info;

/// Runs the compact command.
pub fn run(store: &StoreArgs) -> CliResult<()> {
    let stats = compact(store)?;
    println!("Compaction complete");
    println!("  Live rows:     {}", stats.live_rows);
    println!("  Before:        {}", format_size(stats.bytes_before));
    println!("  After:         {}", format_size(stats.bytes_after));
    println!(
        "  Reclaimed:     {}",
        format_size(stats.bytes_before.saturating_sub(stats.bytes_after))
    );
    Ok(())
}

fn compact(store: &StoreArgs) -> CliResult<CompactionStats> {
    let realm = store.open()?;
    realm.checkpoint()?;
    let stats = realm.compact()?;
    info!(path = %store.path.display(), live_rows = stats.live_rows, "compacted store");
    realm.close();
    Ok(stats)
}
