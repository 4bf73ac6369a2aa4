//! Inspect command implementation.

use super::{format_size, OutputFormat, StoreArgs};
use crate::error::CliResult;
use serde::Serialize;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// On-disk format version, `major.minor`.
    pub format_version: String,
    /// Persisted schema version.
    pub schema_version: u64,
    /// Whether payloads are encrypted.
    pub encrypted: bool,
    /// Sequence of the latest commit.
    pub sequence: u64,
    /// Sequence of the last checkpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<u64>,
    /// WAL file size in bytes.
    pub wal_size: u64,
    /// Segment file size in bytes.
    pub segment_size: u64,
    /// Object types in schema order.
    pub tables: Vec<TableInfo>,
}

/// One object type of the store.
#[derive(Debug, Serialize)]
pub struct TableInfo {
    /// Object type name.
    pub name: String,
    /// Number of objects.
    pub objects: usize,
    /// Primary key property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// `name: type` of every property.
    pub properties: Vec<String>,
}

/// Runs the inspect command.
pub fn run(store: &StoreArgs, format: OutputFormat) -> CliResult<()> {
    let result = inspect(store)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn inspect(store: &StoreArgs) -> CliResult<InspectResult> {
    let manifest = store.manifest()?;
    let realm = store.open()?;
    let snapshot = realm.snapshot()?;
    let stats = realm.storage_stats()?;
    let schema = snapshot.schema();

    let tables = snapshot
        .object_counts()
        .into_iter()
        .map(|(name, objects)| {
            let object_schema = schema.get(&name);
            TableInfo {
                primary_key: object_schema.and_then(|s| s.primary_key.clone()),
                properties: object_schema
                    .map(|s| {
                        s.properties
                            .iter()
                            .map(|p| format!("{}: {}", p.name, p.property_type))
                            .collect()
                    })
                    .unwrap_or_default(),
                name,
                objects,
            }
        })
        .collect();

    let result = InspectResult {
        path: store.path.display().to_string(),
        format_version: format!("{}.{}", manifest.format_version.0, manifest.format_version.1),
        schema_version: snapshot.schema_version(),
        encrypted: realm.is_encrypted()?,
        sequence: stats.sequence.as_u64(),
        last_checkpoint: manifest.last_checkpoint.map(|s| s.as_u64()),
        wal_size: stats.wal_bytes,
        segment_size: stats.segment_bytes,
        tables,
    };
    realm.close();
    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("KeepDB Store Inspection");
    println!("=======================");
    println!();
    println!("Path:            {}", result.path);
    println!("Format version:  {}", result.format_version);
    println!("Schema version:  {}", result.schema_version);
    println!("Encrypted:       {}", if result.encrypted { "yes" } else { "no" });
    println!("Sequence:        {}", result.sequence);
    println!();
    println!("Storage:");
    println!("  WAL size:      {}", format_size(result.wal_size));
    println!("  Segment size:  {}", format_size(result.segment_size));
    println!();
    println!("Tables:");
    for table in &result.tables {
        let key = table
            .primary_key
            .as_deref()
            .map(|pk| format!(", primary key {pk}"))
            .unwrap_or_default();
        println!("  {} ({} objects{key})", table.name, table.objects);
        for property in &table.properties {
            println!("    {property}");
        }
    }
}
