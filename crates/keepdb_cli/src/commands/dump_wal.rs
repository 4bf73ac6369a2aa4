//! Dump-wal command implementation.

use super::{OutputFormat, StoreArgs};
use crate::error::{CliError, CliResult};
use keepdb_core::inspect::wal_path;
use keepdb_core::{WalManager, WalRecord};
use keepdb_storage::FileBackend;
use serde::Serialize;

/// WAL record representation for output.
#[derive(Debug, Serialize)]
pub struct WalRecordInfo {
    /// Offset in the WAL file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Transaction ID (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<u64>,
    /// Table ID (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<u32>,
    /// Row key (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<u64>,
    /// Sequence number (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Schema version staged by a schema record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u64>,
    /// Payload size in bytes (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_size: Option<usize>,
}

impl WalRecordInfo {
    fn new(offset: u64, record: &WalRecord) -> Self {
        let mut info = Self {
            offset,
            record_type: format!("{:?}", record.record_type()).to_uppercase(),
            txid: record.txid().map(|t| t.as_u64()),
            table: None,
            key: None,
            sequence: None,
            schema_version: None,
            payload_size: None,
        };
        match record {
            WalRecord::Put {
                table, key, payload, ..
            } => {
                info.table = Some(table.as_u32());
                info.key = Some(key.as_u64());
                info.payload_size = Some(payload.len());
            }
            WalRecord::Delete { table, key, .. } => {
                info.table = Some(table.as_u32());
                info.key = Some(key.as_u64());
            }
            WalRecord::Clear { table, .. } => info.table = Some(table.as_u32()),
            WalRecord::Schema {
                version, catalog, ..
            } => {
                info.schema_version = Some(*version);
                info.payload_size = Some(catalog.len());
            }
            WalRecord::Commit { sequence, .. } | WalRecord::Checkpoint { sequence } => {
                info.sequence = Some(sequence.as_u64());
            }
            WalRecord::Begin { .. } | WalRecord::Abort { .. } => {}
        }
        info
    }
}

/// Runs the dump-wal command.
pub fn run(store: &StoreArgs, limit: Option<usize>, format: OutputFormat) -> CliResult<()> {
    let records = read_wal_records(store, limit)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => print_text_output(&records),
    }
    Ok(())
}

fn read_wal_records(store: &StoreArgs, limit: Option<usize>) -> CliResult<Vec<WalRecordInfo>> {
    let path = wal_path(&store.path);
    if !path.exists() {
        return Err(CliError::NotFound {
            path: store.path.clone(),
        });
    }
    let wal = WalManager::new(Box::new(FileBackend::open(&path)?), false);
    let mut records = Vec::new();
    for entry in wal.iter()?.take(limit.unwrap_or(usize::MAX)) {
        let (offset, record) = entry?;
        records.push(WalRecordInfo::new(offset, &record));
    }
    Ok(records)
}

fn print_text_output(records: &[WalRecordInfo]) {
    println!("WAL Records ({} total)", records.len());
    println!("================");
    println!();

    for record in records {
        print!("[{:08}] {:10}", record.offset, record.record_type);
        if let Some(txid) = record.txid {
            print!(" txid={txid}");
        }
        if let Some(seq) = record.sequence {
            print!(" seq={seq}");
        }
        if let Some(table) = record.table {
            print!(" table={table}");
        }
        if let Some(key) = record.key {
            print!(" key={key}");
        }
        if let Some(version) = record.schema_version {
            print!(" version={version}");
        }
        if let Some(size) = record.payload_size {
            print!(" payload={size} bytes");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::create_store;
    use keepdb_core::{Config, Realm, UpdateMode, Values};

    #[test]
    fn lists_records_of_the_last_checkpoint_and_later_commits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");
        create_store(&path, 0);

        // Keep a handle open so the commit stays in the WAL.
        let realm = Realm::open(Config::new().path(&path)).unwrap();
        realm
            .write(|r| {
                r.create("Note", Values::new().with("title", "hi"), UpdateMode::Disallowed)
                    .map(drop)
            })
            .unwrap();

        let store = StoreArgs::new(Some(path), None).unwrap();
        let records = read_wal_records(&store, None).unwrap();
        let types: Vec<&str> = records.iter().map(|r| r.record_type.as_str()).collect();
        assert_eq!(types, vec!["CHECKPOINT", "BEGIN", "PUT", "COMMIT"]);
        assert!(records[2].table.is_some());
        assert!(records[2].payload_size.unwrap() > 0);
        assert_eq!(records[3].sequence, Some(1));

        let limited = read_wal_records(&store, Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        realm.close();
    }
}
