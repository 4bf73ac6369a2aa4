//! CLI command implementations.

pub mod compact;
pub mod dump_wal;
pub mod inspect;
pub mod schema_version;

use crate::error::{CliError, CliResult};
use clap::ValueEnum;
use keepdb_core::{default_path, inspect::read_manifest, Config, Manifest, Realm};
use std::path::PathBuf;

/// Output format of reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Store location and key shared by every command.
#[derive(Debug)]
pub struct StoreArgs {
    /// Store directory.
    pub path: PathBuf,
    /// Decoded encryption key.
    pub key: Option<Vec<u8>>,
}

impl StoreArgs {
    /// Resolves `path` (default path when absent) and decodes `key_hex`.
    pub fn new(path: Option<PathBuf>, key_hex: Option<&str>) -> CliResult<Self> {
        let key = key_hex.map(decode_hex).transpose()?;
        Ok(Self {
            path: path.unwrap_or_else(default_path),
            key,
        })
    }

    /// Manifest of an existing store.
    pub fn manifest(&self) -> CliResult<Manifest> {
        read_manifest(&self.path)?.ok_or_else(|| CliError::NotFound {
            path: self.path.clone(),
        })
    }

    /// Opens the existing store with its persisted schema.
    pub fn open(&self) -> CliResult<Realm> {
        self.manifest()?;
        let mut config = Config::new().path(&self.path).create_if_missing(false);
        if let Some(key) = &self.key {
            config = config.encryption_key(key.clone());
        }
        Ok(Realm::open(config)?)
    }
}

fn decode_hex(text: &str) -> CliResult<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return Err(CliError::InvalidKey("odd number of hex digits".into()));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::InvalidKey(format!("bad hex digit near offset {i}")))
        })
        .collect()
}

/// Formats a byte count for text output.
pub(crate) fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
