//! CLI error type.

use keepdb_core::CoreError;
use keepdb_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by the `keepdb` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// No store exists at the path.
    #[error("no store found at {}", path.display())]
    NotFound {
        /// The path that was checked.
        path: PathBuf,
    },

    /// The `--key-hex` argument is not valid hex.
    #[error("invalid --key-hex: {0}")]
    InvalidKey(String),

    /// Error from the store.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from a storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON output failed.
    #[error("json output: {0}")]
    Json(#[from] serde_json::Error),
}
