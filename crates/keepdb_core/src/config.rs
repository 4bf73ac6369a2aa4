//! Store configuration and the process-wide default path.

use crate::error::{CoreError, CoreResult};
use crate::schema::{MigrationFn, SchemaItem};
use parking_lot::RwLock;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name used when no default path has been set.
pub const DEFAULT_FILE_NAME: &str = "default.keepdb";

static DEFAULT_PATH: RwLock<Option<PathBuf>> = parking_lot::const_rwlock(None);

/// Sets the path `open` uses when a [`Config`] names no path.
///
/// Relative config paths are resolved against this path's directory.
/// The value is read each time a store is opened, so it may be changed at
/// any point before an open.
pub fn set_default_path(path: impl Into<PathBuf>) {
    *DEFAULT_PATH.write() = Some(path.into());
}

/// The current default store path.
///
/// Falls back to [`DEFAULT_FILE_NAME`] in the working directory.
#[must_use]
pub fn default_path() -> PathBuf {
    if let Some(path) = DEFAULT_PATH.read().clone() {
        return path;
    }
    std::env::current_dir()
        .map(|dir| dir.join(DEFAULT_FILE_NAME))
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_FILE_NAME))
}

/// Configuration for opening a store.
#[derive(Clone)]
pub struct Config {
    /// Store directory; `None` means [`default_path`].
    pub path: Option<PathBuf>,

    /// Object types to register. `None` opens with the persisted schema.
    pub schema: Option<Vec<SchemaItem>>,

    /// Requested schema version. `None` opens at the persisted version.
    pub schema_version: Option<u64>,

    /// 64-byte encryption key.
    pub encryption_key: Option<Vec<u8>>,

    /// Runs when `schema_version` is above the persisted version.
    pub migration: Option<MigrationFn>,

    /// Keep everything in memory; nothing touches the file system.
    pub in_memory: bool,

    /// How long a writer waits for another handle's transaction to finish.
    pub busy_timeout: Duration,

    /// Whether to fsync the WAL on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Format version written into new stores.
    pub format_version: (u16, u16),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            schema: None,
            schema_version: None,
            encryption_key: None,
            migration: None,
            in_memory: false,
            busy_timeout: Duration::from_secs(5),
            sync_on_commit: true,
            create_if_missing: true,
            format_version: (1, 0),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("schema", &self.schema)
            .field("schema_version", &self.schema_version)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "[REDACTED]"))
            .field("migration", &self.migration.as_ref().map(|_| "<fn>"))
            .field("in_memory", &self.in_memory)
            .field("busy_timeout", &self.busy_timeout)
            .field("sync_on_commit", &self.sync_on_commit)
            .field("create_if_missing", &self.create_if_missing)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store path.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the object types to register.
    #[must_use]
    pub fn schema(mut self, items: impl IntoIterator<Item = impl Into<SchemaItem>>) -> Self {
        self.schema = Some(items.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the requested schema version.
    #[must_use]
    pub fn schema_version(mut self, version: u64) -> Self {
        self.schema_version = Some(version);
        self
    }

    /// Sets the encryption key.
    #[must_use]
    pub fn encryption_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Sets the migration callback.
    #[must_use]
    pub fn migration(mut self, migration: MigrationFn) -> Self {
        self.migration = Some(migration);
        self
    }

    /// Keeps the store in memory.
    #[must_use]
    pub const fn in_memory(mut self, value: bool) -> Self {
        self.in_memory = value;
        self
    }

    /// Sets the writer busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to sync the WAL on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Resolves the store path against the current default path.
    ///
    /// # Errors
    ///
    /// Fails if the configured path is empty.
    pub fn resolve_path(&self) -> CoreResult<PathBuf> {
        let base = default_path();
        match &self.path {
            None => Ok(base),
            Some(path) if path.as_os_str().is_empty() => {
                Err(CoreError::configuration("store path must not be empty"))
            }
            Some(path) if path.is_absolute() => Ok(path.clone()),
            Some(path) => Ok(base.parent().unwrap_or(Path::new("")).join(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert!(!config.in_memory);
        assert_eq!(config.schema_version, None);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .path("/tmp/store")
            .schema_version(3)
            .sync_on_commit(false)
            .busy_timeout(Duration::from_millis(10));
        assert_eq!(config.path.as_deref(), Some(Path::new("/tmp/store")));
        assert_eq!(config.schema_version, Some(3));
        assert!(!config.sync_on_commit);
        assert_eq!(config.busy_timeout, Duration::from_millis(10));
    }

    #[test]
    fn debug_redacts_key() {
        let config = Config::new().encryption_key(vec![7u8; 64]);
        let text = format!("{config:?}");
        assert!(text.contains("REDACTED"));
        assert!(!text.contains("7, 7"));
    }

    #[test]
    fn empty_path_is_rejected() {
        let config = Config::new().path("");
        assert!(matches!(
            config.resolve_path(),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn absolute_path_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("abs.keepdb");
        let config = Config::new().path(&target);
        assert_eq!(config.resolve_path().unwrap(), target);
    }
}
