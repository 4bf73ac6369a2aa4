//! Store directory layout and locking.
//!
//! ```text
//! <store path>/
//! ├─ MANIFEST          # format, schema version, catalog, key check
//! ├─ LOCK              # advisory lock held while the store is open
//! ├─ wal.log           # write-ahead log
//! └─ segments.dat      # applied rows
//! ```

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const LOCK_FILE: &str = "LOCK";
const WAL_FILE: &str = "wal.log";
pub(crate) const SEGMENT_FILE: &str = "segments.dat";

/// An open store directory.
///
/// Holds an exclusive advisory lock on `LOCK` until dropped, so a second
/// process cannot open the same store.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Fails with `DatabaseLocked` if another process holds the lock, or
    /// with `InvalidFormat` if the path is missing (and may not be created)
    /// or is not a directory.
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// The store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the WAL file.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        wal_path(&self.path)
    }

    /// Path of the segment file.
    #[must_use]
    pub fn segment_path(&self) -> PathBuf {
        self.path.join(SEGMENT_FILE)
    }

    /// Path of the manifest.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.path)
    }

    /// Loads the manifest, or `None` for a new store.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or a malformed manifest.
    pub fn load_manifest(&self) -> CoreResult<Option<Manifest>> {
        read_manifest(&self.path)
    }

    /// Writes the manifest with write-temp, fsync, rename, fsync-dir.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors; the previous manifest is intact on failure.
    pub fn save_manifest(&self, manifest: &Manifest) -> CoreResult<()> {
        let temp_path = self.path.join(MANIFEST_TEMP);
        let data = manifest.encode()?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.manifest_path())?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Path of the manifest inside a store directory.
#[must_use]
pub fn manifest_path(store: &Path) -> PathBuf {
    store.join(MANIFEST_FILE)
}

/// Path of the WAL inside a store directory.
#[must_use]
pub fn wal_path(store: &Path) -> PathBuf {
    store.join(WAL_FILE)
}

/// Reads a store's manifest without taking the lock.
///
/// # Errors
///
/// Fails on I/O errors or a malformed manifest.
pub fn read_manifest(store: &Path) -> CoreResult<Option<Manifest>> {
    let path = manifest_path(store);
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(&path)?;
    if data.is_empty() {
        return Ok(None);
    }
    Manifest::decode(&data).map(Some)
}
