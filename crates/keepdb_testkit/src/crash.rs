//! Crash recovery helpers.
//!
//! A crash image is a copy of a store's files taken while the store is
//! still open: whatever the last commit made durable is on disk, but no
//! checkpoint or close has run. Opening the copy exercises the same
//! recovery path as a process that died.
//!
//! ```rust,ignore
//! let image = CrashImage::capture(&realm)?;
//! image.tear_wal_tail(3)?;
//! let recovered = image.open(Config::new().schema(full_schema()))?;
//! ```

use keepdb_core::inspect::wal_path;
use keepdb_core::{Config, CoreResult, Realm};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STORE_FILES: [&str; 3] = ["MANIFEST", "wal.log", "segments.dat"];

/// Copy of a store's files at one instant.
pub struct CrashImage {
    dir: TempDir,
}

impl CrashImage {
    /// Copies the files of the open store behind `realm`.
    ///
    /// # Errors
    ///
    /// Fails for in-memory realms and on I/O errors.
    pub fn capture(realm: &Realm) -> io::Result<Self> {
        let source = realm.path().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "in-memory realm has no files")
        })?;
        Self::capture_path(source)
    }

    /// Copies the store files under `source`.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn capture_path(source: &Path) -> io::Result<Self> {
        let dir = TempDir::new()?;
        let target = dir.path().join("crashed.keepdb");
        fs::create_dir_all(&target)?;
        for name in STORE_FILES {
            let file = source.join(name);
            if file.exists() {
                fs::copy(&file, target.join(name))?;
            }
        }
        Ok(Self { dir })
    }

    /// Path of the copied store.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("crashed.keepdb")
    }

    /// Size of the copied WAL.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn wal_len(&self) -> io::Result<u64> {
        Ok(fs::metadata(wal_path(&self.path()))?.len())
    }

    /// Cuts `bytes` off the end of the WAL, as a write torn by power loss.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn tear_wal_tail(&self, bytes: u64) -> io::Result<()> {
        let len = self.wal_len()?;
        let file = OpenOptions::new().write(true).open(wal_path(&self.path()))?;
        file.set_len(len.saturating_sub(bytes))?;
        file.sync_all()
    }

    /// Appends `bytes` of garbage to the WAL.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn append_wal_garbage(&self, bytes: usize) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(wal_path(&self.path()))?;
        file.write_all(&vec![0xA5; bytes])?;
        file.sync_all()
    }

    /// Opens the copied store with `config`; its path is replaced.
    ///
    /// # Errors
    ///
    /// Any open error, including corruption the recovery rejects.
    pub fn open(&self, config: Config) -> CoreResult<Realm> {
        Realm::open(config.path(self.path()).create_if_missing(false))
    }
}
