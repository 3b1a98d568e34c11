//! Partition directory management.
//!
//! Each durable partition owns one directory:
//!
//! ```text
//! <storage_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ data.cols         # Columnar sink (framed batches)
//! ├─ data.cols.tmp     # Compaction temp file
//! └─ wal/
//!    ├─ wal-000001.log # Active WAL generation
//!    └─ wal.tmp        # Truncate / consolidation temp file
//! ```
//!
//! The LOCK file ensures only one process writes to the partition at a time.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const WAL_DIR: &str = "wal";
const DATA_FILE: &str = "data.cols";
const DATA_TEMP: &str = "data.cols.tmp";

/// Holds the partition directory and its exclusive lock.
///
/// Only one `PartitionDir` can exist per directory at a time, across
/// processes. The lock is released when the value is dropped.
#[derive(Debug)]
pub struct PartitionDir {
    path: PathBuf,
    _lock_file: File,
}

impl PartitionDir {
    /// Opens or creates a partition directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PartitionLocked`] if another writer holds the
    /// lock, or an I/O error.
    pub fn open(path: &Path) -> CoreResult<Self> {
        fs::create_dir_all(path)?;

        if !path.is_dir() {
            return Err(CoreError::invalid_operation(format!(
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
            return Err(CoreError::PartitionLocked {
                path: path.to_path_buf(),
            });
        }

        fs::create_dir_all(path.join(WAL_DIR))?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the partition directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the WAL directory.
    #[must_use]
    pub fn wal_dir(&self) -> PathBuf {
        wal_dir(&self.path)
    }

    /// Returns the columnar data file.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.path.join(DATA_FILE)
    }

    /// Returns the compaction temp file.
    #[must_use]
    pub fn data_temp_path(&self) -> PathBuf {
        self.path.join(DATA_TEMP)
    }
}

/// The WAL directory inside a partition directory.
pub fn wal_dir(partition: &Path) -> PathBuf {
    partition.join(WAL_DIR)
}

/// Syncs a directory so that creates, renames and deletes inside it are
/// durable.
///
/// Windows NTFS journals metadata itself, so this is a no-op there.
#[cfg(unix)]
pub fn sync_directory(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

/// Syncs a directory so that creates, renames and deletes inside it are
/// durable.
#[cfg(not(unix))]
pub fn sync_directory(_path: &Path) -> CoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_layout() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bucket-1");

        let dir = PartitionDir::open(&path).unwrap();
        assert!(path.join("LOCK").exists());
        assert!(dir.wal_dir().is_dir());
        assert_eq!(dir.data_path(), path.join("data.cols"));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();

        let _first = PartitionDir::open(temp.path()).unwrap();
        let result = PartitionDir::open(temp.path());
        assert!(matches!(result, Err(CoreError::PartitionLocked { .. })));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _dir = PartitionDir::open(temp.path()).unwrap();
        }
        let _again = PartitionDir::open(temp.path()).unwrap();
    }

    #[test]
    fn open_rejects_file_path() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(PartitionDir::open(&file).is_err());
    }
}
