//! Test fixtures and partition helpers.
//!
//! Provides convenience functions for setting up partitions in temporary
//! directories and for simulating a process crash between runs.

use persisting_codec::Record;
use persisting_core::{ColumnarSink, Config, PartitionBackend};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A durable partition in a temporary directory.
///
/// The directory outlives the backend, so the partition can be "crashed"
/// (dropped without `close`) and opened again on the same files.
pub struct TestPartition {
    backend: Option<PartitionBackend<ColumnarSink>>,
    config: Config,
    temp_dir: TempDir,
}

impl TestPartition {
    /// Opens a WAL-backed partition with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Opens a WAL-backed partition with `config`.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend = open(temp_dir.path(), config.clone());
        Self {
            backend: Some(backend),
            config,
            temp_dir,
        }
    }

    /// The open backend.
    pub fn backend(&self) -> &PartitionBackend<ColumnarSink> {
        self.backend.as_ref().expect("partition is not open")
    }

    /// Drops the backend without flushing or closing, leaving the files as
    /// a killed process would.
    pub fn crash(&mut self) {
        self.backend = None;
    }

    /// Opens the partition again on the same directory.
    pub fn reopen(&mut self) -> &PartitionBackend<ColumnarSink> {
        self.backend = None;
        self.backend = Some(open(self.temp_dir.path(), self.config.clone()));
        self.backend()
    }

    /// Crashes, then reopens.
    pub fn crash_and_reopen(&mut self) -> &PartitionBackend<ColumnarSink> {
        self.crash();
        self.reopen()
    }

    /// The partition directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The WAL directory.
    pub fn wal_dir(&self) -> PathBuf {
        persisting_core::wal_dir(self.temp_dir.path())
    }

    /// Path of the newest WAL generation, if any exists.
    pub fn active_wal_path(&self) -> Option<PathBuf> {
        let wal_dir = self.wal_dir();
        persisting_core::wal::list_generations(&wal_dir)
            .expect("Failed to list WAL generations")
            .last()
            .map(|generation| persisting_core::wal::generation_path(&wal_dir, *generation))
    }
}

impl Default for TestPartition {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestPartition {
    type Target = PartitionBackend<ColumnarSink>;

    fn deref(&self) -> &Self::Target {
        self.backend()
    }
}

fn open(path: &Path, config: Config) -> PartitionBackend<ColumnarSink> {
    PartitionBackend::persisting("test-bucket", path, config).expect("Failed to open partition")
}

/// A record with a single text `id` field.
pub fn id_record(id: impl Into<String>) -> Record {
    Record::new().with("id", id.into())
}

/// Records `{"id": "0"}` through `{"id": "n-1"}`.
pub fn id_records(n: usize) -> Vec<Record> {
    (0..n).map(|i| id_record(i.to_string())).collect()
}

/// The text `id` field of each record, `""` where missing.
pub fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            record
                .get("id")
                .and_then(|value| value.as_text())
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}
