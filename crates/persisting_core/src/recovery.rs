//! Crash recovery of a partition's WAL.
//!
//! Runs once when a durable partition opens, before any `put` or `get`.
//! The newest WAL generation is scanned; the records found are exactly the
//! ones the sink never received, and they go back into the buffer.
//! Recovery never touches the sink.

use crate::dir::sync_directory;
use crate::error::CoreResult;
use crate::wal::{
    generation_path, list_generations, scan_frames, write_generation, ScanEnd, ScanEvent,
    SyncMode, WalFile, WalScan, WAL_TEMP,
};
use persisting_codec::Record;
use persisting_storage::FileBackend;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// What recovery found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Generations scanned.
    pub generations: usize,
    /// Records restored.
    pub recovered: usize,
    /// Corrupt frames skipped.
    pub corrupt_frames: usize,
    /// Whether the newest generation ended exactly at a frame boundary.
    pub clean_tail: bool,
    /// Whether the records were rewritten into a fresh generation.
    pub consolidated: bool,
}

impl Default for RecoveryReport {
    fn default() -> Self {
        Self {
            generations: 0,
            recovered: 0,
            corrupt_frames: 0,
            clean_tail: true,
            consolidated: false,
        }
    }
}

/// The outcome of recovery: an open WAL positioned for appends and the
/// records to put back into the buffer.
#[derive(Debug)]
pub struct Recovered {
    /// The active WAL.
    pub wal: WalFile,
    /// Recovered records in write order.
    pub records: Vec<Record>,
    /// Summary.
    pub report: RecoveryReport,
}

/// Scan result for one generation, for inspection tools.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationScan {
    /// Generation id.
    pub generation: u64,
    /// Frames found.
    pub scan: WalScan,
}

/// Scans every WAL generation in `wal_dir` without modifying anything.
///
/// # Errors
///
/// Returns an error only for I/O failures.
pub fn inspect_wal(wal_dir: &Path) -> CoreResult<Vec<GenerationScan>> {
    list_generations(wal_dir)?
        .into_iter()
        .map(|generation| {
            let backend = FileBackend::open(&generation_path(wal_dir, generation))?;
            Ok(GenerationScan {
                generation,
                scan: scan_frames(&backend)?,
            })
        })
        .collect()
}

/// Recovers the WAL in `wal_dir` and opens it for appending.
///
/// With no WAL present a fresh generation is created. Only the newest
/// generation is authoritative: an older one is either already flushed
/// (rotation follows a flush) or superseded by an earlier consolidation
/// that crashed before cleaning up, and is removed.
///
/// When records were found, when the newest generation holds damage, or
/// when stale generations exist, the recovered records are rewritten into
/// one new generation, so later appends never land behind an unreadable
/// tail. Corruption is logged and counted, never raised.
///
/// # Errors
///
/// Returns an error only for I/O failures.
pub fn recover(wal_dir: &Path, mode: SyncMode) -> CoreResult<Recovered> {
    fs::create_dir_all(wal_dir)?;
    let temp = wal_dir.join(WAL_TEMP);
    if temp.exists() {
        fs::remove_file(&temp)?;
    }

    let mut scans = inspect_wal(wal_dir)?;
    let Some(newest) = scans.pop() else {
        let wal = WalFile::create(wal_dir, 1, mode)?;
        return Ok(Recovered {
            wal,
            records: Vec::new(),
            report: RecoveryReport::default(),
        });
    };

    for stale in &scans {
        if !stale.scan.records.is_empty() {
            warn!(
                generation = stale.generation,
                records = stale.scan.records.len(),
                "wal.recovery.stale_generation"
            );
        }
    }

    let GenerationScan { generation, scan } = newest;
    for damaged in &scan.corrupt {
        if let ScanEvent::Corrupt {
            offset,
            len,
            reason,
        } = damaged
        {
            warn!(generation, offset, len, ?reason, "wal.recovery.corrupt_frame");
        }
    }
    let clean_tail = match scan.end {
        ScanEnd::Clean => true,
        ScanEnd::PartialTail { offset } => {
            info!(generation, offset, "wal.recovery.partial_tail");
            false
        }
        ScanEnd::Unreadable { offset } => {
            warn!(
                generation,
                offset,
                lost_bytes = scan.size - offset,
                "wal.recovery.unreadable_region"
            );
            false
        }
    };

    let mut report = RecoveryReport {
        generations: scans.len() + 1,
        recovered: scan.records.len(),
        corrupt_frames: scan.corrupt_frames(),
        clean_tail,
        consolidated: false,
    };
    let records = scan.records;

    let needs_rewrite = report.recovered > 0
        || report.corrupt_frames > 0
        || !report.clean_tail
        || report.generations > 1;

    let wal = if needs_rewrite {
        let next = generation + 1;
        write_generation(wal_dir, next, &records)?;
        for old in scans.iter().map(|g| g.generation).chain([generation]) {
            fs::remove_file(generation_path(wal_dir, old))?;
        }
        sync_directory(wal_dir)?;
        report.consolidated = true;
        WalFile::open(wal_dir, next, mode)?
    } else {
        WalFile::open(wal_dir, generation, mode)?
    };

    info!(
        recovered = report.recovered,
        corrupt_frames = report.corrupt_frames,
        generations = report.generations,
        consolidated = report.consolidated,
        "wal.recovery.complete"
    );

    Ok(Recovered {
        wal,
        records,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::frame;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    fn record(id: &str) -> Record {
        Record::new().with("id", id)
    }

    #[test]
    fn fresh_directory_creates_first_generation() {
        let temp = tempdir().unwrap();
        let recovered = recover(temp.path(), SyncMode::Async).unwrap();
        assert!(recovered.records.is_empty());
        assert_eq!(recovered.wal.generation(), 1);
        assert_eq!(list_generations(temp.path()).unwrap(), vec![1]);
    }

    #[test]
    fn empty_generation_is_reused() {
        let temp = tempdir().unwrap();
        drop(WalFile::create(temp.path(), 3, SyncMode::Async).unwrap());

        let recovered = recover(temp.path(), SyncMode::Async).unwrap();
        assert_eq!(recovered.wal.generation(), 3);
        assert!(!recovered.report.consolidated);
    }

    #[test]
    fn records_come_back_in_order_and_consolidate() {
        let temp = tempdir().unwrap();
        {
            let mut wal = WalFile::create(temp.path(), 1, SyncMode::Sync).unwrap();
            wal.append(&record("1")).unwrap();
            wal.append(&record("2")).unwrap();
        }

        let recovered = recover(temp.path(), SyncMode::Sync).unwrap();
        assert_eq!(recovered.records, vec![record("1"), record("2")]);
        assert!(recovered.report.consolidated);
        assert_eq!(recovered.wal.generation(), 2);
        assert_eq!(list_generations(temp.path()).unwrap(), vec![2]);
        assert_eq!(recovered.wal.read_all().unwrap(), recovered.records);
    }

    #[test]
    fn recovery_is_idempotent() {
        let temp = tempdir().unwrap();
        {
            let mut wal = WalFile::create(temp.path(), 1, SyncMode::Sync).unwrap();
            wal.append(&record("a")).unwrap();
        }
        let first = recover(temp.path(), SyncMode::Sync).unwrap().records;
        let second = recover(temp.path(), SyncMode::Sync).unwrap().records;
        assert_eq!(first, second);
    }

    #[test]
    fn torn_tail_is_dropped_and_appends_stay_readable() {
        let temp = tempdir().unwrap();
        let path = {
            let mut wal = WalFile::create(temp.path(), 1, SyncMode::Sync).unwrap();
            wal.append(&record("1")).unwrap();
            wal.path()
        };
        let torn = frame(&record("2").encode().unwrap()).unwrap();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&torn[..torn.len() - 2])
            .unwrap();

        let mut recovered = recover(temp.path(), SyncMode::Sync).unwrap();
        assert_eq!(recovered.records, vec![record("1")]);
        assert!(!recovered.report.clean_tail);

        recovered.wal.append(&record("3")).unwrap();
        drop(recovered);
        let again = recover(temp.path(), SyncMode::Sync).unwrap();
        assert_eq!(again.records, vec![record("1"), record("3")]);
    }

    #[test]
    fn newest_generation_wins_after_interrupted_consolidation() {
        let temp = tempdir().unwrap();
        // Consolidation renamed its output into place but crashed before
        // removing the generation it was built from.
        write_generation(temp.path(), 1, &[record("1"), record("2")]).unwrap();
        write_generation(temp.path(), 2, &[record("1"), record("2")]).unwrap();

        let recovered = recover(temp.path(), SyncMode::Async).unwrap();
        assert_eq!(recovered.records, vec![record("1"), record("2")]);
        assert_eq!(recovered.report.generations, 2);
        assert_eq!(list_generations(temp.path()).unwrap(), vec![3]);
    }

    #[test]
    fn empty_stale_generation_is_cleaned_up() {
        let temp = tempdir().unwrap();
        write_generation(temp.path(), 1, &[]).unwrap();
        write_generation(temp.path(), 2, &[]).unwrap();

        let recovered = recover(temp.path(), SyncMode::Async).unwrap();
        assert!(recovered.records.is_empty());
        assert_eq!(list_generations(temp.path()).unwrap(), vec![3]);
    }

    #[test]
    fn leftover_temp_file_is_removed() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(WAL_TEMP), b"junk").unwrap();
        recover(temp.path(), SyncMode::Async).unwrap();
        assert!(!temp.path().join(WAL_TEMP).exists());
    }

    #[test]
    fn inspect_does_not_modify() {
        let temp = tempdir().unwrap();
        write_generation(temp.path(), 5, &[record("x")]).unwrap();
        let scans = inspect_wal(temp.path()).unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].generation, 5);
        assert_eq!(scans[0].scan.records, vec![record("x")]);
        assert_eq!(list_generations(temp.path()).unwrap(), vec![5]);
    }
}
