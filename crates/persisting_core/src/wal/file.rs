//! The active WAL file of a partition.

use crate::dir::sync_directory;
use crate::error::CoreResult;
use crate::wal::frame::frame_into;
use crate::wal::reader::{scan_frames, WalScan};
use crate::wal::sync::{BatchSyncer, SyncMode};
use bytes::BytesMut;
use parking_lot::Mutex;
use persisting_codec::Record;
use persisting_storage::{FileBackend, StorageBackend};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Temp file used by truncate and recovery consolidation.
pub const WAL_TEMP: &str = "wal.tmp";

/// Path of a WAL generation inside `dir`.
pub fn generation_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("wal-{generation:06}.log"))
}

/// Lists the WAL generations present in `dir`, oldest first.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_generations(dir: &Path) -> CoreResult<Vec<u64>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut generations = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(id) = name
            .strip_prefix("wal-")
            .and_then(|rest| rest.strip_suffix(".log"))
            .and_then(|digits| digits.parse::<u64>().ok())
        {
            generations.push(id);
        }
    }
    generations.sort_unstable();
    Ok(generations)
}

/// Frames a sequence of records into one contiguous buffer.
fn encode_frames<'a>(
    records: impl IntoIterator<Item = &'a Record>,
) -> CoreResult<BytesMut> {
    let mut buf = BytesMut::new();
    for record in records {
        frame_into(&mut buf, &record.encode()?)?;
    }
    Ok(buf)
}

/// An open WAL generation with its sync policy applied.
///
/// Single writer: every mutating method takes `&mut self`, and the owning
/// partition serializes callers.
pub struct WalFile {
    dir: PathBuf,
    generation: u64,
    backend: Arc<Mutex<FileBackend>>,
    size: u64,
    mode: SyncMode,
    syncer: Option<BatchSyncer>,
}

impl WalFile {
    /// Creates a new, empty generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(dir: &Path, generation: u64, mode: SyncMode) -> CoreResult<Self> {
        fs::create_dir_all(dir)?;
        let mut backend = FileBackend::create(&generation_path(dir, generation))?;
        backend.sync()?;
        sync_directory(dir)?;
        Self::with_backend(dir, generation, backend, mode)
    }

    /// Opens an existing generation for appending.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(dir: &Path, generation: u64, mode: SyncMode) -> CoreResult<Self> {
        let backend = FileBackend::open(&generation_path(dir, generation))?;
        Self::with_backend(dir, generation, backend, mode)
    }

    fn with_backend(
        dir: &Path,
        generation: u64,
        backend: FileBackend,
        mode: SyncMode,
    ) -> CoreResult<Self> {
        let size = backend.size()?;
        let backend = Arc::new(Mutex::new(backend));
        let syncer = match mode {
            SyncMode::Batch(interval) => Some(BatchSyncer::spawn(Arc::clone(&backend), interval)?),
            SyncMode::Sync | SyncMode::Async => None,
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            generation,
            backend,
            size,
            mode,
            syncer,
        })
    }

    /// Appends one record and applies the sync policy.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or the write or sync
    /// fails. On error the file is left as it was.
    pub fn append(&mut self, record: &Record) -> CoreResult<u64> {
        self.append_batch(std::slice::from_ref(record))
    }

    /// Appends several records with one write and at most one sync.
    ///
    /// # Errors
    ///
    /// Same as [`Self::append`]; either every record is written or none.
    pub fn append_batch(&mut self, records: &[Record]) -> CoreResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let frames = encode_frames(records)?;
        self.write_frames(&frames)
    }

    fn write_frames(&mut self, frames: &[u8]) -> CoreResult<u64> {
        let mut backend = self.backend.lock();
        let offset = backend.append(frames)?;
        let synced = match self.mode {
            SyncMode::Sync => backend.sync(),
            SyncMode::Batch(_) | SyncMode::Async => backend.flush(),
        };
        if let Err(err) = synced {
            // Undo so a failed put never resurfaces at recovery.
            if let Err(undo) = backend.truncate(offset) {
                warn!(
                    path = %backend.path().display(),
                    offset,
                    error = %undo,
                    "wal.rollback_failed"
                );
            }
            return Err(err.into());
        }
        drop(backend);

        if let Some(syncer) = &self.syncer {
            syncer.mark_dirty();
        }
        let written = frames.len() as u64;
        self.size = offset + written;
        Ok(written)
    }

    /// Reads every intact record, skipping corrupt frames.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file cannot be read.
    pub fn read_all(&self) -> CoreResult<Vec<Record>> {
        Ok(self.scan()?.records)
    }

    /// Scans the file and reports records and damage.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file cannot be read.
    pub fn scan(&self) -> CoreResult<WalScan> {
        let backend = self.backend.lock();
        scan_frames(&*backend)
    }

    /// Empties the WAL, crash-atomically.
    ///
    /// A synced empty temp file is renamed over the active file, so a crash
    /// leaves either the old content or an empty file, never a torn one.
    ///
    /// # Errors
    ///
    /// Returns an error if any file operation fails.
    pub fn truncate(&mut self) -> CoreResult<()> {
        let mut fresh = FileBackend::create(&self.dir.join(WAL_TEMP))?;
        fresh.sync()?;
        fresh.rename(&self.path())?;

        // The old inode is unlinked now; appends must go to the new file.
        *self.backend.lock() = fresh;
        self.size = 0;
        sync_directory(&self.dir)?;
        debug!(generation = self.generation, "wal.truncated");
        Ok(())
    }

    /// Switches to a new, empty generation and deletes the current one.
    ///
    /// The caller must have flushed everything the current generation
    /// holds; its content is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the new file cannot be created. If only the
    /// removal of the old file fails, the new generation is already active.
    pub fn rotate(&mut self) -> CoreResult<()> {
        let next = self.generation + 1;
        let mut fresh = FileBackend::create(&generation_path(&self.dir, next))?;
        fresh.sync()?;
        sync_directory(&self.dir)?;

        let old_path = self.path();
        *self.backend.lock() = fresh;
        self.generation = next;
        self.size = 0;

        fs::remove_file(&old_path)?;
        sync_directory(&self.dir)?;
        debug!(generation = next, "wal.rotated");
        Ok(())
    }

    /// Forces everything written so far to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Current size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the active generation.
    pub fn path(&self) -> PathBuf {
        generation_path(&self.dir, self.generation)
    }

    /// Id of the active generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The sync policy in effect.
    pub fn sync_mode(&self) -> SyncMode {
        self.mode
    }
}

impl std::fmt::Debug for WalFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalFile")
            .field("path", &self.path())
            .field("size", &self.size)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Drop for WalFile {
    fn drop(&mut self) {
        // Stop the syncer first so its final sync runs.
        self.syncer.take();
    }
}

/// Writes `records` into a brand-new generation file via a temp file.
///
/// Used by recovery to consolidate what it read into one clean file.
pub(crate) fn write_generation(dir: &Path, generation: u64, records: &[Record]) -> CoreResult<()> {
    let temp = dir.join(WAL_TEMP);
    let frames = encode_frames(records)?;
    {
        let mut backend = FileBackend::create(&temp)?;
        backend.append(&frames)?;
        backend.sync()?;
    }
    fs::rename(&temp, generation_path(dir, generation))?;
    sync_directory(dir)?;
    Ok(())
}
