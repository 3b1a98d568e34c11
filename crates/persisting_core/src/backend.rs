//! Partition backends: WAL, buffer and sink behind one queue interface.
//!
//! ## Write Path
//!
//! `put` appends to the WAL first, then to the buffer. A record is
//! acknowledged once the WAL append returns under the configured sync mode.
//! `flush` hands the whole buffer to the sink in one atomic append and,
//! only after the sink confirms, empties the WAL. Records the sink could
//! never store are refused at `put`.
//!
//! ## Locking
//!
//! - `writer`: serializes `put`, `put_batch`, `flush`, rotation and
//!   `close`. WAL appends and fsyncs run under this lock only.
//! - `state`: buffer, persisted count and the closed flag, paired with a
//!   condition variable that wakes blocked streams. Held only for memory
//!   operations.
//! - `sink`: read-write lock; readers share it, flush and compaction take
//!   it exclusively.
//!
//! Readers snapshot the persisted count and the buffer slice they need
//! under `state`, then read the sink without it. The sink only grows, so a
//! range below the snapshot stays valid.

use crate::buffer::{validate_record, RecordBuffer};
use crate::config::Config;
use crate::dir::PartitionDir;
use crate::error::{CoreError, CoreResult};
use crate::recovery::{recover, RecoveryReport};
use crate::sink::{ColumnarSink, MemorySink, Sink};
use crate::stats::{BackendStats, Metrics};
use crate::stream::{ChunkSource, RecordStream, StreamOptions};
use crate::wal::{list_generations, SyncMode, WalFile};
use parking_lot::{Condvar, Mutex, RwLock};
use persisting_codec::Record;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// The interface a queue uses to store and read one partition.
///
/// Object safe, so a registry can hand out `Box<dyn QueueBackend>`.
pub trait QueueBackend: Send + Sync {
    /// Backend variant name.
    fn name(&self) -> &str;

    /// Partition identifier.
    fn bucket_id(&self) -> &str;

    /// Stores one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be made durable; nothing is
    /// stored in that case.
    fn put(&self, record: Record) -> CoreResult<()>;

    /// Stores several records as one unit.
    ///
    /// # Errors
    ///
    /// Same as [`Self::put`]; either all records are stored or none.
    fn put_batch(&self, records: Vec<Record>) -> CoreResult<()>;

    /// Reads up to `limit` records starting at `offset`, in write order.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be read.
    fn get(&self, offset: u64, limit: usize) -> CoreResult<Vec<Record>>;

    /// Returns a lazy stream of records starting at `offset`.
    fn get_stream(&self, offset: u64, options: StreamOptions) -> RecordStream;

    /// Moves every buffered record into the sink. Returns how many moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink rejects the batch; the buffer and WAL
    /// are then unchanged and the flush can be retried.
    fn flush(&self) -> CoreResult<usize>;

    /// Current statistics.
    fn stats(&self) -> BackendStats;

    /// Records addressable by offset: persisted plus buffered.
    fn total_count(&self) -> u64;

    /// Flushes, releases the WAL and ends every blocked stream.
    ///
    /// # Errors
    ///
    /// Returns the flush error, if any. The backend is closed regardless;
    /// unflushed records stay in the WAL for the next open.
    fn close(&self) -> CoreResult<()>;
}

/// A partition backend over a concrete sink.
///
/// Cloning is cheap and shares the partition.
pub struct PartitionBackend<S: Sink> {
    inner: Arc<Partition<S>>,
}

impl<S: Sink> Clone for PartitionBackend<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Partition<S: Sink> {
    name: &'static str,
    bucket_id: String,
    config: Config,
    sync_mode: SyncMode,
    wal_enabled: bool,
    dir: Option<PartitionDir>,
    recovery: RecoveryReport,
    writer: Mutex<Writer>,
    state: Mutex<State>,
    changed: Condvar,
    sink: RwLock<S>,
    wal_size: AtomicU64,
    metrics: Metrics,
}

struct Writer {
    wal: Option<WalFile>,
}

struct State {
    buffer: RecordBuffer,
    persisted_count: u64,
    closed: bool,
}

impl State {
    fn total(&self) -> u64 {
        self.persisted_count + self.buffer.len() as u64
    }
}

impl PartitionBackend<MemorySink> {
    /// An in-memory partition without a WAL.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the config is invalid.
    pub fn memory(bucket_id: impl Into<String>, config: Config) -> CoreResult<Self> {
        Self::with_sink("memory", bucket_id, None, MemorySink::new(), config)
    }
}

impl PartitionBackend<ColumnarSink> {
    /// A durable columnar partition; the WAL follows `config.enable_wal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is locked by another writer, the
    /// data file is damaged, or recovery fails on I/O.
    pub fn columnar(
        bucket_id: impl Into<String>,
        storage_path: &Path,
        config: Config,
    ) -> CoreResult<Self> {
        Self::open_columnar("columnar", bucket_id, storage_path, config)
    }

    /// A durable columnar partition fronted by a WAL.
    ///
    /// # Errors
    ///
    /// Same as [`Self::columnar`].
    pub fn persisting(
        bucket_id: impl Into<String>,
        storage_path: &Path,
        config: Config,
    ) -> CoreResult<Self> {
        Self::open_columnar("persisting", bucket_id, storage_path, config)
    }

    fn open_columnar(
        name: &'static str,
        bucket_id: impl Into<String>,
        storage_path: &Path,
        config: Config,
    ) -> CoreResult<Self> {
        config.validate()?;
        let dir = PartitionDir::open(storage_path)?;
        let sink = ColumnarSink::open(&dir.data_path(), &dir.data_temp_path())?;
        Self::with_sink(name, bucket_id, Some(dir), sink, config)
    }
}

impl<S: Sink> PartitionBackend<S> {
    /// Assembles a partition over any sink.
    ///
    /// With a directory and `enable_wal`, the WAL is recovered first and its
    /// records are placed in the buffer before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or recovery fails on I/O.
    pub fn with_sink(
        name: &'static str,
        bucket_id: impl Into<String>,
        dir: Option<PartitionDir>,
        sink: S,
        config: Config,
    ) -> CoreResult<Self> {
        config.validate()?;
        let bucket_id = bucket_id.into();
        let sync_mode = config.sync_mode();
        let metrics = Metrics::new();
        let mut buffer = RecordBuffer::new();
        let mut recovery = RecoveryReport::default();

        let wal = match (&dir, config.enable_wal) {
            (Some(dir), true) => {
                let recovered = recover(&dir.wal_dir(), sync_mode)?;
                metrics.record_recovery(
                    recovered.report.recovered as u64,
                    recovered.report.corrupt_frames as u64,
                );
                buffer.extend(recovered.records);
                recovery = recovered.report;
                Some(recovered.wal)
            }
            (Some(dir), false) => {
                if !list_generations(&dir.wal_dir())?.is_empty() {
                    warn!(
                        bucket_id = %bucket_id,
                        "partition.wal_disabled_with_existing_log"
                    );
                }
                None
            }
            (None, _) => None,
        };

        let persisted_count = sink.count();
        info!(
            bucket_id = %bucket_id,
            backend = name,
            persisted_count,
            recovered = buffer.len(),
            wal = wal.is_some(),
            sync_mode = %sync_mode,
            "partition.open"
        );

        let wal_size = wal.as_ref().map_or(0, WalFile::size);
        Ok(Self {
            inner: Arc::new(Partition {
                name,
                bucket_id,
                sync_mode,
                wal_enabled: wal.is_some(),
                dir,
                recovery,
                writer: Mutex::new(Writer { wal }),
                state: Mutex::new(State {
                    buffer,
                    persisted_count,
                    closed: false,
                }),
                changed: Condvar::new(),
                sink: RwLock::new(sink),
                wal_size: AtomicU64::new(wal_size),
                metrics,
                config,
            }),
        })
    }

    /// The configuration in effect.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// What recovery found when this partition opened.
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.inner.recovery
    }

    /// Records waiting in the buffer.
    pub fn buffer_count(&self) -> u64 {
        self.inner.state.lock().buffer.len() as u64
    }

    /// Records durable in the sink.
    pub fn persisted_count(&self) -> u64 {
        self.inner.state.lock().persisted_count
    }

    /// Size of the active WAL generation in bytes (0 without a WAL).
    pub fn wal_size(&self) -> u64 {
        self.inner.wal_size.load(Ordering::Relaxed)
    }

    /// Merges the sink's batches now.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be rewritten.
    pub fn compact(&self) -> CoreResult<bool> {
        let _writer = self.inner.writer.lock();
        let compacted = self.inner.sink.write().compact()?;
        if compacted {
            self.inner.metrics.record_compaction();
        }
        Ok(compacted)
    }
}

impl<S: Sink> Partition<S> {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.state.lock().closed {
            return Err(CoreError::BackendClosed);
        }
        Ok(())
    }

    fn write(&self, records: Vec<Record>) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        self.ensure_open()?;
        {
            let sink = self.sink.read();
            records.iter().try_for_each(|r| sink.check_record(r))?;
        }

        let bytes = match writer.wal.as_mut() {
            Some(wal) => {
                let written = match records.as_slice() {
                    [record] => wal.append(record)?,
                    batch => wal.append_batch(batch)?,
                };
                self.wal_size.store(wal.size(), Ordering::Relaxed);
                written
            }
            None => {
                records.iter().try_for_each(validate_record)?;
                0
            }
        };

        let count = records.len() as u64;
        let buffered = {
            let mut state = self.state.lock();
            state.buffer.extend(records);
            state.buffer.len()
        };
        self.changed.notify_all();
        self.metrics.record_put(count, bytes);

        self.after_write(&mut writer, buffered);
        Ok(())
    }

    /// Batch threshold and rotation checks. The records are already
    /// accepted, so failures here are logged, not returned.
    fn after_write(&self, writer: &mut Writer, buffered: usize) {
        if buffered >= self.config.batch_size {
            if let Err(err) = self.flush_locked(writer) {
                warn!(bucket_id = %self.bucket_id, error = %err, "partition.auto_flush_failed");
                return;
            }
        }
        if let Err(err) = self.maybe_rotate(writer) {
            warn!(bucket_id = %self.bucket_id, error = %err, "partition.rotation_failed");
        }
    }

    fn flush_locked(&self, writer: &mut Writer) -> CoreResult<usize> {
        let batch = {
            let state = self.state.lock();
            if state.buffer.is_empty() {
                return Ok(0);
            }
            state.buffer.snapshot()
        };
        let n = batch.len();

        if let Err(err) = self.sink.write().append_batch(&batch) {
            error!(bucket_id = %self.bucket_id, records = n, error = %err, "partition.flush_failed");
            return Err(err);
        }

        // The sink has the batch; the offsets must move even if the WAL
        // cannot be emptied, or records would be counted twice.
        let truncated = match writer.wal.as_mut() {
            Some(wal) => {
                let result = wal.truncate();
                self.wal_size.store(wal.size(), Ordering::Relaxed);
                result
            }
            None => Ok(()),
        };

        {
            let mut state = self.state.lock();
            state.persisted_count += n as u64;
            state.buffer.drain_front(n);
        }
        self.changed.notify_all();
        self.metrics.record_flush();
        debug!(bucket_id = %self.bucket_id, records = n, "partition.flushed");

        truncated?;
        self.maybe_compact();
        Ok(n)
    }

    fn maybe_compact(&self) {
        let threshold = self.config.compaction_threshold;
        if threshold == 0 {
            return;
        }
        let mut sink = self.sink.write();
        if sink.compactable_batches() < threshold {
            return;
        }
        match sink.compact() {
            Ok(true) => self.metrics.record_compaction(),
            Ok(false) => {}
            Err(err) => {
                warn!(bucket_id = %self.bucket_id, error = %err, "partition.compaction_failed");
            }
        }
    }

    fn maybe_rotate(&self, writer: &mut Writer) -> CoreResult<()> {
        let Some(size) = writer.wal.as_ref().map(WalFile::size) else {
            return Ok(());
        };
        if size <= self.config.max_wal_size {
            return Ok(());
        }

        self.flush_locked(writer)?;
        if let Some(wal) = writer.wal.as_mut() {
            wal.rotate()?;
            self.wal_size.store(wal.size(), Ordering::Relaxed);
            self.metrics.record_rotation();
            info!(
                bucket_id = %self.bucket_id,
                generation = wal.generation(),
                previous_size = size,
                "partition.wal_rotated"
            );
        }
        Ok(())
    }

    fn read(&self, offset: u64, limit: usize) -> CoreResult<Vec<Record>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let (persisted, end, tail) = {
            let state = self.state.lock();
            let persisted = state.persisted_count;
            let total = state.total();
            if offset >= total {
                return Ok(Vec::new());
            }
            let end = offset.saturating_add(limit as u64).min(total);
            let tail = if end > persisted {
                let from = offset.max(persisted) - persisted;
                state
                    .buffer
                    .slice(from as usize, (end - persisted - from) as usize)
            } else {
                Vec::new()
            };
            (persisted, end, tail)
        };

        let mut records = if offset < persisted {
            let head_end = end.min(persisted);
            self.sink
                .read()
                .read_range(offset, (head_end - offset) as usize)?
        } else {
            Vec::new()
        };
        records.extend(tail);
        Ok(records)
    }
}

impl<S: Sink> ChunkSource for Partition<S> {
    fn next_chunk(
        &self,
        offset: u64,
        max: usize,
        block: bool,
        timeout: Option<Duration>,
    ) -> CoreResult<Option<Vec<Record>>> {
        loop {
            let chunk = self.read(offset, max)?;
            if !chunk.is_empty() {
                return Ok(Some(chunk));
            }
            if !block {
                return Ok(None);
            }

            let deadline = timeout.map(|t| Instant::now() + t);
            let mut state = self.state.lock();
            // Re-check after every wake: wakeups can be spurious or for a
            // write that did not reach `offset`.
            while state.total() <= offset {
                if state.closed {
                    return Ok(None);
                }
                match deadline {
                    Some(deadline) => {
                        let timed_out = self.changed.wait_until(&mut state, deadline).timed_out();
                        if timed_out && state.total() <= offset {
                            return Ok(None);
                        }
                    }
                    None => self.changed.wait(&mut state),
                }
            }
        }
    }
}

impl<S: Sink> QueueBackend for PartitionBackend<S> {
    fn name(&self) -> &str {
        self.inner.name
    }

    fn bucket_id(&self) -> &str {
        &self.inner.bucket_id
    }

    fn put(&self, record: Record) -> CoreResult<()> {
        self.inner.write(vec![record])
    }

    fn put_batch(&self, records: Vec<Record>) -> CoreResult<()> {
        self.inner.write(records)
    }

    fn get(&self, offset: u64, limit: usize) -> CoreResult<Vec<Record>> {
        self.inner.metrics.record_get();
        self.inner.read(offset, limit)
    }

    fn get_stream(&self, offset: u64, options: StreamOptions) -> RecordStream {
        let source: Arc<dyn ChunkSource> = self.inner.clone();
        RecordStream::new(source, offset, options)
    }

    fn flush(&self) -> CoreResult<usize> {
        let mut writer = self.inner.writer.lock();
        self.inner.ensure_open()?;
        self.inner.flush_locked(&mut writer)
    }

    fn stats(&self) -> BackendStats {
        let inner = &self.inner;
        let (buffer_count, persisted_count) = {
            let state = inner.state.lock();
            (state.buffer.len() as u64, state.persisted_count)
        };
        BackendStats {
            bucket_id: inner.bucket_id.clone(),
            backend: inner.name.to_string(),
            storage_path: inner
                .dir
                .as_ref()
                .map(|d| d.path().display().to_string()),
            total_count: persisted_count + buffer_count,
            buffer_count,
            persisted_count,
            wal_enabled: inner.wal_enabled,
            wal_size: inner.wal_size.load(Ordering::Relaxed),
            sync_mode: inner.sync_mode.name().to_string(),
            sync_interval_secs: match inner.sync_mode {
                SyncMode::Batch(interval) => Some(interval.as_secs_f64()),
                SyncMode::Sync | SyncMode::Async => None,
            },
            sink_batches: inner.sink.read().batch_count(),
            metrics: inner
                .config
                .enable_metrics
                .then(|| inner.metrics.snapshot()),
        }
    }

    fn total_count(&self) -> u64 {
        self.inner.state.lock().total()
    }

    fn close(&self) -> CoreResult<()> {
        let inner = &self.inner;
        let mut writer = inner.writer.lock();
        if inner.state.lock().closed {
            return Ok(());
        }

        let flushed = inner.flush_locked(&mut writer);
        let synced = match writer.wal.take() {
            Some(wal) => wal.sync(),
            None => Ok(()),
        };

        inner.state.lock().closed = true;
        inner.changed.notify_all();
        info!(bucket_id = %inner.bucket_id, "partition.closed");

        flushed?;
        synced
    }
}

impl<S: Sink> std::fmt::Debug for PartitionBackend<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionBackend")
            .field("name", &self.inner.name)
            .field("bucket_id", &self.inner.bucket_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    fn record(id: &str) -> Record {
        Record::new().with("id", id)
    }

    fn ids(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.get("id").and_then(|v| v.as_text()).unwrap_or("").to_string())
            .collect()
    }

    fn durable(dir: &Path, config: Config) -> PartitionBackend<ColumnarSink> {
        PartitionBackend::persisting("b1", dir, config).unwrap()
    }

    #[test]
    fn put_then_get_from_buffer() {
        let backend = PartitionBackend::memory("b1", Config::default()).unwrap();
        backend.put(record("1")).unwrap();
        backend.put(record("2")).unwrap();

        assert_eq!(backend.total_count(), 2);
        assert_eq!(ids(&backend.get(0, 10).unwrap()), vec!["1", "2"]);
        assert_eq!(ids(&backend.get(1, 10).unwrap()), vec!["2"]);
        assert!(backend.get(2, 10).unwrap().is_empty());
        assert!(backend.get(0, 0).unwrap().is_empty());
    }

    #[test]
    fn flush_moves_buffer_to_sink() {
        let temp = tempdir().unwrap();
        let backend = durable(temp.path(), Config::default());
        backend.put_batch(vec![record("1"), record("2")]).unwrap();
        assert!(backend.wal_size() > 0);

        assert_eq!(backend.flush().unwrap(), 2);
        assert_eq!(backend.total_count(), 2);
        assert_eq!(backend.buffer_count(), 0);
        assert_eq!(backend.persisted_count(), 2);
        assert_eq!(backend.wal_size(), 0);

        assert_eq!(backend.flush().unwrap(), 0);
    }

    #[test]
    fn get_spans_sink_and_buffer() {
        let temp = tempdir().unwrap();
        let backend = durable(temp.path(), Config::default());
        backend.put_batch(vec![record("1"), record("2"), record("3")]).unwrap();
        backend.flush().unwrap();
        backend.put_batch(vec![record("4"), record("5")]).unwrap();

        assert_eq!(
            ids(&backend.get(1, 3).unwrap()),
            vec!["2", "3", "4"]
        );
        assert_eq!(
            ids(&backend.get(0, 100).unwrap()),
            vec!["1", "2", "3", "4", "5"]
        );
    }

    #[test]
    fn batch_size_triggers_flush() {
        let backend =
            PartitionBackend::memory("b1", Config::default().batch_size(3)).unwrap();
        backend.put(record("1")).unwrap();
        backend.put(record("2")).unwrap();
        assert_eq!(backend.persisted_count(), 0);
        backend.put(record("3")).unwrap();
        assert_eq!(backend.persisted_count(), 3);
        assert_eq!(backend.buffer_count(), 0);
    }

    #[test]
    fn unflushed_records_survive_reopen() {
        let temp = tempdir().unwrap();
        {
            let backend = durable(temp.path(), Config::default());
            backend.put(record("1")).unwrap();
            backend.put(record("2")).unwrap();
            // dropped without close: simulated crash
        }
        let backend = durable(temp.path(), Config::default());
        assert_eq!(backend.total_count(), 2);
        assert_eq!(backend.buffer_count(), 2);
        assert_eq!(backend.recovery_report().recovered, 2);
        assert_eq!(ids(&backend.get(0, 10).unwrap()), vec!["1", "2"]);
    }

    #[test]
    fn close_flushes_and_rejects_puts() {
        let temp = tempdir().unwrap();
        {
            let backend = durable(temp.path(), Config::default());
            backend.put(record("1")).unwrap();
            backend.close().unwrap();
            assert!(matches!(
                backend.put(record("2")),
                Err(CoreError::BackendClosed)
            ));
            assert!(matches!(backend.flush(), Err(CoreError::BackendClosed)));
            backend.close().unwrap();
        }
        let backend = durable(temp.path(), Config::default());
        assert_eq!(backend.persisted_count(), 1);
        assert_eq!(backend.buffer_count(), 0);
    }

    #[test]
    fn second_writer_is_rejected() {
        let temp = tempdir().unwrap();
        let _first = durable(temp.path(), Config::default());
        let second = PartitionBackend::persisting("b1", temp.path(), Config::default());
        assert!(matches!(second, Err(CoreError::PartitionLocked { .. })));
    }

    #[test]
    fn nan_is_refused_without_buffer_change() {
        let backend = PartitionBackend::memory("b1", Config::default()).unwrap();
        let bad = Record::new().with("x", f64::NAN);
        assert!(backend.put(bad).is_err());
        assert_eq!(backend.total_count(), 0);

        let temp = tempdir().unwrap();
        let backend = durable(temp.path(), Config::default());
        let bad = Record::new().with("x", f64::NAN);
        assert!(backend.put_batch(vec![record("1"), bad]).is_err());
        assert_eq!(backend.total_count(), 0);
        assert_eq!(backend.wal_size(), 0);
    }

    #[test]
    fn rotation_flushes_first() {
        let temp = tempdir().unwrap();
        let config = Config::default().max_wal_size(64);
        let backend = durable(temp.path(), config);
        for i in 0..10 {
            backend.put(record(&i.to_string())).unwrap();
        }
        let stats = backend.stats();
        assert!(stats.metrics.as_ref().unwrap().rotations > 0);
        assert_eq!(stats.total_count, 10);
        assert!(stats.wal_size <= 64);
        assert_eq!(
            ids(&backend.get(0, 10).unwrap()),
            (0..10).map(|i| i.to_string()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn compaction_after_threshold() {
        let temp = tempdir().unwrap();
        let backend = durable(temp.path(), Config::default().compaction_threshold(3));
        for i in 0..3 {
            backend.put(record(&i.to_string())).unwrap();
            backend.flush().unwrap();
        }
        let stats = backend.stats();
        assert_eq!(stats.sink_batches, 1);
        assert_eq!(stats.metrics.unwrap().compactions, 1);
        assert_eq!(ids(&backend.get(0, 10).unwrap()), vec!["0", "1", "2"]);
    }

    #[test]
    fn blocking_stream_wakes_on_put() {
        let backend = PartitionBackend::memory("b1", Config::default()).unwrap();
        let mut stream = backend.get_stream(0, StreamOptions::blocking().limit(1));

        let writer = backend.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            writer.put(record("late")).unwrap();
        });

        let got = stream.next().unwrap().unwrap();
        assert_eq!(got, record("late"));
        assert!(stream.next().is_none());
        handle.join().unwrap();
    }

    #[test]
    fn blocking_stream_times_out() {
        let backend = PartitionBackend::memory("b1", Config::default()).unwrap();
        let mut stream = backend.get_stream(
            0,
            StreamOptions::blocking().timeout(Duration::from_millis(20)),
        );
        assert!(stream.next().is_none());
    }

    #[test]
    fn close_ends_blocked_stream() {
        let backend = PartitionBackend::memory("b1", Config::default()).unwrap();
        let mut stream = backend.get_stream(0, StreamOptions::blocking());

        let closer = backend.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            closer.close().unwrap();
        });

        assert!(stream.next().is_none());
        handle.join().unwrap();
    }

    #[test]
    fn stats_report_configuration() {
        let temp = tempdir().unwrap();
        let config = Config::default().wal_sync_interval(Some(Duration::from_millis(200)));
        let backend = durable(temp.path(), config);
        backend.put(record("1")).unwrap();

        let stats = backend.stats();
        assert_eq!(stats.backend, "persisting");
        assert_eq!(stats.bucket_id, "b1");
        assert!(stats.wal_enabled);
        assert_eq!(stats.sync_mode, "batch");
        assert_eq!(stats.sync_interval_secs, Some(0.2));
        assert_eq!(stats.buffer_count, 1);
        assert_eq!(stats.metrics.unwrap().put_count, 1);
    }

    #[test]
    fn metrics_can_be_disabled() {
        let backend =
            PartitionBackend::memory("b1", Config::default().enable_metrics(false)).unwrap();
        assert!(backend.stats().metrics.is_none());
    }
}
