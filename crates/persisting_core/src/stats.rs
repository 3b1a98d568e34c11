//! Partition statistics and counters.
//!
//! # Usage
//!
//! ```rust
//! use persisting_core::{PartitionBackend, QueueBackend, Config};
//! use persisting_codec::Record;
//!
//! let backend = PartitionBackend::memory("bucket-1", Config::default()).unwrap();
//! backend.put(Record::new().with("id", "1")).unwrap();
//!
//! let stats = backend.stats();
//! assert_eq!(stats.total_count, 1);
//! assert_eq!(stats.metrics.unwrap().put_count, 1);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Operation counters for one partition.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct Metrics {
    put_count: AtomicU64,
    get_count: AtomicU64,
    flush_count: AtomicU64,
    bytes_written: AtomicU64,
    /// Unix milliseconds of the last successful flush, 0 if none.
    last_flush_time: AtomicU64,
    recovered_count: AtomicU64,
    corrupt_frames: AtomicU64,
    rotations: AtomicU64,
    compactions: AtomicU64,
}

impl Metrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put(&self, records: u64, bytes: u64) {
        self.put_count.fetch_add(records, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_get(&self) {
        self.get_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        self.last_flush_time.store(unix_millis(), Ordering::Relaxed);
    }

    pub(crate) fn record_recovery(&self, recovered: u64, corrupt: u64) {
        self.recovered_count.fetch_add(recovered, Ordering::Relaxed);
        self.corrupt_frames.fetch_add(corrupt, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            put_count: self.put_count.load(Ordering::Relaxed),
            get_count: self.get_count.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            last_flush_time: self.last_flush_time.load(Ordering::Relaxed),
            recovered_count: self.recovered_count.load(Ordering::Relaxed),
            corrupt_frames: self.corrupt_frames.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// A point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Records accepted by `put` and `put_batch`.
    pub put_count: u64,
    /// Calls to `get`.
    pub get_count: u64,
    /// Flushes that moved records to the sink.
    pub flush_count: u64,
    /// Bytes appended to the WAL.
    pub bytes_written: u64,
    /// Unix milliseconds of the last flush, 0 if none.
    pub last_flush_time: u64,
    /// Records restored from the WAL at open.
    pub recovered_count: u64,
    /// Corrupt WAL frames skipped at open.
    pub corrupt_frames: u64,
    /// WAL generation switches.
    pub rotations: u64,
    /// Sink compactions.
    pub compactions: u64,
}

/// Everything `stats()` reports about a partition backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStats {
    /// Partition identifier.
    pub bucket_id: String,
    /// Backend variant name.
    pub backend: String,
    /// Partition directory, if durable.
    pub storage_path: Option<String>,
    /// Records addressable by offset.
    pub total_count: u64,
    /// Records waiting in the buffer.
    pub buffer_count: u64,
    /// Records durable in the sink.
    pub persisted_count: u64,
    /// Whether a WAL is in use.
    pub wal_enabled: bool,
    /// Size of the active WAL generation in bytes.
    pub wal_size: u64,
    /// Sync policy name (`sync`, `batch`, `async`).
    pub sync_mode: String,
    /// Batch sync interval in seconds, when batching.
    pub sync_interval_secs: Option<f64>,
    /// Batches currently held by the sink.
    pub sink_batches: usize,
    /// Counters, when metrics are enabled.
    pub metrics: Option<MetricsSnapshot>,
}
