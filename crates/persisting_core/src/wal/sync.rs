//! WAL sync policy and the background syncer for batch mode.

use parking_lot::{Condvar, Mutex};
use persisting_storage::{FileBackend, StorageBackend};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Intervals at or above this leave syncing to the OS.
pub const ASYNC_THRESHOLD: Duration = Duration::from_secs(3600);

/// When WAL appends are forced to durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Every append is synced before it returns.
    Sync,
    /// A background thread syncs at most once per interval, if anything
    /// was written since the last sync.
    Batch(Duration),
    /// Never forced; the OS writes back on its own schedule.
    Async,
}

impl SyncMode {
    /// Chooses the mode for a configured sync interval.
    pub fn from_interval(interval: Option<Duration>) -> Self {
        match interval {
            None => SyncMode::Async,
            Some(d) if d.is_zero() => SyncMode::Sync,
            Some(d) if d >= ASYNC_THRESHOLD => SyncMode::Async,
            Some(d) => SyncMode::Batch(d),
        }
    }

    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            SyncMode::Sync => "sync",
            SyncMode::Batch(_) => "batch",
            SyncMode::Async => "async",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Batch(interval) => write!(f, "batch({interval:?})"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Default)]
struct SyncState {
    dirty: bool,
    shutdown: bool,
}

struct Shared {
    state: Mutex<SyncState>,
    wakeup: Condvar,
}

/// Background thread that syncs a WAL file on a fixed interval.
///
/// The file handle is shared with the writer; when the writer swaps the
/// handle (truncate, rotation) the syncer follows automatically. Dropping
/// the syncer stops the thread after a final sync.
pub(crate) struct BatchSyncer {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl BatchSyncer {
    pub(crate) fn spawn(file: Arc<Mutex<FileBackend>>, interval: Duration) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(SyncState::default()),
            wakeup: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("persisting-wal-sync".into())
            .spawn(move || Self::worker_loop(&worker, &file, interval))?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Notes that unsynced data was written.
    pub(crate) fn mark_dirty(&self) {
        self.shared.state.lock().dirty = true;
    }

    fn worker_loop(shared: &Shared, file: &Mutex<FileBackend>, interval: Duration) {
        let mut last_sync = Instant::now();
        let mut guard = shared.state.lock();
        loop {
            let deadline = last_sync + interval;
            while !guard.shutdown && Instant::now() < deadline {
                shared.wakeup.wait_until(&mut guard, deadline);
            }
            if guard.shutdown {
                break;
            }
            last_sync = Instant::now();
            if guard.dirty {
                guard.dirty = false;
                drop(guard);
                if let Err(err) = file.lock().sync() {
                    warn!(error = %err, "wal.sync.batch_failed");
                    guard = shared.state.lock();
                    guard.dirty = true;
                    continue;
                }
                debug!("wal.sync.batch");
                guard = shared.state.lock();
            }
        }

        if guard.dirty {
            guard.dirty = false;
            drop(guard);
            if let Err(err) = file.lock().sync() {
                warn!(error = %err, "wal.sync.final_failed");
            }
        }
    }
}

impl Drop for BatchSyncer {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wakeup.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mode_from_interval() {
        assert_eq!(SyncMode::from_interval(None), SyncMode::Async);
        assert_eq!(SyncMode::from_interval(Some(Duration::ZERO)), SyncMode::Sync);
        assert_eq!(
            SyncMode::from_interval(Some(Duration::from_millis(100))),
            SyncMode::Batch(Duration::from_millis(100))
        );
        assert_eq!(
            SyncMode::from_interval(Some(Duration::from_secs(3600))),
            SyncMode::Async
        );
    }

    #[test]
    fn mode_names() {
        assert_eq!(SyncMode::Sync.to_string(), "sync");
        assert_eq!(SyncMode::Async.name(), "async");
        assert_eq!(SyncMode::Batch(Duration::from_secs(1)).name(), "batch");
    }

    #[test]
    fn syncer_stops_promptly_on_drop() {
        let temp = tempdir().unwrap();
        let file = Arc::new(Mutex::new(
            FileBackend::create(&temp.path().join("wal.log")).unwrap(),
        ));
        let syncer = BatchSyncer::spawn(Arc::clone(&file), Duration::from_secs(30)).unwrap();
        file.lock().append(b"data").unwrap();
        syncer.mark_dirty();

        let started = Instant::now();
        drop(syncer);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn syncer_clears_dirty_flag() {
        let temp = tempdir().unwrap();
        let file = Arc::new(Mutex::new(
            FileBackend::create(&temp.path().join("wal.log")).unwrap(),
        ));
        let syncer = BatchSyncer::spawn(Arc::clone(&file), Duration::from_millis(10)).unwrap();
        syncer.mark_dirty();

        let deadline = Instant::now() + Duration::from_secs(5);
        while syncer.shared.state.lock().dirty && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!syncer.shared.state.lock().dirty);
    }
}
