//! Fault injection for durability tests.
//!
//! - [`FailingSink`]: a sink whose appends fail on demand
//! - [`flip_bit`], [`tear_tail`], [`append_bytes`]: damage a file the way a
//!   bad disk or a killed process would

use persisting_codec::Record;
use persisting_core::{CoreError, CoreResult, MemorySink, Sink};
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared switch controlling a [`FailingSink`].
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    failing: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl FaultSwitch {
    /// A switch that starts healthy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following append fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Whether appends currently fail.
    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }

    /// Appends attempted so far, failed or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// An in-memory sink that rejects batches while its switch is on.
#[derive(Debug)]
pub struct FailingSink {
    inner: MemorySink,
    switch: FaultSwitch,
}

impl FailingSink {
    /// Creates the sink and the switch that controls it.
    pub fn new() -> (Self, FaultSwitch) {
        let switch = FaultSwitch::new();
        let sink = Self {
            inner: MemorySink::new(),
            switch: switch.clone(),
        };
        (sink, switch)
    }
}

impl Sink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn append_batch(&mut self, records: &[Record]) -> CoreResult<()> {
        self.switch.attempts.fetch_add(1, Ordering::SeqCst);
        if self.switch.is_failing() {
            return Err(CoreError::sink("injected sink failure"));
        }
        self.inner.append_batch(records)
    }

    fn read_range(&self, offset: u64, limit: usize) -> CoreResult<Vec<Record>> {
        self.inner.read_range(offset, limit)
    }

    fn count(&self) -> u64 {
        self.inner.count()
    }

    fn batch_count(&self) -> usize {
        self.inner.batch_count()
    }
}

/// Inverts one bit of the byte at `offset`.
pub fn flip_bit(path: &Path, offset: u64, bit: u8) -> io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte)?;
    byte[0] ^= 1 << (bit % 8);
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&byte)?;
    file.sync_all()
}

/// Cuts the last `bytes` bytes off a file, as a write torn by a crash.
pub fn tear_tail(path: &Path, bytes: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    file.set_len(len.saturating_sub(bytes))?;
    file.sync_all()
}

/// Appends raw bytes to a file.
pub fn append_bytes(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Size of a file in bytes.
pub fn file_len(path: &Path) -> io::Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}
