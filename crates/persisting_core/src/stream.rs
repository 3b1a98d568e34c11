//! Lazy record streams over a partition's offset space.

use crate::error::CoreResult;
use persisting_codec::Record;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Records fetched per chunk.
pub const STREAM_CHUNK_SIZE: usize = 100;

/// How a stream behaves at the end of the available records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Maximum records to yield; `None` for no limit.
    pub limit: Option<usize>,
    /// Wait for new records instead of ending.
    pub block: bool,
    /// Longest single wait; the stream ends when it elapses. `None` waits
    /// until a record arrives or the backend closes.
    pub timeout: Option<Duration>,
}

impl StreamOptions {
    /// A stream that ends at the current end of the partition.
    pub fn snapshot() -> Self {
        Self::default()
    }

    /// A stream that waits for new records.
    pub fn blocking() -> Self {
        Self {
            block: true,
            ..Self::default()
        }
    }

    /// Sets the record limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the wait timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Where a [`RecordStream`] pulls its chunks from.
pub trait ChunkSource: Send + Sync {
    /// Returns up to `max` records starting at `offset`.
    ///
    /// With `block` set and nothing available, waits for a write. Returns
    /// `None` when the stream should end: nothing available without
    /// blocking, the wait timed out, or the source was closed.
    ///
    /// # Errors
    ///
    /// Returns an error if stored records cannot be read.
    fn next_chunk(
        &self,
        offset: u64,
        max: usize,
        block: bool,
        timeout: Option<Duration>,
    ) -> CoreResult<Option<Vec<Record>>>;
}

/// An iterator of records starting at some offset.
///
/// Records are fetched lazily, [`STREAM_CHUNK_SIZE`] at a time. Dropping
/// the stream has no effect on the backend.
pub struct RecordStream {
    source: Arc<dyn ChunkSource>,
    next_offset: u64,
    remaining: Option<usize>,
    block: bool,
    timeout: Option<Duration>,
    pending: VecDeque<Record>,
    done: bool,
}

impl RecordStream {
    /// Creates a stream reading from `source` at `offset`.
    pub fn new(source: Arc<dyn ChunkSource>, offset: u64, options: StreamOptions) -> Self {
        Self {
            source,
            next_offset: offset,
            remaining: options.limit,
            block: options.block,
            timeout: options.timeout,
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Offset of the next record this stream will fetch.
    pub fn position(&self) -> u64 {
        self.next_offset
    }
}

impl Iterator for RecordStream {
    type Item = CoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        if self.pending.is_empty() {
            if self.done {
                return None;
            }
            let max = self
                .remaining
                .map_or(STREAM_CHUNK_SIZE, |r| r.min(STREAM_CHUNK_SIZE));
            match self
                .source
                .next_chunk(self.next_offset, max, self.block, self.timeout)
            {
                Ok(Some(chunk)) => {
                    self.next_offset += chunk.len() as u64;
                    self.pending.extend(chunk);
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }

        let record = self.pending.pop_front()?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(Ok(record))
    }
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("next_offset", &self.next_offset)
            .field("remaining", &self.remaining)
            .field("block", &self.block)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Serves `total` numbered records and records every request.
    struct Counting {
        total: u64,
        requests: Mutex<Vec<(u64, usize)>>,
    }

    impl ChunkSource for Counting {
        fn next_chunk(
            &self,
            offset: u64,
            max: usize,
            _block: bool,
            _timeout: Option<Duration>,
        ) -> CoreResult<Option<Vec<Record>>> {
            self.requests.lock().push((offset, max));
            let end = (offset + max as u64).min(self.total);
            if offset >= end {
                return Ok(None);
            }
            Ok(Some(
                (offset..end)
                    .map(|i| Record::new().with("i", i as i64))
                    .collect(),
            ))
        }
    }

    fn source(total: u64) -> Arc<Counting> {
        Arc::new(Counting {
            total,
            requests: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn fetches_in_chunks() {
        let src = source(250);
        let stream = RecordStream::new(src.clone(), 0, StreamOptions::snapshot());
        assert_eq!(stream.count(), 250);
        assert_eq!(
            *src.requests.lock(),
            vec![(0, 100), (100, 100), (200, 100), (250, 100)]
        );
    }

    #[test]
    fn limit_caps_chunk_size_and_output() {
        let src = source(1000);
        let stream = RecordStream::new(src.clone(), 10, StreamOptions::snapshot().limit(5));
        let records: Vec<Record> = stream.map(Result::unwrap).collect();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].get("i").and_then(|v| v.as_integer()), Some(10));
        assert_eq!(*src.requests.lock(), vec![(10, 5)]);
    }

    #[test]
    fn zero_limit_yields_nothing() {
        let src = source(10);
        let mut stream = RecordStream::new(src.clone(), 0, StreamOptions::snapshot().limit(0));
        assert!(stream.next().is_none());
        assert!(src.requests.lock().is_empty());
    }
}
