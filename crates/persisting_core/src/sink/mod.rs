//! Downstream stores that flushed batches land in.
//!
//! A sink is append-only: batches are added in flush order and never
//! rolled back. Record `n` of the sink is offset `n` of the partition.

mod columnar;
mod memory;

pub use columnar::{ColumnType, ColumnarSink, SinkSummary};
pub use memory::MemorySink;

use crate::error::CoreResult;
use persisting_codec::Record;

/// A durable (or in-memory) batch store.
pub trait Sink: Send + Sync + 'static {
    /// Short name used in stats and logs.
    fn name(&self) -> &'static str;

    /// Refuses a record this sink could never store.
    ///
    /// Called at `put`, before the record reaches the WAL or the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the record does not fit.
    fn check_record(&self, _record: &Record) -> CoreResult<()> {
        Ok(())
    }

    /// Appends one ordered batch.
    ///
    /// Either the whole batch becomes readable or, on error, none of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be stored.
    fn append_batch(&mut self, records: &[Record]) -> CoreResult<()>;

    /// Reads up to `limit` records starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if stored data cannot be read back.
    fn read_range(&self, offset: u64, limit: usize) -> CoreResult<Vec<Record>>;

    /// Number of records stored.
    fn count(&self) -> u64;

    /// Number of batches stored.
    fn batch_count(&self) -> usize;

    /// Number of batches the next [`Self::compact`] would merge.
    fn compactable_batches(&self) -> usize {
        self.batch_count()
    }

    /// Merges stored batches. Returns `true` if anything changed.
    ///
    /// # Errors
    ///
    /// Returns an error if rewriting fails; the stored data is unchanged.
    fn compact(&mut self) -> CoreResult<bool> {
        Ok(false)
    }
}
