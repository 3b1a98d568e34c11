use super::Sink;
use crate::error::CoreResult;
use persisting_codec::Record;

/// Keeps flushed records in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<Record>,
    batches: usize,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn append_batch(&mut self, records: &[Record]) -> CoreResult<()> {
        self.records.extend_from_slice(records);
        self.batches += 1;
        Ok(())
    }

    fn read_range(&self, offset: u64, limit: usize) -> CoreResult<Vec<Record>> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.records.len());
        let end = start.saturating_add(limit).min(self.records.len());
        Ok(self.records[start..end].to_vec())
    }

    fn count(&self) -> u64 {
        self.records.len() as u64
    }

    fn batch_count(&self) -> usize {
        self.batches
    }

    fn compact(&mut self) -> CoreResult<bool> {
        if self.batches <= 1 {
            return Ok(false);
        }
        self.batches = 1;
        Ok(true)
    }
}
