//! The in-memory record buffer of a partition.

use crate::error::CoreResult;
use persisting_codec::Record;
use std::collections::VecDeque;

/// Records accepted but not yet flushed to the sink, in write order.
///
/// Offsets into the buffer are relative: index 0 is the record right after
/// the last persisted one.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    records: VecDeque<Record>,
}

impl RecordBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one record.
    pub fn push(&mut self, record: Record) {
        self.records.push_back(record);
    }

    /// Appends records in order.
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) {
        self.records.extend(records);
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copies out up to `limit` records starting at relative index `from`.
    pub fn slice(&self, from: usize, limit: usize) -> Vec<Record> {
        self.records.iter().skip(from).take(limit).cloned().collect()
    }

    /// Copies out every buffered record.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.iter().cloned().collect()
    }

    /// Drops the first `n` records, which have been persisted.
    pub fn drain_front(&mut self, n: usize) {
        let n = n.min(self.records.len());
        self.records.drain(..n);
    }
}

/// Checks that a record can be written durably.
///
/// The WAL path validates by encoding; partitions without a WAL call this
/// so that a bad record is refused at `put` instead of poisoning a flush.
pub(crate) fn validate_record(record: &Record) -> CoreResult<()> {
    record.validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use persisting_codec::Value;

    fn record(n: i64) -> Record {
        Record::new().with("n", n)
    }

    #[test]
    fn push_slice_and_drain() {
        let mut buffer = RecordBuffer::new();
        buffer.extend((0..5).map(record));
        buffer.push(record(5));
        assert_eq!(buffer.len(), 6);

        assert_eq!(buffer.slice(2, 2), vec![record(2), record(3)]);
        assert_eq!(buffer.slice(5, 10), vec![record(5)]);
        assert!(buffer.slice(6, 10).is_empty());

        buffer.drain_front(4);
        assert_eq!(buffer.snapshot(), vec![record(4), record(5)]);

        buffer.drain_front(10);
        assert!(buffer.is_empty());
    }

    #[test]
    fn nan_is_refused_anywhere() {
        assert!(validate_record(&record(1)).is_ok());
        let nested = Record::new().with(
            "m",
            Value::map([("xs", Value::Array(vec![Value::Float(f64::NAN)]))]),
        );
        assert!(validate_record(&nested).is_err());
    }

    #[test]
    fn nesting_beyond_record_limit_is_refused() {
        let deep = (0..Record::MAX_DEPTH)
            .fold(Value::Null, |inner, _| Value::Array(vec![inner]));
        assert!(validate_record(&Record::new().with("deep", deep)).is_err());
    }
}
