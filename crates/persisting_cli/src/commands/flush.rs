//! Flush command implementation.

use persisting_core::{Config, PartitionBackend, QueueBackend};
use std::path::Path;
use tracing::info;

/// Opens the partition (running recovery), flushes it and closes it.
///
/// Returns how many records moved into the sink.
pub fn run(path: &Path, bucket: &str) -> Result<usize, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No partition found at {:?}", path).into());
    }

    let backend = PartitionBackend::persisting(bucket, path, Config::default())?;
    let report = backend.recovery_report().clone();
    info!(
        recovered = report.recovered,
        corrupt_frames = report.corrupt_frames,
        "cli.flush.recovered"
    );

    let flushed = backend.flush()?;
    let stats = backend.stats();
    backend.close()?;

    println!("Recovered {} records from the WAL", report.recovered);
    if report.corrupt_frames > 0 {
        println!("Skipped {} corrupt frames", report.corrupt_frames);
    }
    println!("Flushed {} records; sink now holds {}", flushed, stats.persisted_count);
    Ok(flushed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use persisting_codec::Record;
    use tempfile::tempdir;

    #[test]
    fn flush_moves_pending_records_into_sink() {
        let temp = tempdir().unwrap();
        {
            let backend =
                PartitionBackend::persisting("b1", temp.path(), Config::default()).unwrap();
            backend.put(Record::new().with("id", "1")).unwrap();
            backend.put(Record::new().with("id", "2")).unwrap();
        }

        assert_eq!(run(temp.path(), "b1").unwrap(), 2);
        assert_eq!(run(temp.path(), "b1").unwrap(), 0);

        let backend = PartitionBackend::persisting("b1", temp.path(), Config::default()).unwrap();
        assert_eq!(backend.persisted_count(), 2);
        assert_eq!(backend.buffer_count(), 0);
    }
}
