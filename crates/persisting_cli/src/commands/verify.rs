//! Verify command implementation.

use super::inspect::describe_end;
use persisting_core::wal::{CorruptReason, ScanEvent};
use persisting_core::{inspect_wal, wal_dir, ColumnarSink};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of valid records.
    pub valid_records: usize,
    /// Number of corrupt frames.
    pub corrupt_frames: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.corrupt_frames == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No partition found at {:?}", path).into());
    }
    println!("Verifying partition at {:?}", path);
    println!();

    println!("Checking WAL...");
    let wal_result = verify_wal(path)?;
    print_result("WAL", &wal_result);

    println!("Checking sink...");
    let sink_result = verify_sink(path);
    print_result("Sink", &sink_result);

    println!();
    if wal_result.is_ok() && sink_result.is_ok() {
        println!("✓ Partition verification passed");
        Ok(())
    } else {
        println!("✗ Partition verification failed");
        Err("Verification failed".into())
    }
}

/// Scans every WAL generation frame by frame.
pub fn verify_wal(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();
    let wal_dir = wal_dir(path);
    if !wal_dir.is_dir() {
        println!("WAL directory not found (this may be normal for WAL-less partitions)");
        return Ok(result);
    }

    for g in inspect_wal(&wal_dir)? {
        result.valid_records += g.scan.records.len();
        result.corrupt_frames += g.scan.corrupt_frames();
        for event in &g.scan.corrupt {
            if let ScanEvent::Corrupt {
                offset,
                len,
                reason,
            } = event
            {
                let reason = match reason {
                    CorruptReason::Frame(fault) => format!("{fault:?}"),
                    CorruptReason::Payload(err) => err.to_string(),
                };
                result.errors.push(format!(
                    "generation {}: corrupt frame at offset {offset} ({len} bytes): {reason}",
                    g.generation
                ));
            }
        }
        if !g.scan.end.is_clean() {
            result.errors.push(format!(
                "generation {}: {}",
                g.generation,
                describe_end(&g.scan.end)
            ));
        }
    }
    Ok(result)
}

/// Checks every sink batch checksum.
pub fn verify_sink(path: &Path) -> VerifyResult {
    let mut result = VerifyResult::default();
    match ColumnarSink::inspect(&path.join("data.cols")) {
        Ok(summary) => {
            result.valid_records = usize::try_from(summary.rows).unwrap_or(usize::MAX);
            if summary.torn_bytes > 0 {
                result
                    .errors
                    .push(format!("torn tail of {} bytes", summary.torn_bytes));
            }
        }
        Err(err) => result.errors.push(err.to_string()),
    }
    result
}

fn print_result(name: &str, result: &VerifyResult) {
    println!("  {name}:");
    println!("    Valid records:  {}", result.valid_records);
    println!("    Corrupt frames: {}", result.corrupt_frames);
    for error in &result.errors {
        println!("    Error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persisting_codec::Record;
    use persisting_core::{Config, PartitionBackend, QueueBackend};
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    fn partition_with_pending(path: &Path) {
        let backend = PartitionBackend::persisting("b1", path, Config::default()).unwrap();
        backend.put(Record::new().with("id", "1")).unwrap();
        backend.put(Record::new().with("id", "2")).unwrap();
    }

    #[test]
    fn healthy_partition_passes() {
        let temp = tempdir().unwrap();
        partition_with_pending(temp.path());

        let wal = verify_wal(temp.path()).unwrap();
        assert!(wal.is_ok());
        assert_eq!(wal.valid_records, 2);
        assert!(verify_sink(temp.path()).is_ok());
        assert!(run(temp.path()).is_ok());
    }

    #[test]
    fn torn_wal_fails() {
        let temp = tempdir().unwrap();
        partition_with_pending(temp.path());
        let wal = temp.path().join("wal").join("wal-000001.log");
        OpenOptions::new()
            .append(true)
            .open(wal)
            .unwrap()
            .write_all(&[3, 0, 0, 0, 1])
            .unwrap();

        let result = verify_wal(temp.path()).unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.valid_records, 2);
        assert!(run(temp.path()).is_err());
    }
}
