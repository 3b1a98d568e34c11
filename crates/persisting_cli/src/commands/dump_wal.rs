//! Dump-wal command implementation.

use persisting_codec::Record;
use persisting_core::{inspect_wal, wal_dir};
use std::io::{self, Write};
use std::path::Path;

/// Runs the dump-wal command.
///
/// Only the newest generation is replayed on open, so only its records are
/// printed.
pub fn run(
    path: &Path,
    offset: usize,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = pending_records(path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_records(&mut out, &records, offset, limit)?;
    out.flush()?;
    Ok(())
}

/// Records recovery would place in the buffer.
pub fn pending_records(path: &Path) -> Result<Vec<Record>, Box<dyn std::error::Error>> {
    let wal_dir = wal_dir(path);
    if !wal_dir.is_dir() {
        return Err(format!("No WAL found at {:?}", wal_dir).into());
    }
    Ok(inspect_wal(&wal_dir)?
        .pop()
        .map(|g| g.scan.records)
        .unwrap_or_default())
}

fn write_records(
    out: &mut impl Write,
    records: &[Record],
    offset: usize,
    limit: Option<usize>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut written = 0;
    for record in records.iter().skip(offset).take(limit.unwrap_or(usize::MAX)) {
        serde_json::to_writer(&mut *out, record)?;
        writeln!(out)?;
        written += 1;
    }
    Ok(written)
}
