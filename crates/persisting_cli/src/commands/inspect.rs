//! Inspect command implementation.

use persisting_core::wal::{generation_path, ScanEnd};
use persisting_core::{inspect_wal, wal_dir, ColumnarSink, SinkSummary};
use serde::Serialize;
use std::path::Path;

/// Partition inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Partition path.
    pub path: String,
    /// WAL generations, oldest first.
    pub generations: Vec<GenerationStats>,
    /// Records the next open would replay into the buffer.
    pub pending_records: usize,
    /// Columnar sink state.
    pub sink: SinkSummary,
}

/// Statistics for a single WAL generation.
#[derive(Debug, Serialize)]
pub struct GenerationStats {
    /// Generation number.
    pub generation: u64,
    /// File name.
    pub file: String,
    /// File size in bytes.
    pub size: u64,
    /// Intact records.
    pub records: usize,
    /// Skipped corrupt frames.
    pub corrupt_frames: usize,
    /// How the scan ended.
    pub end: String,
}

impl InspectResult {
    /// Whether any generation is damaged or the sink has a torn tail.
    pub fn has_damage(&self) -> bool {
        self.sink.torn_bytes > 0
            || self
                .generations
                .iter()
                .any(|g| g.corrupt_frames > 0 || g.end != "clean")
    }
}

/// Reads WAL and sink state without modifying either.
pub fn gather(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No partition found at {:?}", path).into());
    }

    let wal_dir = wal_dir(path);
    let scans = if wal_dir.is_dir() {
        inspect_wal(&wal_dir)?
    } else {
        Vec::new()
    };

    let generations: Vec<GenerationStats> = scans
        .iter()
        .map(|g| GenerationStats {
            generation: g.generation,
            file: generation_path(&wal_dir, g.generation)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: g.scan.size,
            records: g.scan.records.len(),
            corrupt_frames: g.scan.corrupt_frames(),
            end: describe_end(&g.scan.end),
        })
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        pending_records: generations.last().map_or(0, |g| g.records),
        generations,
        sink: ColumnarSink::inspect(&path.join("data.cols"))?,
    })
}

/// Human-readable scan ending.
pub fn describe_end(end: &ScanEnd) -> String {
    match end {
        ScanEnd::Clean => "clean".to_string(),
        ScanEnd::PartialTail { offset } => format!("partial tail at {offset}"),
        ScanEnd::Unreadable { offset } => format!("unreadable from {offset}"),
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = gather(path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "text" => print_text(&result),
        other => return Err(format!("Unknown format '{other}' (expected text or json)").into()),
    }
    Ok(())
}

fn print_text(result: &InspectResult) {
    println!("Partition: {}", result.path);
    println!();
    println!("WAL:");
    if result.generations.is_empty() {
        println!("  no generations");
    }
    for g in &result.generations {
        println!(
            "  {} ({} bytes): {} records, {} corrupt, {}",
            g.file, g.size, g.records, g.corrupt_frames, g.end
        );
    }
    if result.generations.len() > 1 {
        println!("  older generations are stale and will be removed on open");
    }
    println!("  pending records: {}", result.pending_records);
    println!();
    println!("Sink:");
    println!("  batches: {}", result.sink.batches);
    println!("  rows:    {}", result.sink.rows);
    println!("  size:    {} bytes", result.sink.size);
    if result.sink.torn_bytes > 0 {
        println!("  torn tail: {} bytes", result.sink.torn_bytes);
    }
}
