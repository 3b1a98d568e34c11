//! Durable column-oriented batch file.
//!
//! Each flushed batch is one frame (same envelope as the WAL) whose payload
//! is a canonical CBOR map:
//!
//! ```text
//! { "rows": n,
//!   "columns": [ { "name": "id", "type": "text",
//!                  "present": <bitmap, row i = bit i % 8 of byte i / 8>,
//!                  "values": [ value of every present row, in row order ] },
//!                ... ] }
//! ```
//!
//! A column's type is inferred per batch: a single scalar kind, or `mixed`
//! when rows disagree or hold nested values. Records are rebuilt exactly
//! as they were written, absent fields included.
//!
//! A flush larger than [`BATCH_TARGET_BYTES`] is split into several
//! batches written with one append and one sync. Every batch of such a
//! group except the last carries `"more": true`; a group cut short by a
//! crash is discarded whole on open.
//!
//! Compaction merges runs of small adjacent batches into batches of up to
//! [`BATCH_TARGET_BYTES`] and [`COMPACTED_BATCH_ROWS`] rows. Larger batches
//! are copied as they are.

use super::Sink;
use crate::dir::sync_directory;
use crate::error::{CoreError, CoreResult};
use crate::wal::{frame, unframe, Unframed, MAX_FRAME_LEN};
use bytes::BytesMut;
use persisting_codec::{from_cbor, to_canonical_cbor, Record, Value};
use persisting_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Payload size a flush is split at, and the size compaction merges up to.
pub const BATCH_TARGET_BYTES: usize = 8 * 1024 * 1024;

/// Row count compaction merges up to.
pub const COMPACTED_BATCH_ROWS: u64 = 4096;

/// Upper bound on what a batch adds around its columns.
const BATCH_OVERHEAD: usize = 64;

/// Upper bound on what one column adds around a single row's value,
/// beyond the field name and value bytes.
const COLUMN_OVERHEAD: usize = 48;

/// Inferred type of one column within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Every present value is an integer.
    Int,
    /// Every present value is a float.
    Float,
    /// Every present value is a bool.
    Bool,
    /// Every present value is text.
    Text,
    /// Every present value is a byte string.
    Bytes,
    /// Anything else.
    Mixed,
}

impl ColumnType {
    /// The name stored on disk.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::Text => "text",
            ColumnType::Bytes => "bytes",
            ColumnType::Mixed => "mixed",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "int" => ColumnType::Int,
            "float" => ColumnType::Float,
            "bool" => ColumnType::Bool,
            "text" => ColumnType::Text,
            "bytes" => ColumnType::Bytes,
            "mixed" => ColumnType::Mixed,
            _ => return None,
        })
    }

    fn of(value: &Value) -> Self {
        match value {
            Value::Integer(_) => ColumnType::Int,
            Value::Float(_) => ColumnType::Float,
            Value::Bool(_) => ColumnType::Bool,
            Value::Text(_) => ColumnType::Text,
            Value::Bytes(_) => ColumnType::Bytes,
            Value::Null | Value::Array(_) | Value::Map(_) => ColumnType::Mixed,
        }
    }

    /// Infers the type shared by `values`.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut kinds = values.into_iter().map(Self::of);
        let Some(first) = kinds.next() else {
            return ColumnType::Mixed;
        };
        if kinds.all(|k| k == first) {
            first
        } else {
            ColumnType::Mixed
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        *self == ColumnType::Mixed || Self::of(value) == *self
    }
}

/// What [`ColumnarSink::inspect`] found in a data file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkSummary {
    /// Intact batches.
    pub batches: usize,
    /// Rows across intact batches.
    pub rows: u64,
    /// File size in bytes.
    pub size: u64,
    /// Bytes after the last intact batch, cut away on the next open.
    pub torn_bytes: u64,
}

/// Location of one batch in the data file.
#[derive(Debug, Clone, Copy)]
struct BatchMeta {
    offset: u64,
    frame_len: usize,
    first_row: u64,
    rows: u64,
}

/// A sink that stores batches column-wise in a single framed file.
///
/// The file is scanned on open to rebuild the batch index; a batch torn
/// by a crash mid-append is cut away. Every append is synced before it
/// returns.
pub struct ColumnarSink {
    path: PathBuf,
    temp_path: PathBuf,
    backend: FileBackend,
    batches: Vec<BatchMeta>,
    rows: u64,
}

impl ColumnarSink {
    /// Opens or creates the data file at `path`.
    ///
    /// `temp_path` is used while compacting.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Sink`] if a stored batch is damaged, or an I/O
    /// error.
    pub fn open(path: &Path, temp_path: &Path) -> CoreResult<Self> {
        if temp_path.exists() {
            fs::remove_file(temp_path)?;
        }
        let mut backend = FileBackend::open_with_create_dirs(path)?;
        let (batches, valid_len) = index_batches(&backend)?;

        let size = backend.size()?;
        if valid_len < size {
            warn!(
                path = %path.display(),
                torn_bytes = size - valid_len,
                "sink.columnar.torn_tail"
            );
            backend.truncate(valid_len)?;
        }

        let rows = batches.last().map_or(0, |b| b.first_row + b.rows);
        debug!(path = %path.display(), batches = batches.len(), rows, "sink.columnar.open");
        Ok(Self {
            path: path.to_path_buf(),
            temp_path: temp_path.to_path_buf(),
            backend,
            batches,
            rows,
        })
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the batch index of the file at `path` without repairing it.
    ///
    /// A missing file summarizes as empty.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Sink`] if a stored batch is damaged, or an I/O
    /// error.
    pub fn inspect(path: &Path) -> CoreResult<SinkSummary> {
        if !path.exists() {
            return Ok(SinkSummary::default());
        }
        let backend = FileBackend::open(path)?;
        let (batches, valid_len) = index_batches(&backend)?;
        let size = backend.size()?;
        Ok(SinkSummary {
            batches: batches.len(),
            rows: batches.last().map_or(0, |b| b.first_row + b.rows),
            size,
            torn_bytes: size - valid_len,
        })
    }

    fn read_batch(&self, meta: &BatchMeta) -> CoreResult<Vec<Record>> {
        let bytes = self.backend.read_at(meta.offset, meta.frame_len)?;
        match unframe(&bytes) {
            Unframed::Frame { payload, .. } => decode_batch(payload),
            _ => Err(CoreError::sink(format!(
                "batch at offset {} failed its checksum",
                meta.offset
            ))),
        }
    }
}

impl Sink for ColumnarSink {
    fn name(&self) -> &'static str {
        "columnar"
    }

    fn check_record(&self, record: &Record) -> CoreResult<()> {
        let bound = single_row_bound(record);
        if bound > MAX_FRAME_LEN {
            return Err(CoreError::invalid_operation(format!(
                "record of {} bytes in {} fields does not fit a {MAX_FRAME_LEN} byte batch",
                record.encoded_len(),
                record.len()
            )));
        }
        Ok(())
    }

    fn append_batch(&mut self, records: &[Record]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let encoded = encode_group(records)?;
        let mut bytes = BytesMut::with_capacity(encoded.iter().map(|b| b.framed.len()).sum());
        for batch in &encoded {
            bytes.extend_from_slice(&batch.framed);
        }

        let offset = self.backend.append(&bytes)?;
        if let Err(err) = self.backend.sync() {
            if let Err(undo) = self.backend.truncate(offset) {
                warn!(
                    path = %self.path.display(),
                    offset,
                    error = %undo,
                    "sink.columnar.rollback_failed"
                );
            }
            return Err(err.into());
        }

        let mut pos = offset;
        for batch in encoded {
            self.batches.push(BatchMeta {
                offset: pos,
                frame_len: batch.framed.len(),
                first_row: self.rows,
                rows: batch.rows,
            });
            pos += batch.framed.len() as u64;
            self.rows += batch.rows;
        }
        Ok(())
    }

    fn read_range(&self, offset: u64, limit: usize) -> CoreResult<Vec<Record>> {
        let end = offset.saturating_add(limit as u64).min(self.rows);
        if offset >= end {
            return Ok(Vec::new());
        }

        let first = self
            .batches
            .partition_point(|b| b.first_row + b.rows <= offset);
        let mut out = Vec::with_capacity((end - offset) as usize);
        for meta in &self.batches[first..] {
            if meta.first_row >= end {
                break;
            }
            let rows = self.read_batch(meta)?;
            let skip = offset.saturating_sub(meta.first_row) as usize;
            let take = (end - meta.first_row.max(offset)) as usize;
            out.extend(rows.into_iter().skip(skip).take(take));
        }
        Ok(out)
    }

    fn count(&self) -> u64 {
        self.rows
    }

    fn batch_count(&self) -> usize {
        self.batches.len()
    }

    fn compactable_batches(&self) -> usize {
        plan_compaction(&self.batches)
            .iter()
            .map(|run| run.len())
            .filter(|&len| len > 1)
            .sum()
    }

    fn compact(&mut self) -> CoreResult<bool> {
        let plan = plan_compaction(&self.batches);
        if plan.iter().all(|run| run.len() == 1) {
            return Ok(false);
        }

        let mut temp = FileBackend::create(&self.temp_path)?;
        let mut batches = Vec::with_capacity(plan.len());
        let mut rows = 0u64;
        for run in plan {
            let encoded = if run.len() == 1 {
                let meta = self.batches[run.start];
                let bytes = self.backend.read_at(meta.offset, meta.frame_len)?;
                vec![EncodedBatch {
                    framed: BytesMut::from(bytes.as_slice()),
                    rows: meta.rows,
                }]
            } else {
                let first = self.batches[run.start].first_row;
                let count: u64 = self.batches[run].iter().map(|b| b.rows).sum();
                let limit = usize::try_from(count).unwrap_or(usize::MAX);
                encode_group(&self.read_range(first, limit)?)?
            };
            for batch in encoded {
                let offset = temp.append(&batch.framed)?;
                batches.push(BatchMeta {
                    offset,
                    frame_len: batch.framed.len(),
                    first_row: rows,
                    rows: batch.rows,
                });
                rows += batch.rows;
            }
        }
        temp.sync()?;
        temp.rename(&self.path)?;

        // The old file is gone; reads must use the new handle and index.
        let before = self.batches.len();
        self.backend = temp;
        self.batches = batches;
        if let Some(parent) = self.path.parent() {
            sync_directory(parent)?;
        }
        debug!(
            before,
            after = self.batches.len(),
            rows = self.rows,
            "sink.columnar.compacted"
        );
        Ok(true)
    }
}

impl std::fmt::Debug for ColumnarSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnarSink")
            .field("path", &self.path)
            .field("batches", &self.batches.len())
            .field("rows", &self.rows)
            .finish()
    }
}

/// Scans the data file; returns the batch index and the length of the
/// intact prefix.
///
/// A trailing group whose last batch is still marked `more` was cut short
/// by a crash and is left out of the prefix.
fn index_batches(backend: &FileBackend) -> CoreResult<(Vec<BatchMeta>, u64)> {
    let data = backend.read_all()?;
    let mut batches = Vec::new();
    let mut pos = 0usize;
    let mut first_row = 0u64;
    let mut open_group: Option<(usize, usize)> = None;

    loop {
        match unframe(&data[pos..]) {
            Unframed::Frame { payload, frame_len } => {
                let (rows, more) = batch_header(payload)?;
                if !more {
                    open_group = None;
                } else if open_group.is_none() {
                    open_group = Some((batches.len(), pos));
                }
                batches.push(BatchMeta {
                    offset: pos as u64,
                    frame_len,
                    first_row,
                    rows,
                });
                first_row += rows;
                pos += frame_len;
            }
            Unframed::EndOfStream => break,
            Unframed::Corrupt { fault, .. } => {
                return Err(CoreError::sink(format!(
                    "{}: damaged batch at offset {pos}: {fault:?}",
                    backend.path().display()
                )));
            }
        }
    }

    if let Some((index, start)) = open_group {
        batches.truncate(index);
        pos = start;
    }
    Ok((batches, pos as u64))
}

/// One encoded batch frame.
struct EncodedBatch {
    framed: BytesMut,
    rows: u64,
}

/// Upper bound on the payload of a batch holding only `record`.
fn single_row_bound(record: &Record) -> usize {
    BATCH_OVERHEAD + record.encoded_len() + record.len() * COLUMN_OVERHEAD
}

/// Encodes one flush as a group of batches of about
/// [`BATCH_TARGET_BYTES`] each, marking all but the last with `more`.
fn encode_group(records: &[Record]) -> CoreResult<Vec<EncodedBatch>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut bytes = 0usize;
    for (i, record) in records.iter().enumerate() {
        let size = single_row_bound(record);
        if i > start && bytes + size > BATCH_TARGET_BYTES {
            chunks.push(&records[start..i]);
            start = i;
            bytes = 0;
        }
        bytes += size;
    }
    chunks.push(&records[start..]);

    let mut out = Vec::with_capacity(chunks.len());
    let last = chunks.len() - 1;
    for (i, chunk) in chunks.into_iter().enumerate() {
        encode_split(chunk, i < last, &mut out)?;
    }
    Ok(out)
}

/// Encodes `records` as one batch, halving it while it exceeds
/// [`BATCH_TARGET_BYTES`].
fn encode_split(records: &[Record], more: bool, out: &mut Vec<EncodedBatch>) -> CoreResult<()> {
    let payload = encode_batch(records, more)?;
    if payload.len() > BATCH_TARGET_BYTES && records.len() > 1 {
        let mid = records.len() / 2;
        encode_split(&records[..mid], true, out)?;
        return encode_split(&records[mid..], more, out);
    }
    out.push(EncodedBatch {
        framed: frame(&payload)?,
        rows: records.len() as u64,
    });
    Ok(())
}

/// Splits the batch list into runs to merge. A run of one is left alone.
fn plan_compaction(batches: &[BatchMeta]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut bytes = 0usize;
    let mut rows = 0u64;
    for (i, batch) in batches.iter().enumerate() {
        let fits = bytes + batch.frame_len <= BATCH_TARGET_BYTES
            && rows + batch.rows <= COMPACTED_BATCH_ROWS;
        if i > start && !fits {
            runs.push(start..i);
            start = i;
            bytes = 0;
            rows = 0;
        }
        bytes += batch.frame_len;
        rows += batch.rows;
    }
    if start < batches.len() {
        runs.push(start..batches.len());
    }
    runs
}

fn malformed(detail: impl std::fmt::Display) -> CoreError {
    CoreError::sink(format!("malformed batch: {detail}"))
}

fn encode_batch(records: &[Record], more: bool) -> CoreResult<Vec<u8>> {
    let names: BTreeSet<&str> = records.iter().flat_map(|r| r.field_names()).collect();
    let mut columns = Vec::with_capacity(names.len());

    for name in names {
        let mut present = vec![0u8; records.len().div_ceil(8)];
        let mut values = Vec::new();
        for (row, record) in records.iter().enumerate() {
            if let Some(value) = record.get(name) {
                present[row / 8] |= 1 << (row % 8);
                values.push(value.clone());
            }
        }
        let kind = ColumnType::infer(&values);
        columns.push(Value::map([
            ("name", Value::from(name)),
            ("type", Value::from(kind.name())),
            ("present", Value::Bytes(present)),
            ("values", Value::Array(values)),
        ]));
    }

    let mut fields = vec![
        ("rows", Value::Integer(records.len() as i64)),
        ("columns", Value::Array(columns)),
    ];
    if more {
        fields.push(("more", Value::Bool(true)));
    }
    Ok(to_canonical_cbor(&Value::map(fields))?)
}

/// Row count and continuation flag of a batch payload.
fn batch_header(payload: &[u8]) -> CoreResult<(u64, bool)> {
    let batch = from_cbor(payload)?;
    let rows = batch
        .get("rows")
        .and_then(Value::as_integer)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| malformed("missing row count"))?;
    let more = batch.get("more").and_then(Value::as_bool).unwrap_or(false);
    Ok((rows, more))
}

fn decode_batch(payload: &[u8]) -> CoreResult<Vec<Record>> {
    let batch = from_cbor(payload)?;
    let rows = batch
        .get("rows")
        .and_then(Value::as_integer)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| malformed("missing row count"))?;
    let columns = batch
        .get("columns")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing columns"))?;

    let mut records = vec![Record::new(); rows];
    for column in columns {
        let name = column
            .get("name")
            .and_then(Value::as_text)
            .ok_or_else(|| malformed("column without name"))?;
        let kind = column
            .get("type")
            .and_then(Value::as_text)
            .and_then(ColumnType::parse)
            .ok_or_else(|| malformed(format!("column {name}: unknown type")))?;
        let present = column
            .get("present")
            .and_then(Value::as_bytes)
            .filter(|bits| bits.len() == rows.div_ceil(8))
            .ok_or_else(|| malformed(format!("column {name}: bad presence bitmap")))?;
        let values = column
            .get("values")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed(format!("column {name}: missing values")))?;

        let mut values = values.iter();
        for (row, record) in records.iter_mut().enumerate() {
            if present[row / 8] & (1 << (row % 8)) == 0 {
                continue;
            }
            let value = values
                .next()
                .ok_or_else(|| malformed(format!("column {name}: too few values")))?;
            if !kind.accepts(value) {
                return Err(malformed(format!(
                    "column {name}: {} value in {} column",
                    value.type_name(),
                    kind.name()
                )));
            }
            record.insert(name, value.clone());
        }
        if values.next().is_some() {
            return Err(malformed(format!("column {name}: too many values")));
        }
    }
    Ok(records)
}
