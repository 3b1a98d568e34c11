//! Buffered frame scanning.
//!
//! Frames are read in bounded chunks from a storage backend so recovery of
//! a large WAL does not load the whole file at once.
//!
//! Scanning policy:
//!
//! - **Partial tail**: fewer bytes than a header, or than the declared
//!   length, at the end of the file. This is a crash mid-append; the scan
//!   ends quietly.
//! - **Corrupt frame**: a complete frame whose checksum does not match, or
//!   whose payload is not a record. The frame is reported and the scan
//!   resumes right after it.
//! - **Unreadable region**: a header declaring an implausible length. The
//!   next frame cannot be located, so the scan stops there.

use crate::error::CoreResult;
use crate::wal::frame::{unframe, FrameFault, Unframed, FRAME_HEADER_LEN};
use persisting_codec::{CodecError, Record};
use persisting_storage::StorageBackend;

/// Read buffer size for scanning.
const READ_BUFFER_SIZE: usize = 64 * 1024; // 64 KB

/// One step of a frame scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A valid frame carrying a record.
    Record {
        /// Byte offset of the frame.
        offset: u64,
        /// The decoded record.
        record: Record,
    },
    /// A damaged frame that was skipped.
    Corrupt {
        /// Byte offset of the frame.
        offset: u64,
        /// Bytes skipped.
        len: u64,
        /// What was wrong.
        reason: CorruptReason,
    },
}

/// Why a frame was skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum CorruptReason {
    /// The frame envelope is damaged.
    Frame(FrameFault),
    /// The checksum matched but the payload is not a record.
    Payload(CodecError),
}

/// How a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    /// Every byte belonged to a frame.
    Clean,
    /// The file ends with a partially written frame at `offset`.
    PartialTail {
        /// Where the partial frame starts.
        offset: u64,
    },
    /// A frame header at `offset` cannot be trusted; the rest was not read.
    Unreadable {
        /// Where the unreadable region starts.
        offset: u64,
    },
}

impl ScanEnd {
    /// Returns `true` if the whole file was consumed frame by frame.
    pub fn is_clean(&self) -> bool {
        matches!(self, ScanEnd::Clean)
    }
}

/// Streaming scanner over the frames of a storage backend.
///
/// Yields [`ScanEvent`]s in file order; once exhausted, [`Self::end`]
/// reports how the scan stopped.
pub struct FrameScanner<'a> {
    backend: &'a dyn StorageBackend,
    total_size: u64,
    /// Offset of the next unread frame.
    offset: u64,
    buffer: Vec<u8>,
    /// Offset in the backend of `buffer[0]`.
    buffer_start: u64,
    end: Option<ScanEnd>,
}

impl<'a> FrameScanner<'a> {
    /// Creates a scanner starting at offset 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: &'a dyn StorageBackend) -> CoreResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            total_size,
            offset: 0,
            buffer: Vec::new(),
            buffer_start: 0,
            end: None,
        })
    }

    /// How the scan ended, once it has.
    pub fn end(&self) -> Option<ScanEnd> {
        self.end
    }

    /// Offset just past the last frame consumed.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Makes sure the buffer holds at least `min_bytes` starting at
    /// `self.offset`, or everything left in the backend if that is less.
    fn fill(&mut self, min_bytes: usize) -> CoreResult<()> {
        let skip = (self.offset - self.buffer_start) as usize;
        if self.buffer.len() - skip >= min_bytes {
            return Ok(());
        }

        self.buffer.drain(..skip);
        self.buffer_start = self.offset;

        let remaining = self.total_size - self.buffer_start - self.buffer.len() as u64;
        let wanted = min_bytes.max(READ_BUFFER_SIZE).saturating_sub(self.buffer.len());
        let to_read = (wanted as u64).min(remaining) as usize;
        if to_read > 0 {
            let read_at = self.buffer_start + self.buffer.len() as u64;
            let data = self.backend.read_at(read_at, to_read)?;
            self.buffer.extend_from_slice(&data);
        }
        Ok(())
    }

    fn next_event(&mut self) -> CoreResult<Option<ScanEvent>> {
        if self.end.is_some() {
            return Ok(None);
        }
        if self.offset >= self.total_size {
            self.end = Some(ScanEnd::Clean);
            return Ok(None);
        }

        self.fill(FRAME_HEADER_LEN)?;
        let mut declared = 0usize;
        let start = (self.offset - self.buffer_start) as usize;
        if self.buffer.len() - start >= FRAME_HEADER_LEN {
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(&self.buffer[start..start + 4]);
            declared = u32::from_le_bytes(len_bytes) as usize;
        }
        // Implausible lengths are rejected by `unframe` without a full read.
        if declared <= crate::wal::frame::MAX_FRAME_LEN {
            self.fill(FRAME_HEADER_LEN + declared)?;
        }

        let frame_offset = self.offset;
        let start = (self.offset - self.buffer_start) as usize;
        match unframe(&self.buffer[start..]) {
            Unframed::Frame { payload, frame_len } => {
                self.offset += frame_len as u64;
                match Record::decode(payload) {
                    Ok(record) => Ok(Some(ScanEvent::Record {
                        offset: frame_offset,
                        record,
                    })),
                    Err(err) => Ok(Some(ScanEvent::Corrupt {
                        offset: frame_offset,
                        len: frame_len as u64,
                        reason: CorruptReason::Payload(err),
                    })),
                }
            }
            Unframed::EndOfStream => {
                self.end = Some(ScanEnd::PartialTail {
                    offset: frame_offset,
                });
                Ok(None)
            }
            Unframed::Corrupt {
                fault,
                extent: Some(len),
            } => {
                self.offset += len as u64;
                Ok(Some(ScanEvent::Corrupt {
                    offset: frame_offset,
                    len: len as u64,
                    reason: CorruptReason::Frame(fault),
                }))
            }
            Unframed::Corrupt { extent: None, .. } => {
                self.end = Some(ScanEnd::Unreadable {
                    offset: frame_offset,
                });
                Ok(None)
            }
        }
    }
}

impl Iterator for FrameScanner<'_> {
    type Item = CoreResult<ScanEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(err) => {
                self.end = Some(ScanEnd::Unreadable {
                    offset: self.offset,
                });
                Some(Err(err))
            }
        }
    }
}

/// Everything a full scan found.
#[derive(Debug, Clone, PartialEq)]
pub struct WalScan {
    /// Valid records in file order.
    pub records: Vec<Record>,
    /// Skipped frames.
    pub corrupt: Vec<ScanEvent>,
    /// How the scan ended.
    pub end: ScanEnd,
    /// Bytes examined.
    pub size: u64,
}

impl WalScan {
    /// Number of corrupt frames skipped.
    pub fn corrupt_frames(&self) -> usize {
        self.corrupt.len()
    }

    /// Returns `true` if there was no damage of any kind.
    pub fn is_intact(&self) -> bool {
        self.corrupt.is_empty() && self.end.is_clean()
    }
}

/// Scans every frame of a backend.
///
/// # Errors
///
/// Returns an error only for I/O failures; damage is reported in the result.
pub fn scan_frames(backend: &dyn StorageBackend) -> CoreResult<WalScan> {
    let mut scanner = FrameScanner::new(backend)?;
    let mut records = Vec::new();
    let mut corrupt = Vec::new();

    for event in scanner.by_ref() {
        match event? {
            ScanEvent::Record { record, .. } => records.push(record),
            damaged @ ScanEvent::Corrupt { .. } => corrupt.push(damaged),
        }
    }

    Ok(WalScan {
        records,
        corrupt,
        end: scanner.end().unwrap_or(ScanEnd::Clean),
        size: scanner.total_size,
    })
}
