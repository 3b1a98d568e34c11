//! Write-ahead log for partition durability.
//!
//! Every record a partition accepts is appended to the WAL before it enters
//! the in-memory buffer. When the buffer is flushed to the sink, the WAL is
//! emptied. After a crash, whatever the WAL still holds is exactly what the
//! sink never received.
//!
//! ## Frame Format
//!
//! ```text
//! | length (4, LE) | crc32 (4, LE) | payload (length) |
//! ```
//!
//! The payload is the canonical CBOR encoding of one record.
//!
//! ## Files
//!
//! The WAL lives in numbered generations (`wal-000001.log`, ...). Only the
//! newest is active. Rotation starts a new generation once the active one
//! grows past the configured size, and only after a flush has made its
//! content durable in the sink.
//!
//! ## Recovery Policy
//!
//! - **Partial tail**: an incomplete frame at the end is a crash mid-append
//!   and ends the scan silently.
//! - **Corrupt frame**: a checksum mismatch skips exactly that frame.
//! - **Unreadable region**: an implausible length stops the scan; later
//!   bytes are lost.
//!
//! Corruption is logged and counted, never raised.

mod file;
pub mod frame;
mod reader;
mod sync;

pub use file::{generation_path, list_generations, WalFile, WAL_TEMP};
pub(crate) use file::write_generation;
pub use frame::{frame, unframe, FrameFault, Unframed, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use reader::{scan_frames, CorruptReason, FrameScanner, ScanEnd, ScanEvent, WalScan};
pub use sync::{SyncMode, ASYNC_THRESHOLD};
