//! # Persisting Core
//!
//! Durable partition storage for a buffered, batch-flushed record queue.
//!
//! This crate provides:
//! - A framed, checksummed write-ahead log with sync policies and rotation
//! - An in-memory buffer flushed to a sink in ordered batches
//! - Crash recovery that replays unflushed records into the buffer
//! - A columnar sink and an in-memory sink
//! - Blocking and non-blocking record streams over one offset space
//! - A registry of named backend constructors
//!
//! ## Example
//!
//! ```rust,no_run
//! use persisting_core::{Config, PartitionBackend, QueueBackend, StreamOptions};
//! use persisting_codec::Record;
//! use std::path::Path;
//!
//! let backend = PartitionBackend::persisting(
//!     "orders-0",
//!     Path::new("/var/lib/queue/orders-0"),
//!     Config::default(),
//! )?;
//!
//! backend.put(Record::new().with("id", "1"))?;
//! backend.flush()?;
//!
//! for record in backend.get_stream(0, StreamOptions::snapshot()) {
//!     println!("{:?}", record?);
//! }
//! backend.close()?;
//! # Ok::<(), persisting_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod buffer;
mod config;
mod dir;
mod error;
mod recovery;
mod registry;
pub mod sink;
mod stats;
mod stream;
pub mod wal;

pub use backend::{PartitionBackend, QueueBackend};
pub use buffer::RecordBuffer;
pub use config::Config;
pub use dir::{sync_directory, wal_dir, PartitionDir};
pub use error::{CoreError, CoreResult};
pub use recovery::{inspect_wal, recover, GenerationScan, Recovered, RecoveryReport};
pub use registry::{BackendConstructor, BackendContext, BackendRegistry};
pub use sink::{ColumnType, ColumnarSink, MemorySink, Sink, SinkSummary};
pub use stats::{BackendStats, Metrics, MetricsSnapshot};
pub use stream::{ChunkSource, RecordStream, StreamOptions, STREAM_CHUNK_SIZE};
pub use wal::{SyncMode, WalFile};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
