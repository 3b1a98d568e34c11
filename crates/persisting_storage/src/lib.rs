//! # Persisting Storage
//!
//! Byte-store backends underneath the persisting WAL and columnar sink.
//!
//! Backends are **opaque byte stores**: they know nothing about frames,
//! records or batches. The WAL and the sink own every format decision and
//! only ask a backend to append bytes, read them back, make them durable and
//! cut them off.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral partitions
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use persisting_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame bytes").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"frame bytes");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
