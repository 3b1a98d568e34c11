//! # Persisting Testkit
//!
//! Test utilities for persisting.
//!
//! This crate provides:
//! - Temporary partitions that can be crashed and reopened
//! - Property-based record generators using proptest
//! - Fault injection: failing sinks and on-disk damage helpers
//!
//! ## Usage
//!
//! ```rust
//! use persisting_core::QueueBackend;
//! use persisting_testkit::prelude::*;
//!
//! let mut partition = TestPartition::new();
//! partition.put(id_record("1")).unwrap();
//!
//! let backend = partition.crash_and_reopen();
//! assert_eq!(backend.total_count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
