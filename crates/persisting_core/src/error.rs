//! Error types for persisting core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in partition, WAL and sink operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] persisting_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] persisting_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The downstream sink rejected or failed a batch.
    #[error("sink error: {message}")]
    Sink {
        /// Description of the failure.
        message: String,
    },

    /// WAL content cannot be trusted.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Another writer holds the partition directory.
    #[error("partition locked: {} is held by another writer", path.display())]
    PartitionLocked {
        /// The partition directory.
        path: PathBuf,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// No backend is registered under the requested name.
    #[error("unknown backend '{name}' (available: {})", available.join(", "))]
    UnknownBackend {
        /// The requested name.
        name: String,
        /// Names that are registered.
        available: Vec<String>,
    },

    /// The backend has been closed.
    #[error("backend is closed")]
    BackendClosed,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a sink error.
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
        }
    }

    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_lists_alternatives() {
        let err = CoreError::UnknownBackend {
            name: "redis".into(),
            available: vec!["columnar".into(), "memory".into()],
        };
        assert_eq!(
            err.to_string(),
            "unknown backend 'redis' (available: columnar, memory)"
        );
    }

    #[test]
    fn codec_errors_convert() {
        let err: CoreError = persisting_codec::CodecError::NaNForbidden.into();
        assert!(matches!(err, CoreError::Codec(_)));
    }
}
