//! Error types for the vector crate.

use meshvec_core::CoreError;
use thiserror::Error;

/// Errors that can occur in vector operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Vector length differs from the collection dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected dimension.
        expected: usize,
        /// The actual dimension.
        actual: usize,
    },

    /// An external id, handle or metadata entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store is not configured for the requested operation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The index already holds as many handles as its capacity allows.
    #[error("index is full (capacity {capacity})")]
    CapacityExceeded {
        /// The capacity bound.
        capacity: usize,
    },

    /// A metadata payload is larger than the store accepts.
    #[error("metadata payload is {size} bytes, maximum is {max}")]
    MetadataTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// An argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A snapshot file is malformed or belongs to another index.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Encoding/decoding error.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] meshvec_storage::StorageError),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for VectorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Parse(msg) | CoreError::Validation(msg) => Self::InvalidArgument(msg),
            CoreError::MetadataTooLarge { size, max } => Self::MetadataTooLarge { size, max },
        }
    }
}

/// Result alias for vector operations.
pub type VectorResult<T> = Result<T, VectorError>;
