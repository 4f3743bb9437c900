//! Error types for a meshvec node.
//!
//! This module provides the [`enum@Error`] type returned by every node
//! operation, and [`WireError`], its serializable form used when an error
//! crosses the network.

use meshvec_core::{CollectionId, CoreError};
use meshvec_storage::StorageError;
use meshvec_vector::VectorError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when operating a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Vector length differs from the collection dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension provided.
        actual: usize,
    },

    /// An external id, collection, handle or metadata entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation needs configuration that has not been supplied.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No node is known to own the collection.
    #[error("location unknown for collection {0}")]
    LocationUnknown(CollectionId),

    /// The directory names this node as owner, but the collection is not here.
    #[error("collection {0} is recorded as local but not found")]
    LocalNotFound(CollectionId),

    /// A forwarded call could not reach the resolved peer.
    #[error("peer {address} unreachable: {reason}")]
    RemoteUnreachable {
        /// Address of the peer.
        address: String,
        /// What went wrong.
        reason: String,
    },

    /// A snapshot could not be written. Only ever logged.
    #[error("backup failed: {0}")]
    BackupFailure(String),

    /// The collection is at capacity.
    #[error("collection is full (capacity {capacity})")]
    CapacityExceeded {
        /// The capacity bound.
        capacity: usize,
    },

    /// A metadata payload exceeded the configured maximum size.
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

    /// A storage error occurred.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// File system or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal lock was poisoned (a thread panicked while holding it).
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// A peer reported an error with no local counterpart.
    #[error("remote error: {0}")]
    Remote(String),
}

impl Error {
    /// Create a serialization error.
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a lock poisoned error.
    #[must_use]
    pub fn lock_poisoned(msg: impl Into<String>) -> Self {
        Self::LockPoisoned(msg.into())
    }

    /// Create a remote-unreachable error.
    #[must_use]
    pub fn unreachable(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RemoteUnreachable { address: address.into(), reason: reason.into() }
    }

    /// Returns `true` if the collection's owner could not be determined or reached.
    #[must_use]
    pub const fn is_routing_error(&self) -> bool {
        matches!(self, Self::LocationUnknown(_) | Self::LocalNotFound(_) | Self::RemoteUnreachable { .. })
    }
}

impl From<VectorError> for Error {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::DimensionMismatch { expected, actual } => Self::DimensionMismatch { expected, actual },
            VectorError::NotFound(msg) => Self::NotFound(msg),
            VectorError::Configuration(msg) => Self::Configuration(msg),
            VectorError::CapacityExceeded { capacity } => Self::CapacityExceeded { capacity },
            VectorError::MetadataTooLarge { size, max } => Self::MetadataTooLarge { size, max },
            VectorError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            VectorError::Snapshot(msg) => Self::BackupFailure(msg),
            VectorError::Encoding(msg) => Self::Serialization(msg),
            VectorError::Storage(e) => Self::Storage(e),
            VectorError::Io(e) => Self::Io(e),
        }
    }
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Parse(msg) | CoreError::Validation(msg) => Self::InvalidArgument(msg),
            CoreError::MetadataTooLarge { size, max } => Self::MetadataTooLarge { size, max },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An [`enum@Error`] as it travels between nodes.
///
/// Serialized with a `kind` tag, so a forwarded failure is rebuilt as the
/// same variant on the node that started the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireError {
    /// See [`Error::DimensionMismatch`].
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },
    /// See [`Error::NotFound`].
    NotFound {
        /// Description.
        message: String,
    },
    /// See [`Error::Configuration`].
    Configuration {
        /// Description.
        message: String,
    },
    /// See [`Error::LocationUnknown`].
    LocationUnknown {
        /// The collection.
        collection: CollectionId,
    },
    /// See [`Error::LocalNotFound`].
    LocalNotFound {
        /// The collection.
        collection: CollectionId,
    },
    /// See [`Error::RemoteUnreachable`].
    RemoteUnreachable {
        /// Address of the peer.
        address: String,
        /// What went wrong.
        reason: String,
    },
    /// See [`Error::CapacityExceeded`].
    CapacityExceeded {
        /// The capacity bound.
        capacity: usize,
    },
    /// See [`Error::MetadataTooLarge`].
    MetadataTooLarge {
        /// Payload size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
    /// See [`Error::InvalidArgument`].
    InvalidArgument {
        /// Description.
        message: String,
    },
    /// Any other failure.
    Internal {
        /// Description.
        message: String,
    },
}

impl From<&Error> for WireError {
    fn from(err: &Error) -> Self {
        match err {
            Error::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected: *expected, actual: *actual }
            }
            Error::NotFound(message) => Self::NotFound { message: message.clone() },
            Error::Configuration(message) => Self::Configuration { message: message.clone() },
            Error::LocationUnknown(collection) => Self::LocationUnknown { collection: *collection },
            Error::LocalNotFound(collection) => Self::LocalNotFound { collection: *collection },
            Error::RemoteUnreachable { address, reason } => {
                Self::RemoteUnreachable { address: address.clone(), reason: reason.clone() }
            }
            Error::CapacityExceeded { capacity } => Self::CapacityExceeded { capacity: *capacity },
            Error::MetadataTooLarge { size, max } => Self::MetadataTooLarge { size: *size, max: *max },
            Error::InvalidArgument(message) => Self::InvalidArgument { message: message.clone() },
            other => Self::Internal { message: other.to_string() },
        }
    }
}

impl From<WireError> for Error {
    fn from(err: WireError) -> Self {
        match err {
            WireError::DimensionMismatch { expected, actual } => Self::DimensionMismatch { expected, actual },
            WireError::NotFound { message } => Self::NotFound(message),
            WireError::Configuration { message } => Self::Configuration(message),
            WireError::LocationUnknown { collection } => Self::LocationUnknown(collection),
            WireError::LocalNotFound { collection } => Self::LocalNotFound(collection),
            WireError::RemoteUnreachable { address, reason } => Self::RemoteUnreachable { address, reason },
            WireError::CapacityExceeded { capacity } => Self::CapacityExceeded { capacity },
            WireError::MetadataTooLarge { size, max } => Self::MetadataTooLarge { size, max },
            WireError::InvalidArgument { message } => Self::InvalidArgument(message),
            WireError::Internal { message } => Self::Remote(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_errors_keep_their_kind() {
        let err: Error = VectorError::DimensionMismatch { expected: 3, actual: 2 }.into();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));

        let err: Error = VectorError::Configuration("ef".into()).into();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_wire_roundtrip_preserves_variant() {
        let collection = CollectionId::generate();
        let original = Error::LocationUnknown(collection);
        let json = serde_json::to_string(&WireError::from(&original)).expect("serialize");
        assert!(json.contains("\"kind\":\"location_unknown\""));

        let back: Error = serde_json::from_str::<WireError>(&json).expect("deserialize").into();
        assert!(matches!(back, Error::LocationUnknown(id) if id == collection));
    }

    #[test]
    fn test_unmapped_errors_travel_as_internal() {
        let wire = WireError::from(&Error::lock_poisoned("registry"));
        assert!(matches!(wire, WireError::Internal { .. }));
        assert!(matches!(Error::from(wire), Error::Remote(_)));
    }

    #[test]
    fn test_routing_errors() {
        assert!(Error::unreachable("127.0.0.1:1", "refused").is_routing_error());
        assert!(!Error::NotFound("x".into()).is_routing_error());
    }
}
