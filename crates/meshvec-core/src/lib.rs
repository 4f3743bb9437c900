//! meshvec core
//!
//! Identifiers and records shared by every meshvec crate: collection and
//! vector identities, distance metrics, collection configuration, history
//! entries and metadata payloads.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, metrics, collection configuration, history, metadata
//! - [`error`] - Error types
//! - [`validate`] - Parameter validation helpers

#![deny(clippy::unwrap_used)]

pub mod error;
pub mod types;
pub mod validate;

pub use error::CoreError;
pub use types::{
    Action, BuildParams, CollectionConfig, CollectionId, Fingerprint, HistoryEntry, Metadata,
    Metric, VectorHandle, DEFAULT_MAX_METADATA_BYTES,
};
