//! meshvec storage
//!
//! The durable key-value collaborator used by meshvec: a small storage
//! engine abstraction and its redb backend. Logical tables (collection
//! configurations, history, vector rows, metadata, identity state) share a
//! single physical redb table through key prefixing.
//!
//! # Modules
//!
//! - [`engine`] - Storage engine traits and errors
//! - [`backends`] - Concrete storage backend implementations

pub mod backends;
pub mod engine;

pub use backends::{names, RedbEngine};
pub use engine::{KeyValue, StorageEngine, StorageError, StorageResult, Transaction};
