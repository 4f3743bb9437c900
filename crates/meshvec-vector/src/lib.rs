//! meshvec vector
//!
//! Everything a node needs to own one collection locally:
//!
//! - **Identity mapping**: external string ids are fingerprinted (SHA-256)
//!   and assigned dense, never-reused [`VectorHandle`]s
//! - **ANN index**: an in-memory HNSW graph with tombstone deletion and
//!   versioned snapshot files
//! - **Vector store**: add/get/update/delete/query over one collection, with
//!   metadata, append-only history and best-effort backups
//!
//! # Example
//!
//! ```ignore
//! use meshvec_core::{BuildParams, CollectionConfig, Metric};
//! use meshvec_vector::store::{BackupPolicy, HistoryLog, StorePaths, VectorStore};
//!
//! let config = CollectionConfig::new(3, Metric::SquaredEuclidean, 100, BuildParams::default())?;
//! let mut store = VectorStore::create(config, engine, history, paths, BackupPolicy::default())?;
//! store.add("a", &[1.0, 0.0, 0.0], None)?;
//! store.set_quality(50)?;
//! let nearest = store.query(&[1.0, 0.0, 0.0], 1)?;
//! ```
//!
//! # Modules
//!
//! - [`distance`] - Distance functions
//! - [`error`] - Error types
//! - [`identity`] - External id to handle mapping
//! - [`index`] - HNSW index
//! - [`store`] - Vector store, history, backups, filters
//!
//! [`VectorHandle`]: meshvec_core::VectorHandle

pub mod distance;
pub mod error;
pub mod identity;
pub mod index;
pub mod store;

pub use error::VectorError;
pub use identity::IdentityMapper;
pub use index::{AnnIndex, HnswConfig, HnswIndex, SearchResult};
pub use store::{BackupPolicy, Filter, HistoryLog, Neighbor, StorePaths, VectorStore};
