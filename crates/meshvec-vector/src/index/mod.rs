//! Approximate nearest-neighbour index.
//!
//! An in-memory HNSW (Hierarchical Navigable Small World) graph keyed by
//! [`VectorHandle`](meshvec_core::VectorHandle). Deletion marks nodes as
//! tombstones: they keep routing searches but never appear in results, and
//! their handles are never handed to another vector. The whole graph can be
//! written to and restored from a versioned snapshot file.

mod config;
mod graph;
mod hnsw;
mod snapshot;
mod traits;

pub use config::HnswConfig;
pub use hnsw::HnswIndex;
pub(crate) use snapshot::write_file as write_snapshot_file;
pub use snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use traits::{AnnIndex, SearchResult};
