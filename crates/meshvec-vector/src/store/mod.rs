//! Per-collection vector storage.
//!
//! A [`VectorStore`] owns the HNSW index, identity map and durable rows of
//! one collection. History entries go to a [`HistoryLog`] shared with the
//! node catalog; snapshots are scheduled by a [`BackupPolicy`].

mod backup;
mod filter;
mod history;
mod rows;
mod vector_store;

pub use backup::{BackupJob, BackupPolicy, StorePaths};
pub use filter::Filter;
pub use history::HistoryLog;
pub use vector_store::{Neighbor, VectorStore};
