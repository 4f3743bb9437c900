//! Traits for vector indexes.

use std::path::Path;

use meshvec_core::VectorHandle;
use serde::{Deserialize, Serialize};

use crate::error::VectorError;

/// Result of a similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Handle of the matching vector.
    pub handle: VectorHandle,
    /// Distance to the query vector (lower is closer).
    pub distance: f32,
}

impl SearchResult {
    /// Create a new search result.
    #[must_use]
    pub const fn new(handle: VectorHandle, distance: f32) -> Self {
        Self { handle, distance }
    }
}

/// An approximate nearest-neighbour index with tombstone deletion.
///
/// Handles are chosen by the caller. A tombstoned handle is never reported
/// by [`search`](Self::search) or [`fetch`](Self::fetch), and its slot keeps
/// counting against the capacity. Re-inserting a handle replaces its vector
/// and clears the tombstone.
pub trait AnnIndex {
    /// Insert or replace the vector stored under `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::DimensionMismatch`] for a wrong-length vector and
    /// [`VectorError::CapacityExceeded`] when a new handle does not fit.
    fn insert(&mut self, handle: VectorHandle, vector: &[f32]) -> Result<(), VectorError>;

    /// Mark `handle` as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::NotFound`] if the handle is unknown or already
    /// tombstoned.
    fn tombstone(&mut self, handle: VectorHandle) -> Result<(), VectorError>;

    /// The vector stored under a live handle.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::NotFound`] for unknown or tombstoned handles.
    fn fetch(&self, handle: VectorHandle) -> Result<Vec<f32>, VectorError>;

    /// The `k` live vectors nearest to `query`, closest first, exploring with
    /// a candidate list of size `ef` (raised to `k` if smaller).
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::DimensionMismatch`] for a wrong-length query.
    fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<SearchResult>, VectorError>;

    /// Write the whole index to a versioned snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn snapshot(&self, path: &Path) -> Result<(), VectorError>;

    /// Whether `handle` is present and not tombstoned.
    fn is_live(&self, handle: VectorHandle) -> bool;

    /// Whether `handle` is present, live or tombstoned.
    fn contains(&self, handle: VectorHandle) -> bool;

    /// Every handle in the index, live or tombstoned.
    fn handles(&self) -> Vec<VectorHandle>;

    /// Number of handles in the index, including tombstones.
    fn len(&self) -> usize;

    /// Whether the index holds no handles at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live (non-tombstoned) handles.
    fn live_count(&self) -> usize;

    /// Maximum number of handles.
    fn capacity(&self) -> usize;

    /// Dimension of stored vectors.
    fn dimension(&self) -> usize;
}
