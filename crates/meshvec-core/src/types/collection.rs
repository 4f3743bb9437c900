//! Collection configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CollectionId, Metric};
use crate::error::CoreError;

/// Index build parameters of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParams {
    /// Maximum number of neighbours per node on the upper graph layers.
    pub m: usize,
    /// Candidate-list size used while inserting.
    pub ef_construction: usize,
}

impl BuildParams {
    /// Default graph degree.
    pub const DEFAULT_M: usize = 16;
    /// Default construction breadth.
    pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

    /// Create build parameters.
    #[must_use]
    pub const fn new(m: usize, ef_construction: usize) -> Self {
        Self { m, ef_construction }
    }
}

impl Default for BuildParams {
    fn default() -> Self {
        Self::new(Self::DEFAULT_M, Self::DEFAULT_EF_CONSTRUCTION)
    }
}

/// Durable description of a collection.
///
/// Everything here is fixed at creation except `capacity`, which may only
/// grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection identifier.
    pub id: CollectionId,
    /// Number of components in every vector.
    pub dimension: usize,
    /// Distance metric.
    pub metric: Metric,
    /// Maximum number of handles the index accepts.
    pub capacity: usize,
    /// Index build parameters.
    pub build: BuildParams,
    /// When the collection was created.
    pub created_at: DateTime<Utc>,
}

impl CollectionConfig {
    /// Default capacity bound.
    pub const DEFAULT_CAPACITY: usize = 10_000;

    /// Describe a new collection with a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the dimension, capacity or any
    /// build parameter is zero.
    pub fn new(
        dimension: usize,
        metric: Metric,
        capacity: usize,
        build: BuildParams,
    ) -> Result<Self, CoreError> {
        if dimension == 0 {
            return Err(CoreError::Validation("dimension must be positive".into()));
        }
        if capacity == 0 {
            return Err(CoreError::Validation("capacity must be positive".into()));
        }
        if build.m < 2 {
            return Err(CoreError::Validation("m must be at least 2".into()));
        }
        if build.ef_construction == 0 {
            return Err(CoreError::Validation("ef_construction must be positive".into()));
        }
        Ok(Self {
            id: CollectionId::generate(),
            dimension,
            metric,
            capacity,
            build,
            created_at: Utc::now(),
        })
    }

    /// Raise the capacity bound.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if `capacity` is below the current bound.
    pub fn grow(&mut self, capacity: usize) -> Result<(), CoreError> {
        if capacity < self.capacity {
            return Err(CoreError::Validation(format!(
                "capacity can only grow (current {}, requested {capacity})",
                self.capacity
            )));
        }
        self.capacity = capacity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimension() {
        let err = CollectionConfig::new(0, Metric::Cosine, 10, BuildParams::default());
        assert!(matches!(err, Err(CoreError::Validation(_))));
    }

    #[test]
    fn fresh_configs_get_distinct_ids() {
        let a = CollectionConfig::new(3, Metric::SquaredEuclidean, 100, BuildParams::default())
            .expect("config a");
        let b = CollectionConfig::new(3, Metric::SquaredEuclidean, 100, BuildParams::default())
            .expect("config b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn capacity_only_grows() {
        let mut cfg = CollectionConfig::new(3, Metric::Cosine, 100, BuildParams::default())
            .expect("config");
        assert!(cfg.grow(50).is_err());
        cfg.grow(500).expect("grow");
        assert_eq!(cfg.capacity, 500);
    }
}
