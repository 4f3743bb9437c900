//! Build parameters of the HNSW graph.

use meshvec_core::BuildParams;
use serde::{Deserialize, Serialize};

/// Shape of an HNSW graph, fixed when the index is created.
///
/// Derived from a collection's [`BuildParams`]: the base layer allows twice
/// the degree of the upper layers, and node levels are drawn with a decay
/// of `1 / ln(m)`. Search breadth is not stored here; it comes with each
/// query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Neighbour limit on upper layers.
    pub m: usize,
    /// Neighbour limit on layer 0.
    pub m_layer0: usize,
    /// Candidate-list size while inserting.
    pub ef_construction: usize,
    /// Level decay factor.
    pub level_factor: f64,
}

impl HnswConfig {
    /// Graph with degree `m` (at least 2) and the default construction breadth.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(m: usize) -> Self {
        let m = m.max(2);
        Self {
            m,
            m_layer0: 2 * m,
            ef_construction: BuildParams::DEFAULT_EF_CONSTRUCTION,
            level_factor: (m as f64).ln().recip(),
        }
    }

    /// Use `ef` candidates while inserting. Zero is raised to one.
    #[must_use]
    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef.max(1);
        self
    }

    /// Neighbour limit for `layer`.
    #[must_use]
    pub const fn max_neighbours(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m_layer0
        } else {
            self.m
        }
    }
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self::from(BuildParams::default())
    }
}

impl From<BuildParams> for HnswConfig {
    fn from(params: BuildParams) -> Self {
        Self::new(params.m).with_ef_construction(params.ef_construction)
    }
}
