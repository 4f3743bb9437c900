//! Post-filters for query results.

use std::collections::HashSet;

use meshvec_core::VectorHandle;
use serde::{Deserialize, Serialize};

use crate::distance::{dot_product, l2_norm};

/// A predicate applied to each query result and its stored vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Keep vectors whose L2 norm lies in `[min, max]`. Open ends are unbounded.
    NormRange {
        /// Lower bound, inclusive.
        min: Option<f32>,
        /// Upper bound, inclusive.
        max: Option<f32>,
    },
    /// Keep vectors whose dot product with `reference` is at least `threshold`.
    DotProductAtLeast {
        /// Vector to compare against.
        reference: Vec<f32>,
        /// Minimum dot product.
        threshold: f32,
    },
    /// Keep only these handles.
    Handles(HashSet<VectorHandle>),
}

impl Filter {
    /// Whether a result passes this filter.
    #[must_use]
    pub fn accepts(&self, handle: VectorHandle, vector: &[f32]) -> bool {
        match self {
            Self::NormRange { min, max } => {
                let norm = l2_norm(vector);
                min.map_or(true, |m| norm >= m) && max.map_or(true, |m| norm <= m)
            }
            Self::DotProductAtLeast { reference, threshold } => {
                reference.len() == vector.len() && dot_product(reference, vector) >= *threshold
            }
            Self::Handles(allowed) => allowed.contains(&handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_range() {
        let f = Filter::NormRange { min: Some(1.0), max: Some(2.0) };
        let h = VectorHandle::new(0);
        assert!(f.accepts(h, &[1.0, 1.0]));
        assert!(!f.accepts(h, &[0.1, 0.1]));
        assert!(!f.accepts(h, &[3.0, 0.0]));
        assert!(Filter::NormRange { min: None, max: None }.accepts(h, &[100.0]));
    }

    #[test]
    fn test_dot_product() {
        let f = Filter::DotProductAtLeast { reference: vec![1.0, 0.0], threshold: 0.5 };
        let h = VectorHandle::new(0);
        assert!(f.accepts(h, &[0.9, 0.1]));
        assert!(!f.accepts(h, &[0.1, 0.9]));
        assert!(!f.accepts(h, &[1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_handles() {
        let f = Filter::Handles([VectorHandle::new(3)].into_iter().collect());
        assert!(f.accepts(VectorHandle::new(3), &[]));
        assert!(!f.accepts(VectorHandle::new(4), &[]));
    }
}
