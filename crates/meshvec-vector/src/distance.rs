//! Distance functions for vector similarity.
//!
//! All metrics are expressed as distances: smaller is closer.

use meshvec_core::Metric;

/// Calculate the squared Euclidean (L2) distance between two vectors.
///
/// # Panics
///
/// Debug-panics if vectors have different lengths.
#[inline]
#[must_use]
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Calculate the dot product between two vectors.
///
/// # Panics
///
/// Debug-panics if vectors have different lengths.
#[inline]
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Calculate the L2 norm (magnitude) of a vector.
#[inline]
#[must_use]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Calculate the cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
#[inline]
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product(a, b) / (norm_a * norm_b)
}

/// Distance between two vectors under `metric`.
///
/// - squared Euclidean: `sum((a - b)^2)`
/// - cosine: `1 - cos(a, b)`
/// - inner product: `1 - dot(a, b)`
#[inline]
#[must_use]
pub fn distance(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::SquaredEuclidean => euclidean_distance_squared(a, b),
        Metric::Cosine => 1.0 - cosine_similarity(a, b),
        Metric::InnerProduct => 1.0 - dot_product(a, b),
    }
}

/// Unit-length copy of `v`. A zero vector is returned unchanged.
#[must_use]
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    fn assert_near(a: f32, b: f32) {
        assert!((a - b).abs() < EPSILON, "{a} != {b}");
    }

    #[test]
    fn test_squared_euclidean() {
        assert_near(distance(Metric::SquaredEuclidean, &[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]), 2.0);
        assert_near(distance(Metric::SquaredEuclidean, &[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_cosine() {
        assert_near(distance(Metric::Cosine, &[1.0, 0.0], &[2.0, 0.0]), 0.0);
        assert_near(distance(Metric::Cosine, &[1.0, 0.0], &[0.0, 1.0]), 1.0);
        assert_near(distance(Metric::Cosine, &[1.0, 0.0], &[-1.0, 0.0]), 2.0);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_near(distance(Metric::Cosine, &[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_inner_product() {
        assert_near(distance(Metric::InnerProduct, &[1.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_near(distance(Metric::InnerProduct, &[1.0, 2.0], &[3.0, 4.0]), -10.0);
    }

    #[test]
    fn test_normalize() {
        let n = normalize(&[3.0, 4.0]);
        assert_near(n[0], 0.6);
        assert_near(n[1], 0.8);
        assert_near(l2_norm(&n), 1.0);
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
