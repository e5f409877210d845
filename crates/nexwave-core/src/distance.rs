//! Distance and similarity primitives over raw descriptor slices.
//!
//! Both functions are total: malformed input maps to a defined non-match
//! value instead of an error, so one bad descriptor cannot abort a whole
//! matching pass.

/// Euclidean distance between two equal-length vectors.
///
/// Returns `f32::INFINITY` when either vector is empty or the lengths differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return f32::INFINITY;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Cosine similarity in [-1, 1].
///
/// Returns 0 when the lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical_is_zero() {
        let a = [0.3, -0.2, 0.9];
        assert_eq!(euclidean_distance(&a, &a), 0.0);
    }

    #[test]
    fn test_distance_three_four_five() {
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_length_mismatch_is_infinite() {
        assert_eq!(euclidean_distance(&[1.0, 0.0], &[1.0, 0.0, 0.0]), f32::INFINITY);
    }

    #[test]
    fn test_distance_empty_is_infinite() {
        assert_eq!(euclidean_distance(&[], &[]), f32::INFINITY);
        assert_eq!(euclidean_distance(&[], &[1.0]), f32::INFINITY);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
