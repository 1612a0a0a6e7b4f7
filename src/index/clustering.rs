//! K-means clustering for the inverted-file index.
//!
//! Pure Rust K-means over cosine similarity with K-means++ initialization.
//! Centroids are kept unit-normalized so inner product against them is a
//! valid similarity.
//!
//! # Algorithm Details
//! - Distance metric: cosine similarity (not Euclidean)
//! - Initialization: K-means++ for better convergence
//! - Max iterations: 100
//! - Convergence tolerance: 1e-4

use crate::error::IndexError;
use rand::Rng;

/// Maximum number of iterations for K-means clustering.
const MAX_ITERATIONS: usize = 100;

/// Convergence tolerance for centroid updates.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Result of a K-means clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster centroids, unit-normalized, same dimension as the input.
    pub centroids: Vec<Vec<f32>>,

    /// Cluster index for each input vector.
    pub assignments: Vec<usize>,

    /// Iterations until convergence.
    pub iterations: usize,
}

/// Computes the inner product of two vectors.
///
/// Over unit-normalized vectors this equals cosine similarity. The index
/// layer guarantees normalization, so no per-call renormalization happens
/// here.
#[must_use]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Normalizes a vector in-place to unit length.
///
/// A vector with near-zero norm is left as-is; callers treat zero-norm
/// vectors as "no embedding available".
pub fn normalize_in_place(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Creates a unit-normalized copy of a vector.
#[must_use]
pub fn normalized_copy(vector: &[f32]) -> Vec<f32> {
    let mut normalized = vector.to_vec();
    normalize_in_place(&mut normalized);
    normalized
}

/// Finds the index of the nearest centroid by inner product.
#[must_use]
pub fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best_similarity = f32::NEG_INFINITY;
    let mut best = 0;
    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = inner_product(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best = i;
        }
    }
    best
}

/// Performs K-means clustering on unit vectors.
///
/// # Arguments
/// * `vectors` - Input vectors (non-empty, same dimension, unit norm)
/// * `k` - Number of clusters (1 ..= vectors.len())
///
/// # Algorithm
/// 1. Initialize centroids with K-means++
/// 2. Iterate until convergence or max iterations:
///    - Assign each vector to its nearest centroid
///    - Recompute centroids as normalized means
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans(vectors: &[Vec<f32>], k: usize) -> Result<KMeansResult, IndexError> {
    if vectors.is_empty() {
        return Err(IndexError::ClusteringFailed(
            "empty vector set".to_string(),
        ));
    }
    if k == 0 || k > vectors.len() {
        return Err(IndexError::ClusteringFailed(format!(
            "invalid cluster count {k} for {} vectors",
            vectors.len()
        )));
    }
    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(IndexError::ClusteringFailed(
            "mixed vector dimensions".to_string(),
        ));
    }

    let mut centroids = initialize_kmeans_plus_plus(vectors, k)?;
    let mut assignments = vec![0usize; vectors.len()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        let new_assignments: Vec<usize> = vectors
            .iter()
            .map(|vector| nearest_centroid(vector, &centroids))
            .collect();

        let converged = new_assignments == assignments;
        assignments = new_assignments;

        if converged || iterations >= MAX_ITERATIONS {
            break;
        }

        let new_centroids = update_centroids(vectors, &assignments, k, dimension);
        let movement = centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if movement < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

fn update_centroids(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    k: usize,
    dimension: usize,
) -> Vec<Vec<f32>> {
    let mut centroids = vec![vec![0.0; dimension]; k];
    let mut sizes = vec![0usize; k];

    for (vector, &cluster) in vectors.iter().zip(assignments.iter()) {
        for (i, &value) in vector.iter().enumerate() {
            centroids[cluster][i] += value;
        }
        sizes[cluster] += 1;
    }

    for (centroid, &size) in centroids.iter_mut().zip(sizes.iter()) {
        if size == 0 {
            // Empty cluster: reseed from a random input vector
            let random_idx = rand::rng().random_range(0..vectors.len());
            *centroid = normalized_copy(&vectors[random_idx]);
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
            normalize_in_place(centroid);
        }
    }

    centroids
}

/// K-means++ initialization: pick centroids far apart for better
/// convergence than random seeding.
fn initialize_kmeans_plus_plus(
    vectors: &[Vec<f32>],
    k: usize,
) -> Result<Vec<Vec<f32>>, IndexError> {
    let mut rng = rand::rng();
    let mut centroids = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(normalized_copy(&vectors[first_idx]));

    for _ in 1..k {
        let mut distances = vec![0.0f32; vectors.len()];
        let mut total = 0.0f32;

        for (i, vector) in vectors.iter().enumerate() {
            let mut min_distance = f32::MAX;
            for centroid in &centroids {
                let distance = 1.0 - inner_product(vector, centroid);
                min_distance = min_distance.min(distance);
            }
            distances[i] = min_distance * min_distance;
            total += distances[i];
        }

        if total < EPSILON {
            // All points coincide with existing centroids; pad with copies
            // of the first centroid so callers still get k clusters
            while centroids.len() < k {
                centroids.push(centroids[0].clone());
            }
            break;
        }

        let target = rng.random::<f32>() * total;
        let mut cumulative = 0.0;
        let mut added = false;
        for (i, &distance) in distances.iter().enumerate() {
            cumulative += distance;
            if cumulative >= target {
                centroids.push(normalized_copy(&vectors[i]));
                added = true;
                break;
            }
        }
        if !added {
            centroids.push(normalized_copy(&vectors[vectors.len() - 1]));
        }
    }

    if centroids.len() != k {
        return Err(IndexError::ClusteringFailed(
            "centroid initialization failed".to_string(),
        ));
    }
    Ok(centroids)
}

fn centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| 1.0 - inner_product(old_c, new_c))
        .sum::<f32>()
        / old.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_product() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((inner_product(&a, &a) - 1.0).abs() < f32::EPSILON);

        let b = vec![0.0, 1.0, 0.0];
        assert!((inner_product(&a, &b)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_normalize_in_place() {
        let mut vector = vec![3.0, 4.0];
        normalize_in_place(&mut vector);
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < f32::EPSILON);
        assert!((vector[0] - 0.6).abs() < f32::EPSILON);
        assert!((vector[1] - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut vector = vec![0.0, 0.0];
        normalize_in_place(&mut vector);
        assert_eq!(vector, vec![0.0, 0.0]);
    }

    #[test]
    fn test_nearest_centroid() {
        let centroids = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        assert_eq!(nearest_centroid(&[0.9, 0.1, 0.0], &centroids), 0);
        assert_eq!(nearest_centroid(&[0.1, 0.9, 0.1], &centroids), 1);
        assert_eq!(nearest_centroid(&[0.0, 0.1, 0.9], &centroids), 2);
    }

    #[test]
    fn test_kmeans_separates_clear_clusters() {
        let vectors: Vec<Vec<f32>> = vec![
            normalized_copy(&[1.0, 0.1, 0.0]),
            normalized_copy(&[0.9, 0.2, 0.1]),
            normalized_copy(&[1.1, 0.0, 0.2]),
            normalized_copy(&[0.1, 1.0, 0.0]),
            normalized_copy(&[0.2, 0.9, 0.1]),
            normalized_copy(&[0.0, 1.1, 0.2]),
            normalized_copy(&[0.0, 0.1, 1.0]),
            normalized_copy(&[0.1, 0.2, 0.9]),
            normalized_copy(&[0.2, 0.0, 1.1]),
        ];

        let result = kmeans(&vectors, 3).unwrap();
        assert_eq!(result.centroids.len(), 3);
        assert_eq!(result.assignments.len(), 9);

        assert_eq!(result.assignments[0], result.assignments[1]);
        assert_eq!(result.assignments[1], result.assignments[2]);
        assert_eq!(result.assignments[3], result.assignments[4]);
        assert_eq!(result.assignments[4], result.assignments[5]);
        assert_eq!(result.assignments[6], result.assignments[7]);
        assert_eq!(result.assignments[7], result.assignments[8]);
    }

    #[test]
    fn test_kmeans_edge_cases() {
        let empty: Vec<Vec<f32>> = vec![];
        assert!(kmeans(&empty, 1).is_err());

        let vectors = vec![vec![1.0, 0.0]];
        assert!(kmeans(&vectors, 0).is_err());
        assert!(kmeans(&vectors, 2).is_err());

        let mixed = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        assert!(kmeans(&mixed, 1).is_err());
    }

    #[test]
    fn test_single_cluster() {
        let vectors = vec![
            normalized_copy(&[1.0, 2.0, 3.0]),
            normalized_copy(&[4.0, 5.0, 6.0]),
            normalized_copy(&[7.0, 8.0, 9.0]),
        ];
        let result = kmeans(&vectors, 1).unwrap();
        assert_eq!(result.centroids.len(), 1);
        assert!(result.assignments.iter().all(|&c| c == 0));
    }
}
