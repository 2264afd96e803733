//! K-means clustering
//!
//! k-means++ seeding with a fixed seed, Lloyd iterations until assignments
//! stop changing. A cluster that loses all members is re-seeded with the row
//! farthest from its current centroid.

use crate::error::EngineError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Distance between a row and a centroid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    /// `1 - cos(x, c)`, for text vectors
    Cosine,
    /// Euclidean distance, for numeric vectors
    Euclid,
}

impl Distance {
    /// Distance between two vectors
    #[must_use]
    pub fn between(self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self {
            Self::Euclid => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
            Self::Cosine => {
                let norm_a = a.dot(&a).sqrt();
                let norm_b = b.dot(&b).sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - a.dot(&b) / (norm_a * norm_b)
            }
        }
    }
}

/// Options for [`kmeans`]
#[derive(Debug, Clone)]
pub struct KMeansOptions {
    /// Number of clusters
    pub k: usize,
    /// Distance measure
    pub distance: Distance,
    /// Iteration cap
    pub max_iterations: usize,
    /// Seeding RNG seed
    pub seed: u64,
}

impl KMeansOptions {
    /// Options with defaults for everything but `k` and the distance
    #[must_use]
    pub fn new(k: usize, distance: Distance) -> Self {
        Self {
            k,
            distance,
            max_iterations: 100,
            seed: 42,
        }
    }
}

/// Fitted clustering
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// One centroid per row
    pub centroids: Array2<f64>,
    /// Cluster of every input row
    pub assignments: Vec<usize>,
    /// Distance of every input row to its centroid
    pub distances: Vec<f64>,
    /// Iterations run
    pub iterations: usize,
}

impl KMeansModel {
    /// Rows assigned to `cluster`
    #[must_use]
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.assignments
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == cluster)
            .map(|(row, _)| row)
            .collect()
    }
}

/// Cluster the rows of `data`
///
/// # Errors
/// - `EngineError::EmptyInput` if `data` has no rows
/// - `EngineError::InvalidParameter` if `k` is zero or exceeds the row count
pub fn kmeans(data: &Array2<f64>, options: &KMeansOptions) -> Result<KMeansModel, EngineError> {
    let rows = data.nrows();
    if rows == 0 {
        return Err(EngineError::EmptyInput);
    }
    if options.k == 0 || options.k > rows {
        return Err(EngineError::InvalidParameter(format!(
            "k must be between 1 and {rows}, got {}",
            options.k
        )));
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut centroids = seed_centroids(data, options, &mut rng);
    let mut assignments = vec![usize::MAX; rows];
    let mut distances = vec![0.0; rows];
    let mut iterations = 0;

    while iterations < options.max_iterations {
        iterations += 1;
        let mut changed = false;
        for (row, point) in data.axis_iter(Axis(0)).enumerate() {
            let (cluster, distance) = nearest(point, &centroids, options.distance);
            if assignments[row] != cluster {
                assignments[row] = cluster;
                changed = true;
            }
            distances[row] = distance;
        }
        if !changed {
            break;
        }

        let mut sums = Array2::<f64>::zeros(centroids.dim());
        let mut counts = vec![0usize; options.k];
        for (row, point) in data.axis_iter(Axis(0)).enumerate() {
            let cluster = assignments[row];
            counts[cluster] += 1;
            let mut sum = sums.row_mut(cluster);
            sum += &point;
        }
        for cluster in 0..options.k {
            if counts[cluster] == 0 {
                let farthest = farthest_row(&distances);
                centroids.row_mut(cluster).assign(&data.row(farthest));
                distances[farthest] = 0.0;
            } else {
                let mean = &sums.row(cluster) / counts[cluster] as f64;
                centroids.row_mut(cluster).assign(&mean);
            }
        }
    }

    Ok(KMeansModel {
        centroids,
        assignments,
        distances,
        iterations,
    })
}

fn seed_centroids(data: &Array2<f64>, options: &KMeansOptions, rng: &mut StdRng) -> Array2<f64> {
    let rows = data.nrows();
    let mut centroids = Array2::zeros((options.k, data.ncols()));
    let first = rng.random_range(0..rows);
    centroids.row_mut(0).assign(&data.row(first));

    let mut closest: Array1<f64> = data
        .axis_iter(Axis(0))
        .map(|p| options.distance.between(p, centroids.row(0)).powi(2))
        .collect();

    for cluster in 1..options.k {
        let total: f64 = closest.sum();
        let pick = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = rows - 1;
            for (row, &d) in closest.iter().enumerate() {
                if target < d {
                    chosen = row;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.random_range(0..rows)
        };
        centroids.row_mut(cluster).assign(&data.row(pick));
        for (row, point) in data.axis_iter(Axis(0)).enumerate() {
            let d = options.distance.between(point, centroids.row(cluster)).powi(2);
            if d < closest[row] {
                closest[row] = d;
            }
        }
    }
    centroids
}

fn nearest(point: ArrayView1<'_, f64>, centroids: &Array2<f64>, distance: Distance) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (cluster, centroid) in centroids.axis_iter(Axis(0)).enumerate() {
        let d = distance.between(point, centroid);
        if d < best.1 {
            best = (cluster, d);
        }
    }
    best
}

fn farthest_row(distances: &[f64]) -> usize {
    distances
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (row, &d)| if d > best.1 { (row, d) } else { best })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
        ]
    }

    #[test]
    fn separates_two_blobs() {
        let model = kmeans(&two_blobs(), &KMeansOptions::new(2, Distance::Euclid)).unwrap();
        let a = model.assignments[0];
        assert!(model.assignments[..3].iter().all(|&c| c == a));
        assert!(model.assignments[3..].iter().all(|&c| c != a));
        assert_eq!(model.members(a), vec![0, 1, 2]);
        assert!(model.distances.iter().all(|&d| d < 1.0));
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let options = KMeansOptions::new(2, Distance::Euclid);
        let first = kmeans(&two_blobs(), &options).unwrap();
        let second = kmeans(&two_blobs(), &options).unwrap();
        assert_eq!(first.assignments, second.assignments);
    }

    #[test]
    fn rejects_bad_k() {
        let data = two_blobs();
        assert!(kmeans(&data, &KMeansOptions::new(0, Distance::Euclid)).is_err());
        assert!(kmeans(&data, &KMeansOptions::new(7, Distance::Euclid)).is_err());
        assert_eq!(
            kmeans(&Array2::zeros((0, 2)), &KMeansOptions::new(1, Distance::Euclid)).unwrap_err(),
            EngineError::EmptyInput
        );
    }

    #[test]
    fn cosine_groups_by_direction() {
        let data = array![[1.0, 0.0], [5.0, 0.1], [0.0, 1.0], [0.1, 3.0]];
        let model = kmeans(&data, &KMeansOptions::new(2, Distance::Cosine)).unwrap();
        assert_eq!(model.assignments[0], model.assignments[1]);
        assert_eq!(model.assignments[2], model.assignments[3]);
        assert_ne!(model.assignments[0], model.assignments[2]);
    }

    #[test]
    fn cosine_distance_of_zero_vector_is_one() {
        let zero = array![0.0, 0.0];
        let x = array![1.0, 0.0];
        assert_eq!(Distance::Cosine.between(zero.view(), x.view()), 1.0);
        assert!(Distance::Cosine.between(x.view(), x.view()).abs() < 1e-12);
    }
}
