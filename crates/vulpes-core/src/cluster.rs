//! Series clustering: pairwise distance matrices and DBSCAN.
//!
//! Used to group series with similar shapes before model selection. The
//! distance matrix is symmetric with a zero diagonal; DBSCAN consumes
//! any such matrix, so callers can plug in feature-space or raw-series
//! distances interchangeably.

use crate::error::{ForecastError, Result};
use crate::numeric;

/// Distance metric for series comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// Euclidean distance on the raw values
    #[default]
    Euclidean,
    /// Euclidean distance after per-series z-scoring (shape distance)
    ZNormalizedEuclidean,
    /// One minus the Pearson correlation
    Correlation,
}

/// Symmetric, zero-diagonal pairwise distances over N series.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    n: usize,
    /// Row-major `n × n` storage.
    distances: Vec<f64>,
}

impl DistanceMatrix {
    /// Number of series.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Distance between series `i` and `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.distances[i * self.n + j]
    }

    /// Build from explicit entries, validating symmetry, zero diagonal
    /// and finiteness.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = rows.len();
        let mut distances = vec![0.0; n * n];
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(ForecastError::InvalidInput(format!(
                    "row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    n
                )));
            }
            for (j, &d) in row.iter().enumerate() {
                if !d.is_finite() {
                    return Err(ForecastError::InvalidInput(format!(
                        "non-finite distance at ({i}, {j})"
                    )));
                }
                if i == j && d != 0.0 {
                    return Err(ForecastError::InvalidInput(format!(
                        "non-zero diagonal at {i}"
                    )));
                }
                if (d - rows[j][i]).abs() > 1e-9 {
                    return Err(ForecastError::InvalidInput(format!(
                        "asymmetric distances at ({i}, {j})"
                    )));
                }
                distances[i * n + j] = d;
            }
        }
        Ok(Self { n, distances })
    }

    /// Compute pairwise distances over equal-length series.
    pub fn compute(series: &[Vec<f64>], metric: DistanceMetric) -> Result<Self> {
        let n = series.len();
        if n == 0 {
            return Ok(Self {
                n: 0,
                distances: vec![],
            });
        }
        let len = series[0].len();
        if len == 0 {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        for (i, s) in series.iter().enumerate() {
            if s.len() != len {
                return Err(ForecastError::InvalidInput(format!(
                    "series {} has length {}, expected {}",
                    i,
                    s.len(),
                    len
                )));
            }
        }

        // Pre-normalize where the metric calls for it.
        let prepared: Vec<Vec<f64>> = match metric {
            DistanceMetric::Euclidean => series.to_vec(),
            DistanceMetric::ZNormalizedEuclidean => series
                .iter()
                .map(|s| {
                    let mean = numeric::mean(s);
                    let std = numeric::variance(s).sqrt().max(1e-12);
                    s.iter().map(|v| (v - mean) / std).collect()
                })
                .collect(),
            DistanceMetric::Correlation => series.to_vec(),
        };

        let mut distances = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = match metric {
                    DistanceMetric::Euclidean | DistanceMetric::ZNormalizedEuclidean => {
                        euclidean(&prepared[i], &prepared[j])
                    }
                    DistanceMetric::Correlation => {
                        let r = pearson(&prepared[i], &prepared[j]);
                        if r.is_finite() {
                            1.0 - r
                        } else {
                            // Constant series have no correlation; treat
                            // identical constants as coincident.
                            if prepared[i] == prepared[j] {
                                0.0
                            } else {
                                2.0
                            }
                        }
                    }
                };
                if !d.is_finite() {
                    return Err(ForecastError::NumericalFailure(format!(
                        "non-finite distance between series {i} and {j}"
                    )));
                }
                distances[i * n + j] = d;
                distances[j * n + i] = d;
            }
        }

        Ok(Self { n, distances })
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let mean_a = numeric::mean(a);
    let mean_b = numeric::mean(b);
    let mut num = 0.0;
    let mut da = 0.0;
    let mut db = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        num += (x - mean_a) * (y - mean_b);
        da += (x - mean_a) * (x - mean_a);
        db += (y - mean_b) * (y - mean_b);
    }
    if da <= 0.0 || db <= 0.0 {
        return f64::NAN;
    }
    num / (da * db).sqrt()
}

/// Configuration for DBSCAN over a distance matrix.
#[derive(Debug, Clone)]
pub struct DbscanConfig {
    /// Neighborhood radius.
    pub epsilon: f64,
    /// Minimum neighborhood size (the point itself counts) for a core
    /// point.
    pub min_points: usize,
}

impl DbscanConfig {
    pub fn new(epsilon: f64, min_points: usize) -> Result<Self> {
        if !(epsilon > 0.0) || !epsilon.is_finite() {
            return Err(ForecastError::invalid_parameter(
                "epsilon",
                epsilon,
                "must be positive and finite",
            ));
        }
        if min_points < 1 {
            return Err(ForecastError::invalid_parameter(
                "min_points",
                min_points,
                "must be at least 1",
            ));
        }
        Ok(Self {
            epsilon,
            min_points,
        })
    }
}

/// DBSCAN cluster assignment.
#[derive(Debug, Clone)]
pub struct DbscanResult {
    /// Cluster label per point; `None` marks noise.
    pub labels: Vec<Option<usize>>,
    /// Number of clusters found.
    pub n_clusters: usize,
    /// Number of noise points.
    pub n_noise: usize,
}

/// Run DBSCAN over a precomputed distance matrix.
pub fn dbscan(matrix: &DistanceMatrix, config: &DbscanConfig) -> Result<DbscanResult> {
    let n = matrix.len();
    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut cluster = 0usize;

    let region_query = |point: usize| -> Vec<usize> {
        (0..n)
            .filter(|&other| matrix.get(point, other) <= config.epsilon)
            .collect()
    };

    for point in 0..n {
        if visited[point] {
            continue;
        }
        visited[point] = true;

        let seed = region_query(point);
        if seed.len() < config.min_points {
            continue; // noise unless later absorbed by a cluster
        }

        // Expand a new cluster from this core point, growing the
        // worklist as further core points turn up.
        labels[point] = Some(cluster);
        let mut worklist: Vec<usize> = seed;
        let mut head = 0;
        while head < worklist.len() {
            let current = worklist[head];
            head += 1;

            if labels[current].is_none() {
                labels[current] = Some(cluster);
            }
            if visited[current] {
                continue;
            }
            visited[current] = true;

            let expansion = region_query(current);
            if expansion.len() >= config.min_points {
                for candidate in expansion {
                    if !worklist.contains(&candidate) {
                        worklist.push(candidate);
                    }
                }
            }
        }
        cluster += 1;
    }

    let n_noise = labels.iter().filter(|l| l.is_none()).count();
    Ok(DbscanResult {
        labels,
        n_clusters: cluster,
        n_noise,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_matrix_properties() {
        let series = vec![
            vec![1.0, 2.0, 3.0],
            vec![1.0, 2.0, 4.0],
            vec![10.0, 10.0, 10.0],
        ];
        let matrix = DistanceMatrix::compute(&series, DistanceMetric::Euclidean).unwrap();
        for i in 0..3 {
            assert_eq!(matrix.get(i, i), 0.0);
            for j in 0..3 {
                assert_relative_eq!(matrix.get(i, j), matrix.get(j, i));
                assert!(matrix.get(i, j).is_finite());
            }
        }
        assert_relative_eq!(matrix.get(0, 1), 1.0);
    }

    #[test]
    fn test_from_rows_validation() {
        assert!(DistanceMatrix::from_rows(vec![
            vec![0.0, 1.0],
            vec![2.0, 0.0],
        ])
        .is_err());
        assert!(DistanceMatrix::from_rows(vec![
            vec![1.0, 1.0],
            vec![1.0, 0.0],
        ])
        .is_err());
        assert!(DistanceMatrix::from_rows(vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
        ])
        .is_ok());
    }

    #[test]
    fn test_dbscan_identical_points_one_cluster() {
        // 100 identical series: all pairwise distances are zero, so
        // epsilon 0.7 and min_points 2 must produce a single cluster.
        let series = vec![vec![5.0; 10]; 100];
        let matrix = DistanceMatrix::compute(&series, DistanceMetric::Euclidean).unwrap();
        let result = dbscan(&matrix, &DbscanConfig::new(0.7, 2).unwrap()).unwrap();
        assert_eq!(result.n_clusters, 1);
        assert_eq!(result.n_noise, 0);
        assert!(result.labels.iter().all(|l| *l == Some(0)));
    }

    #[test]
    fn test_dbscan_two_groups_and_noise() {
        let mut series: Vec<Vec<f64>> = Vec::new();
        for k in 0..5 {
            series.push(vec![0.0 + 0.01 * k as f64; 8]);
        }
        for k in 0..5 {
            series.push(vec![100.0 + 0.01 * k as f64; 8]);
        }
        series.push(vec![50.0; 8]); // isolated
        let matrix = DistanceMatrix::compute(&series, DistanceMetric::Euclidean).unwrap();
        let result = dbscan(&matrix, &DbscanConfig::new(1.0, 3).unwrap()).unwrap();
        assert_eq!(result.n_clusters, 2);
        assert_eq!(result.n_noise, 1);
        assert!(result.labels[10].is_none());
        assert_ne!(result.labels[0], result.labels[5]);
    }

    #[test]
    fn test_znormalized_shape_distance() {
        // Same shape at different scales collapses under z-normalization.
        let a: Vec<f64> = (0..20).map(|i| (i as f64 * 0.4).sin()).collect();
        let b: Vec<f64> = a.iter().map(|v| 100.0 + 50.0 * v).collect();
        let matrix =
            DistanceMatrix::compute(&[a, b].to_vec(), DistanceMetric::ZNormalizedEuclidean)
                .unwrap();
        assert!(matrix.get(0, 1) < 1e-6, "distance {}", matrix.get(0, 1));
    }

    #[test]
    fn test_invalid_config() {
        assert!(DbscanConfig::new(0.0, 2).is_err());
        assert!(DbscanConfig::new(1.0, 0).is_err());
    }
}
