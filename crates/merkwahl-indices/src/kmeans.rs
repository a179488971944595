//! Seeded k-means (k-means++ initialisation, Lloyd iterations).

use crate::validity::{euclidean, squared_euclidean};
use crate::{IndexError, Result};
use merkwahl_core::{BoxError, ClusteringModel, FeatureTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const DEFAULT_CLUSTERS: usize = 3;
const DEFAULT_MAX_ITER: usize = 300;
const DEFAULT_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeans {
    pub n_clusters: usize,
    pub max_iter: usize,
    /// Largest centroid shift at which iteration stops.
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            n_clusters: DEFAULT_CLUSTERS,
            max_iter: DEFAULT_MAX_ITER,
            tolerance: DEFAULT_TOLERANCE,
            seed: 0,
        }
    }
}

/// Result of [`KMeans::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub iterations: usize,
    /// Sum of squared distances of samples to their centroid.
    pub inertia: f64,
}

impl KMeans {
    #[must_use]
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn fit(&self, table: &FeatureTable) -> Result<KMeansFit> {
        let n = table.n_samples();
        if self.n_clusters == 0 || self.n_clusters > n {
            return Err(IndexError::InvalidClusterCount {
                requested: self.n_clusters,
                samples: n,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = self.plus_plus(table, &mut rng);
        let mut labels = assign(table, &centroids);
        let mut iterations = 0;

        while iterations < self.max_iter {
            iterations += 1;
            let updated = update(table, &labels, &centroids);
            let shift = centroids
                .iter()
                .zip(&updated)
                .map(|(old, new)| euclidean(old, new))
                .fold(0.0, f64::max);
            centroids = updated;
            labels = assign(table, &centroids);
            if shift <= self.tolerance {
                break;
            }
        }

        let inertia = labels
            .iter()
            .enumerate()
            .map(|(i, &l)| squared_euclidean(table.row(i), &centroids[l]))
            .sum();
        Ok(KMeansFit {
            labels,
            centroids,
            iterations,
            inertia,
        })
    }

    /// k-means++: each further centre is drawn with probability proportional
    /// to the squared distance to the nearest centre chosen so far.
    fn plus_plus(&self, table: &FeatureTable, rng: &mut StdRng) -> Vec<Vec<f64>> {
        let n = table.n_samples();
        let mut centroids = vec![table.row(rng.gen_range(0..n)).to_vec()];
        let mut nearest: Vec<f64> = table
            .rows()
            .map(|row| squared_euclidean(row, &centroids[0]))
            .collect();

        while centroids.len() < self.n_clusters {
            let total: f64 = nearest.iter().sum();
            let pick = if total > 0.0 {
                let mut target = rng.gen::<f64>() * total;
                let mut chosen = n - 1;
                for (i, &w) in nearest.iter().enumerate() {
                    if target < w {
                        chosen = i;
                        break;
                    }
                    target -= w;
                }
                chosen
            } else {
                rng.gen_range(0..n)
            };

            let centre = table.row(pick).to_vec();
            for (d, row) in nearest.iter_mut().zip(table.rows()) {
                *d = d.min(squared_euclidean(row, &centre));
            }
            centroids.push(centre);
        }
        centroids
    }
}

/// Nearest centroid per sample; ties go to the lower index.
fn assign(table: &FeatureTable, centroids: &[Vec<f64>]) -> Vec<usize> {
    table
        .rows()
        .map(|row| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (idx, c) in centroids.iter().enumerate() {
                let d = squared_euclidean(row, c);
                if d < best_dist {
                    best = idx;
                    best_dist = d;
                }
            }
            best
        })
        .collect()
}

/// Mean of assigned samples; an empty cluster keeps its previous centroid.
fn update(table: &FeatureTable, labels: &[usize], previous: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut sums = vec![vec![0.0; table.n_features()]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (row, &label) in table.rows().zip(labels) {
        counts[label] += 1;
        for (acc, v) in sums[label].iter_mut().zip(row) {
            *acc += v;
        }
    }
    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, count), prev)| {
            if count == 0 {
                prev.clone()
            } else {
                #[allow(clippy::cast_precision_loss)]
                let n = count as f64;
                sum.into_iter().map(|v| v / n).collect()
            }
        })
        .collect()
}

impl ClusteringModel for KMeans {
    fn fit_predict(&mut self, features: &FeatureTable) -> std::result::Result<Vec<usize>, BoxError> {
        Ok(self.fit(features)?.labels)
    }

    fn reseed(&mut self, seed: u64) {
        self.seed = seed;
    }
}
