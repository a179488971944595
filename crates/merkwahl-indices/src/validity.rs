//! Internal validity indices: silhouette, Davies–Bouldin, Calinski–Harabasz, Dunn.
//!
//! All indices use Euclidean distances between rows of the table they are given.

use crate::{IndexError, Result};
use merkwahl_core::{BoxError, Evaluator, FeatureTable, IndexValue};
use std::collections::BTreeMap;

/// Raw Calinski–Harabasz value when all points coincide with their centroid.
const CALINSKI_HARABASZ_ZERO_DISPERSION: f64 = 1.0;

pub(crate) fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_euclidean(a, b).sqrt()
}

pub(crate) fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Sample indices grouped by label, ordered by label value.
fn group(table: &FeatureTable, labels: &[usize]) -> Result<Vec<Vec<usize>>> {
    if labels.len() != table.n_samples() {
        return Err(IndexError::LabelMismatch {
            expected: table.n_samples(),
            found: labels.len(),
        });
    }
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (sample, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(sample);
    }
    Ok(groups.into_values().collect())
}

/// Indices are undefined unless `2 <= k <= n - 1`.
fn is_degenerate(groups: &[Vec<usize>], n_samples: usize) -> bool {
    groups.len() < 2 || groups.len() >= n_samples
}

fn centroid(table: &FeatureTable, members: &[usize]) -> Vec<f64> {
    let mut sum = vec![0.0; table.n_features()];
    for &m in members {
        for (acc, v) in sum.iter_mut().zip(table.row(m)) {
            *acc += v;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let n = members.len() as f64;
    sum.iter_mut().for_each(|v| *v /= n);
    sum
}

fn mean_distance(table: &FeatureTable, sample: usize, members: &[usize]) -> f64 {
    let total: f64 = members
        .iter()
        .map(|&m| euclidean(table.row(sample), table.row(m)))
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let n = members.len() as f64;
    total / n
}

/// Shared entry point: groups labels, checks degeneracy, then computes.
fn evaluate_with(
    table: &FeatureTable,
    labels: &[usize],
    compute: impl Fn(&FeatureTable, &[Vec<usize>]) -> Option<(f64, f64)>,
) -> std::result::Result<IndexValue, BoxError> {
    let groups = group(table, labels)?;
    if is_degenerate(&groups, table.n_samples()) {
        return Ok(IndexValue::undefined());
    }
    Ok(compute(table, &groups).map_or_else(IndexValue::undefined, |(raw, normalized)| {
        IndexValue::new(raw, normalized)
    }))
}

/// Mean silhouette coefficient. Raw in `[-1, 1]`, normalized `(raw + 1) / 2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silhouette;

fn silhouette(table: &FeatureTable, groups: &[Vec<usize>]) -> Option<(f64, f64)> {
    let mut total = 0.0;
    for (own, members) in groups.iter().enumerate() {
        // singleton clusters contribute 0
        if members.len() < 2 {
            continue;
        }
        for &sample in members {
            let others: Vec<usize> = members.iter().copied().filter(|&m| m != sample).collect();
            let a = mean_distance(table, sample, &others);
            let b = groups
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != own)
                .map(|(_, other)| mean_distance(table, sample, other))
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 {
                total += (b - a) / denom;
            }
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let raw = total / table.n_samples() as f64;
    Some((raw, (raw + 1.0) / 2.0))
}

impl Evaluator for Silhouette {
    fn name(&self) -> &str {
        "silhouette"
    }

    fn evaluate(
        &self,
        features: &FeatureTable,
        labels: &[usize],
    ) -> std::result::Result<IndexValue, BoxError> {
        evaluate_with(features, labels, silhouette)
    }
}

/// Davies–Bouldin index. Lower is better; normalized `1 / (1 + raw)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaviesBouldin;

fn davies_bouldin(table: &FeatureTable, groups: &[Vec<usize>]) -> Option<(f64, f64)> {
    let centroids: Vec<Vec<f64>> = groups.iter().map(|g| centroid(table, g)).collect();
    let scatter: Vec<f64> = groups
        .iter()
        .zip(&centroids)
        .map(|(members, c)| {
            let total: f64 = members.iter().map(|&m| euclidean(table.row(m), c)).sum();
            #[allow(clippy::cast_precision_loss)]
            let n = members.len() as f64;
            total / n
        })
        .collect();

    let k = groups.len();
    let mut total = 0.0;
    for i in 0..k {
        let worst = (0..k)
            .filter(|&j| j != i)
            .map(|j| {
                let separation = euclidean(&centroids[i], &centroids[j]);
                // coinciding centroids are ignored
                if separation > 0.0 {
                    (scatter[i] + scatter[j]) / separation
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max);
        total += worst;
    }
    #[allow(clippy::cast_precision_loss)]
    let raw = total / k as f64;
    Some((raw, 1.0 / (1.0 + raw)))
}

impl Evaluator for DaviesBouldin {
    fn name(&self) -> &str {
        "davies-bouldin"
    }

    fn evaluate(
        &self,
        features: &FeatureTable,
        labels: &[usize],
    ) -> std::result::Result<IndexValue, BoxError> {
        evaluate_with(features, labels, davies_bouldin)
    }
}

/// Calinski–Harabasz variance ratio. Unbounded; normalized `raw / (1 + raw)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalinskiHarabasz;

fn calinski_harabasz(table: &FeatureTable, groups: &[Vec<usize>]) -> Option<(f64, f64)> {
    let all: Vec<usize> = (0..table.n_samples()).collect();
    let overall = centroid(table, &all);

    let mut between = 0.0;
    let mut within = 0.0;
    for members in groups {
        let c = centroid(table, members);
        #[allow(clippy::cast_precision_loss)]
        let size = members.len() as f64;
        between += size * squared_euclidean(&c, &overall);
        within += members
            .iter()
            .map(|&m| squared_euclidean(table.row(m), &c))
            .sum::<f64>();
    }

    #[allow(clippy::cast_precision_loss)]
    let (n, k) = (table.n_samples() as f64, groups.len() as f64);
    let raw = if within == 0.0 {
        CALINSKI_HARABASZ_ZERO_DISPERSION
    } else {
        between * (n - k) / (within * (k - 1.0))
    };
    Some((raw, raw / (1.0 + raw)))
}

impl Evaluator for CalinskiHarabasz {
    fn name(&self) -> &str {
        "calinski-harabasz"
    }

    fn evaluate(
        &self,
        features: &FeatureTable,
        labels: &[usize],
    ) -> std::result::Result<IndexValue, BoxError> {
        evaluate_with(features, labels, calinski_harabasz)
    }
}

/// Dunn index: smallest inter-cluster distance over largest cluster diameter.
/// Normalized `raw / (1 + raw)`; undefined when every cluster has zero diameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dunn;

fn dunn(table: &FeatureTable, groups: &[Vec<usize>]) -> Option<(f64, f64)> {
    let mut diameter: f64 = 0.0;
    for members in groups {
        for (pos, &a) in members.iter().enumerate() {
            for &b in &members[pos + 1..] {
                diameter = diameter.max(euclidean(table.row(a), table.row(b)));
            }
        }
    }
    if diameter == 0.0 {
        return None;
    }

    let mut separation = f64::INFINITY;
    for (i, left) in groups.iter().enumerate() {
        for right in &groups[i + 1..] {
            for &a in left {
                for &b in right {
                    separation = separation.min(euclidean(table.row(a), table.row(b)));
                }
            }
        }
    }

    let raw = separation / diameter;
    Some((raw, raw / (1.0 + raw)))
}

impl Evaluator for Dunn {
    fn name(&self) -> &str {
        "dunn"
    }

    fn evaluate(
        &self,
        features: &FeatureTable,
        labels: &[usize],
    ) -> std::result::Result<IndexValue, BoxError> {
        evaluate_with(features, labels, dunn)
    }
}
