#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Cluster validity indices and a k-means clustering model.
//!
//! Every index implements [`merkwahl_core::Evaluator`] and normalizes its raw
//! value so that larger is better and values of different indices can be
//! averaged. A clustering with fewer than two clusters, or with one cluster
//! per sample, makes the indices undefined; they then report
//! [`IndexValue::undefined`](merkwahl_core::IndexValue::undefined).

use merkwahl_core::Evaluator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod kmeans;
pub mod validity;

pub use kmeans::{KMeans, KMeansFit};
pub use validity::{CalinskiHarabasz, DaviesBouldin, Dunn, Silhouette};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("got {found} labels for {expected} samples")]
    LabelMismatch { expected: usize, found: usize },
    #[error("cannot form {requested} clusters from {samples} samples")]
    InvalidClusterCount { requested: usize, samples: usize },
    #[error("unknown validity index: {0}")]
    UnknownIndex(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Names of the available validity indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexKind {
    Silhouette,
    DaviesBouldin,
    CalinskiHarabasz,
    Dunn,
}

impl IndexKind {
    #[must_use]
    pub fn all() -> [IndexKind; 4] {
        [
            Self::Silhouette,
            Self::DaviesBouldin,
            Self::CalinskiHarabasz,
            Self::Dunn,
        ]
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Silhouette => "silhouette",
            Self::DaviesBouldin => "davies-bouldin",
            Self::CalinskiHarabasz => "calinski-harabasz",
            Self::Dunn => "dunn",
        }
    }

    #[must_use]
    pub fn build(self) -> Box<dyn Evaluator> {
        match self {
            Self::Silhouette => Box::new(Silhouette),
            Self::DaviesBouldin => Box::new(DaviesBouldin),
            Self::CalinskiHarabasz => Box::new(CalinskiHarabasz),
            Self::Dunn => Box::new(Dunn),
        }
    }
}

/// Builds one evaluator per kind, in the given order.
#[must_use]
pub fn build_all(kinds: &[IndexKind]) -> Vec<Box<dyn Evaluator>> {
    kinds.iter().map(|k| k.build()).collect()
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::all()
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| IndexError::UnknownIndex(s.to_string()))
    }
}
