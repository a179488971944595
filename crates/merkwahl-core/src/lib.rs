use serde::{Deserialize, Serialize};

pub mod table;

pub use table::{FeatureTable, TableError};

/// Fehlertyp, den externe Kollaborateure (Clustering, Indizes) liefern dürfen.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Ergebnis eines Validitätsindex: Rohwert und normalisierter Wert.
///
/// Nur `normalized` fließt in die Aggregation ein; ein nicht-endlicher
/// normalisierter Wert markiert ein degeneriertes Clustering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexValue {
    pub raw: f64,
    pub normalized: f64,
}

impl IndexValue {
    #[must_use]
    pub fn new(raw: f64, normalized: f64) -> Self {
        Self { raw, normalized }
    }

    /// Wert für ein mathematisch undefiniertes Clustering (z. B. nur ein Cluster).
    #[must_use]
    pub fn undefined() -> Self {
        Self {
            raw: f64::NAN,
            normalized: f64::NEG_INFINITY,
        }
    }

    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.normalized.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Improve,
    Safe,
    Stalled,
}

pub trait ClusteringModel {
    /// Fits on `features` and returns one label per sample.
    fn fit_predict(&mut self, features: &FeatureTable) -> Result<Vec<usize>, BoxError>;
    fn reseed(&mut self, _seed: u64) {}
}

pub trait Evaluator: Send {
    fn name(&self) -> &str;
    fn evaluate(&self, features: &FeatureTable, labels: &[usize]) -> Result<IndexValue, BoxError>;
}

pub trait StoppingDetector {
    fn update_metric(&mut self, value: f64) -> Verdict;
}

pub trait Environment {
    type Action;
    type Outcome;
    type Error;

    fn step(&mut self, action: Self::Action) -> Result<Self::Outcome, Self::Error>;
    fn observation_size(&self) -> usize;
    fn action_count(&self) -> usize;
    fn render(&self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
