//! Verdichtung der Validitätsindizes zu einem vergleichbaren Qualitätsscore.

use crate::error::{EnvError, Result};
use merkwahl_core::{Evaluator, FeatureTable, IndexValue};
use serde::Serialize;

/// Score für einen Schritt, dessen Clustering einen Index undefiniert macht.
pub const DEGENERATE_SCORE: f64 = -1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreResult {
    /// Mittelwert der normalisierten Indexwerte.
    Finite(f64),
    /// Mindestens ein Index war nicht endlich; `index` nennt den ersten.
    Degenerate { index: String },
}

impl ScoreResult {
    /// Score für die Belohnung; degenerierte Ergebnisse ergeben [`DEGENERATE_SCORE`].
    #[must_use]
    pub fn value(&self) -> f64 {
        match self {
            Self::Finite(v) => *v,
            Self::Degenerate { .. } => DEGENERATE_SCORE,
        }
    }

    #[must_use]
    pub fn finite(&self) -> Option<f64> {
        match self {
            Self::Finite(v) => Some(*v),
            Self::Degenerate { .. } => None,
        }
    }

    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate { .. })
    }
}

/// Führt alle Indizes aus und liefert `(name, wert)`-Paare in deren Reihenfolge.
///
/// Fehler eines Index werden nicht abgefangen, sondern als [`EnvError::Evaluator`] gemeldet.
pub fn evaluate_all(
    table: &FeatureTable,
    labels: &[usize],
    evaluators: &[Box<dyn Evaluator>],
) -> Result<Vec<(String, IndexValue)>> {
    if evaluators.is_empty() {
        return Err(EnvError::NoEvaluators);
    }
    evaluators
        .iter()
        .map(|evaluator| {
            evaluator
                .evaluate(table, labels)
                .map(|value| (evaluator.name().to_string(), value))
                .map_err(|source| EnvError::Evaluator {
                    index: evaluator.name().to_string(),
                    source,
                })
        })
        .collect()
}

/// Fasst die Werte pro Index zu einem [`ScoreResult`] zusammen.
pub fn aggregate(values: &[(String, IndexValue)]) -> Result<ScoreResult> {
    if values.is_empty() {
        return Err(EnvError::NoEvaluators);
    }
    // NaN gilt wie ±∞ als degeneriert und erreicht nie die kumulierte Summe
    if let Some((name, _)) = values.iter().find(|(_, v)| !v.normalized.is_finite()) {
        return Ok(ScoreResult::Degenerate {
            index: name.clone(),
        });
    }
    let total: f64 = values.iter().map(|(_, v)| v.normalized).sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = total / values.len() as f64;
    Ok(ScoreResult::Finite(mean))
}

pub fn score(
    table: &FeatureTable,
    labels: &[usize],
    evaluators: &[Box<dyn Evaluator>],
) -> Result<ScoreResult> {
    aggregate(&evaluate_all(table, labels, evaluators)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use merkwahl_core::BoxError;

    struct Fixed(&'static str, f64);

    impl Evaluator for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn evaluate(&self, _: &FeatureTable, _: &[usize]) -> std::result::Result<IndexValue, BoxError> {
            Ok(IndexValue::new(self.1 * 10.0, self.1))
        }
    }

    struct Broken;

    impl Evaluator for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn evaluate(&self, _: &FeatureTable, _: &[usize]) -> std::result::Result<IndexValue, BoxError> {
            Err("labels do not fit".into())
        }
    }

    fn table() -> FeatureTable {
        FeatureTable::new(vec!["a".into()], vec![vec![0.0], vec![1.0]]).unwrap()
    }

    #[test]
    fn mean_of_normalized_values() {
        let evaluators: Vec<Box<dyn Evaluator>> =
            vec![Box::new(Fixed("x", 0.2)), Box::new(Fixed("y", 0.6))];
        let result = score(&table(), &[0, 1], &evaluators).unwrap();
        let value = result.finite().expect("finite score");
        assert!((value - 0.4).abs() < 1e-12);
        assert!(!result.is_degenerate());
    }

    #[test]
    fn any_non_finite_index_is_degenerate() {
        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let evaluators: Vec<Box<dyn Evaluator>> =
                vec![Box::new(Fixed("ok", 0.5)), Box::new(Fixed("bad", bad))];
            let result = score(&table(), &[0, 0], &evaluators).unwrap();
            assert_eq!(
                result,
                ScoreResult::Degenerate {
                    index: "bad".into()
                }
            );
            #[allow(clippy::float_cmp)]
            {
                assert_eq!(result.value(), DEGENERATE_SCORE);
            }
        }
    }

    #[test]
    fn evaluator_failure_propagates_with_name() {
        let evaluators: Vec<Box<dyn Evaluator>> =
            vec![Box::new(Fixed("ok", 0.5)), Box::new(Broken)];
        let err = score(&table(), &[0, 1], &evaluators).unwrap_err();
        assert!(matches!(err, EnvError::Evaluator { ref index, .. } if index == "broken"));
        assert!(err.to_string().contains("labels do not fit"));
    }

    #[test]
    fn empty_evaluator_set_is_rejected() {
        assert!(matches!(
            score(&table(), &[0, 1], &[]),
            Err(EnvError::NoEvaluators)
        ));
    }
}
