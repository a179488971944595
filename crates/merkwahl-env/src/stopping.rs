//! Early Stopping mit Plateau-Erkennung auf dem kumulierten Score-Verlauf.

use crate::error::{EnvError, Result};
use merkwahl_core::{StoppingDetector, Verdict};
use serde::{Deserialize, Serialize};

/// Budgets für [`EarlyStopping`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoppingConfig {
    /// Tolerierte Updates ohne Verbesserung gegenüber dem Bestwert.
    pub patience: usize,
    /// Tolerierte flache Updates ohne Verbesserung.
    pub plateau_patience: usize,
    /// Abstand, um den ein Wert den Bestwert übertreffen muss, um als Verbesserung zu gelten.
    pub min_delta: f64,
    /// Rückgang gegenüber dem vorigen Wert, der noch als flach gilt.
    pub plateau_tolerance: f64,
}

impl Default for StoppingConfig {
    fn default() -> Self {
        Self {
            patience: 20,
            plateau_patience: 20,
            min_delta: 0.0,
            plateau_tolerance: 0.0,
        }
    }
}

impl StoppingConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_delta", self.min_delta),
            ("plateau_tolerance", self.plateau_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EnvError::Config(format!(
                    "{name} must be a finite, non-negative number (got {value})"
                )));
            }
        }
        Ok(())
    }
}

/// Zwei Geduldszähler über einer Folge von Metrikwerten.
///
/// `wait` zählt jedes Update, das den Bestwert nicht um mehr als `min_delta`
/// übertrifft. `plateau_wait` zählt davon die Updates, die höchstens um
/// `plateau_tolerance` unter dem vorigen Wert liegen. Nur eine Verbesserung
/// setzt beide zurück.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    config: StoppingConfig,
    best: Option<f64>,
    previous: Option<f64>,
    wait: usize,
    plateau_wait: usize,
}

impl EarlyStopping {
    #[must_use]
    pub fn new(config: StoppingConfig) -> Self {
        Self {
            config,
            best: None,
            previous: None,
            wait: 0,
            plateau_wait: 0,
        }
    }

    #[must_use]
    pub fn with_patience(patience: usize, plateau_patience: usize) -> Self {
        Self::new(StoppingConfig {
            patience,
            plateau_patience,
            ..StoppingConfig::default()
        })
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    #[must_use]
    pub fn config(&self) -> &StoppingConfig {
        &self.config
    }

    #[must_use]
    pub fn best(&self) -> Option<f64> {
        self.best
    }

    #[must_use]
    pub fn wait(&self) -> usize {
        self.wait
    }

    #[must_use]
    pub fn plateau_wait(&self) -> usize {
        self.plateau_wait
    }

    fn verdict(&self) -> Verdict {
        if self.wait > self.config.patience || self.plateau_wait > self.config.plateau_patience {
            Verdict::Stalled
        } else {
            Verdict::Safe
        }
    }
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self::new(StoppingConfig::default())
    }
}

impl StoppingDetector for EarlyStopping {
    fn update_metric(&mut self, value: f64) -> Verdict {
        if !value.is_finite() {
            self.wait += 1;
            return self.verdict();
        }
        let previous = self.previous.replace(value);

        let improved = self
            .best
            .map_or(true, |best| value > best + self.config.min_delta);
        if improved {
            self.best = Some(value);
            self.wait = 0;
            self.plateau_wait = 0;
            return Verdict::Improve;
        }

        self.wait += 1;
        let flat = previous.map_or(true, |prev| value >= prev - self.config.plateau_tolerance);
        if flat {
            self.plateau_wait += 1;
        }
        self.verdict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(detector: &mut EarlyStopping, values: &[f64]) -> Vec<Verdict> {
        values.iter().map(|&v| detector.update_metric(v)).collect()
    }

    #[test]
    fn plateau_exhausts_plateau_patience() {
        let mut detector = EarlyStopping::new(StoppingConfig {
            patience: 2,
            plateau_patience: 2,
            min_delta: 0.25,
            plateau_tolerance: 0.0,
        });
        let verdicts = feed(&mut detector, &[0.2, 0.4, 0.4, 0.4]);
        assert_eq!(
            verdicts,
            vec![
                Verdict::Improve,
                Verdict::Safe,
                Verdict::Safe,
                Verdict::Stalled
            ]
        );
        assert_eq!(detector.best(), Some(0.2));
    }

    #[test]
    fn worsening_exhausts_patience_independently() {
        let mut detector = EarlyStopping::with_patience(1, 5);
        let verdicts = feed(&mut detector, &[1.0, 0.5, 0.2]);
        assert_eq!(
            verdicts,
            vec![Verdict::Improve, Verdict::Safe, Verdict::Stalled]
        );
        assert_eq!(detector.wait(), 2);
        assert_eq!(detector.plateau_wait(), 0);
    }

    #[test]
    fn slow_decline_within_tolerance_still_exhausts_patience() {
        let mut detector = EarlyStopping::new(StoppingConfig {
            patience: 1,
            plateau_patience: 5,
            min_delta: 0.0,
            plateau_tolerance: 0.1,
        });
        let verdicts = feed(&mut detector, &[1.0, 0.95, 0.9]);
        assert_eq!(
            verdicts,
            vec![Verdict::Improve, Verdict::Safe, Verdict::Stalled]
        );
        assert_eq!(detector.wait(), 2);
        assert_eq!(detector.plateau_wait(), 2);
        assert_eq!(detector.update_metric(0.85), Verdict::Stalled);
    }

    #[test]
    fn improvement_resets_both_counters() {
        let mut detector = EarlyStopping::with_patience(3, 3);
        feed(&mut detector, &[1.0, 0.5, 0.5]);
        assert_eq!(detector.wait(), 2);
        assert_eq!(detector.plateau_wait(), 1);

        assert_eq!(detector.update_metric(2.0), Verdict::Improve);
        assert_eq!(detector.wait(), 0);
        assert_eq!(detector.plateau_wait(), 0);
    }

    #[test]
    fn tolerance_turns_small_drops_into_plateau() {
        let mut detector = EarlyStopping::new(StoppingConfig {
            patience: 5,
            plateau_patience: 1,
            min_delta: 0.0,
            plateau_tolerance: 0.1,
        });
        assert_eq!(detector.update_metric(1.0), Verdict::Improve);
        assert_eq!(detector.update_metric(0.95), Verdict::Safe);
        // deutlicher Rückgang: kein Plateau
        assert_eq!(detector.update_metric(0.5), Verdict::Safe);
        assert_eq!(detector.plateau_wait(), 1);
        assert_eq!(detector.update_metric(0.45), Verdict::Stalled);
        assert_eq!(detector.wait(), 3);
    }

    #[test]
    fn non_finite_values_count_as_worsening() {
        let mut detector = EarlyStopping::with_patience(1, 1);
        assert_eq!(detector.update_metric(f64::NAN), Verdict::Safe);
        assert_eq!(detector.update_metric(f64::INFINITY), Verdict::Stalled);
        assert_eq!(detector.best(), None);
    }

    #[test]
    fn reset_keeps_config_and_clears_history() {
        let mut detector = EarlyStopping::with_patience(0, 0);
        feed(&mut detector, &[1.0, 1.0]);
        detector.reset();
        assert_eq!(detector.best(), None);
        assert_eq!(detector.config().patience, 0);
        assert_eq!(detector.update_metric(0.1), Verdict::Improve);
    }

    #[test]
    fn config_rejects_negative_margins() {
        let cfg = StoppingConfig {
            min_delta: -0.1,
            ..StoppingConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(StoppingConfig::default().validate().is_ok());
    }
}
