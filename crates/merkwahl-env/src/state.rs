//! Zustand einer Episode: aktivierte Merkmale und Score-Verlauf.

use crate::score::ScoreResult;
use merkwahl_core::FeatureTable;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionState {
    /// Monoton innerhalb einer Episode: Merkmale werden nur eingeschaltet.
    activated: Vec<bool>,
    /// Ein Eintrag pro Schritt, degenerierte Schritte eingeschlossen.
    score_history: Vec<f64>,
    /// Nur erfolgreiche Aggregationen; ihre Summe speist den Detektor.
    episode_score_sum: Vec<f64>,
    best_feature_subset: Vec<String>,
    last_score: f64,
}

impl SelectionState {
    #[must_use]
    pub fn new(n_features: usize) -> Self {
        Self {
            activated: vec![false; n_features],
            score_history: Vec::new(),
            episode_score_sum: Vec::new(),
            best_feature_subset: Vec::new(),
            last_score: 0.0,
        }
    }

    /// Schaltet Merkmal `index` ein und meldet, ob es vorher aus war.
    ///
    /// # Panics
    /// Bei `index` außerhalb des Bereichs; die Umgebung prüft Aktionen vorher.
    pub fn activate(&mut self, index: usize) -> bool {
        !std::mem::replace(&mut self.activated[index], true)
    }

    #[must_use]
    pub fn is_active(&self, index: usize) -> bool {
        self.activated.get(index).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn activated(&self) -> &[bool] {
        &self.activated
    }

    #[must_use]
    pub fn selected_indices(&self) -> Vec<usize> {
        self.activated
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
            .collect()
    }

    #[must_use]
    pub fn selected_names(&self, table: &FeatureTable) -> Vec<String> {
        self.selected_indices()
            .into_iter()
            .map(|i| table.columns()[i].clone())
            .collect()
    }

    #[must_use]
    pub fn legal_actions(&self) -> Vec<usize> {
        self.activated
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| (!on).then_some(i))
            .collect()
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.activated.iter().all(|&on| on)
    }

    #[must_use]
    pub fn observation(&self) -> Vec<f32> {
        self.activated
            .iter()
            .map(|&on| if on { 1.0 } else { 0.0 })
            .collect()
    }

    /// Hängt den Score des Schritts an und liefert die Belohnung (Differenz zum vorigen Score).
    pub fn record_score(&mut self, result: &ScoreResult) -> f64 {
        if let Some(value) = result.finite() {
            self.episode_score_sum.push(value);
        }
        let score = result.value();
        let reward = score - self.last_score;
        self.last_score = score;
        self.score_history.push(score);
        reward
    }

    /// Summe der aggregierten Scores, `None` vor der ersten erfolgreichen Aggregation.
    #[must_use]
    pub fn cumulative(&self) -> Option<f64> {
        if self.episode_score_sum.is_empty() {
            None
        } else {
            Some(self.episode_score_sum.iter().sum())
        }
    }

    pub(crate) fn set_best(&mut self, subset: Vec<String>) {
        self.best_feature_subset = subset;
    }

    #[must_use]
    pub fn score_history(&self) -> &[f64] {
        &self.score_history
    }

    #[must_use]
    pub fn episode_score_sum(&self) -> &[f64] {
        &self.episode_score_sum
    }

    #[must_use]
    pub fn best_feature_subset(&self) -> &[String] {
        &self.best_feature_subset
    }

    #[must_use]
    pub fn last_score(&self) -> f64 {
        self.last_score
    }

    #[must_use]
    pub fn steps(&self) -> usize {
        self.score_history.len()
    }
}
