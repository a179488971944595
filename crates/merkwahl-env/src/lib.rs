#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Umgebung zur Merkmalsauswahl, gesteuert durch Clustering-Qualität.
//!
//! Ein Agent aktiviert pro Schritt ein Merkmal. Danach clustert die Umgebung
//! die Tabelle eingeschränkt auf die aktiven Merkmale neu, bewertet das
//! Ergebnis mit Validitätsindizes und belohnt den Agenten mit der Änderung
//! des Scores. Ein Early-Stopping-Detektor auf dem kumulierten Score
//! entscheidet, wann die Episode endet.

macro_rules! warn_event {
    ($($arg:tt)*) => {{
        #[cfg(feature = "telemetry")]
        tracing::warn!($($arg)*);
        #[cfg(not(feature = "telemetry"))]
        eprintln!($($arg)*);
    }};
}

macro_rules! debug_event {
    ($($arg:tt)*) => {{
        #[cfg(feature = "telemetry")]
        tracing::debug!($($arg)*);
        #[cfg(not(feature = "telemetry"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

pub mod error;
pub mod score;
pub mod state;
pub mod stopping;

use std::sync::Arc;

pub use error::{EnvError, Result};
pub use merkwahl_core::Environment;
use merkwahl_core::{ClusteringModel, Evaluator, FeatureTable, StoppingDetector, Verdict};
pub use score::{ScoreResult, DEGENERATE_SCORE};
use serde::{Deserialize, Serialize};
pub use state::SelectionState;
pub use stopping::{EarlyStopping, StoppingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub stopping: StoppingConfig,
    /// Beendet die Episode, sobald alle Merkmale aktiv sind. Standardmäßig aus:
    /// wiederholte Aktionen bleiben erlaubt, nur der Detektor beendet.
    pub terminate_when_exhausted: bool,
}

impl EnvConfig {
    pub fn validate(&self) -> Result<()> {
        self.stopping.validate()
    }
}

/// Diagnosedaten, die jede Beobachtung begleiten.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInfo {
    /// Indizes der noch inaktiven Merkmale.
    pub legal_actions: Vec<usize>,
    pub score_history: Vec<f64>,
}

/// Ergebnis eines [`FeatureSelectionEnv::step`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub observation: Vec<f32>,
    pub reward: f64,
    pub terminated: bool,
    /// Immer `false`; es gibt kein Schrittlimit.
    pub truncated: bool,
    pub info: StepInfo,
    pub selected_features: Vec<String>,
    pub score: ScoreResult,
    /// `None`, solange noch kein aggregierter Score existiert.
    pub verdict: Option<Verdict>,
}

pub struct FeatureSelectionEnv<M, D = EarlyStopping> {
    table: Arc<FeatureTable>,
    target_features: usize,
    model: M,
    evaluators: Vec<Box<dyn Evaluator>>,
    config: EnvConfig,
    /// Wird bei jedem Reset nach `detector` geklont.
    detector_template: D,
    detector: D,
    state: SelectionState,
    terminated: bool,
}

impl<M: ClusteringModel> FeatureSelectionEnv<M, EarlyStopping> {
    /// Baut eine Umgebung mit [`EarlyStopping`] aus `config.stopping`.
    pub fn new(
        table: Arc<FeatureTable>,
        target_features: usize,
        model: M,
        evaluators: Vec<Box<dyn Evaluator>>,
        config: EnvConfig,
    ) -> Result<Self> {
        let detector = EarlyStopping::new(config.stopping);
        Self::with_detector(table, target_features, model, evaluators, config, detector)
    }
}

impl<M: ClusteringModel, D: StoppingDetector + Clone> FeatureSelectionEnv<M, D> {
    /// Baut eine Umgebung mit eigenem Detektor. `detector` dient als Vorlage,
    /// mit der jede Episode beginnt. Die erste Episode ist sofort bereit.
    pub fn with_detector(
        table: Arc<FeatureTable>,
        target_features: usize,
        model: M,
        evaluators: Vec<Box<dyn Evaluator>>,
        config: EnvConfig,
        detector: D,
    ) -> Result<Self> {
        config.validate()?;
        if evaluators.is_empty() {
            return Err(EnvError::NoEvaluators);
        }
        if target_features > table.n_features() {
            warn_event!(
                "target feature count {} exceeds the {} available features",
                target_features,
                table.n_features()
            );
        }

        let state = SelectionState::new(table.n_features());
        Ok(Self {
            table,
            target_features,
            model,
            evaluators,
            config,
            detector: detector.clone(),
            detector_template: detector,
            state,
            terminated: false,
        })
    }

    /// Startet eine neue Episode mit `evaluators`; `seed` geht an das Modell.
    pub fn reset(
        &mut self,
        evaluators: Vec<Box<dyn Evaluator>>,
        seed: Option<u64>,
    ) -> Result<(Vec<f32>, StepInfo)> {
        if evaluators.is_empty() {
            return Err(EnvError::NoEvaluators);
        }
        if let Some(seed) = seed {
            self.model.reseed(seed);
        }
        self.evaluators = evaluators;
        self.state = SelectionState::new(self.table.n_features());
        self.detector = self.detector_template.clone();
        self.terminated = false;

        debug_event!(
            "episode reset: {} features, {} indices",
            self.table.n_features(),
            self.evaluators.len()
        );
        Ok((self.state.observation(), self.info()))
    }

    /// Aktiviert Merkmal `action`, clustert neu, bewertet und befragt den Detektor.
    ///
    /// Schlägt Modell oder Index fehl, bleibt der Episodenzustand unverändert.
    pub fn step(&mut self, action: usize) -> Result<Transition> {
        let n_features = self.table.n_features();
        if action >= n_features {
            return Err(EnvError::InvalidAction { action, n_features });
        }
        if self.terminated {
            return Err(EnvError::EpisodeTerminated);
        }

        let mut selected = self.state.selected_indices();
        if let Err(pos) = selected.binary_search(&action) {
            selected.insert(pos, action);
        } else {
            debug_event!("feature {} already active, re-scoring unchanged subset", action);
        }

        let projection = self.table.select(&selected)?;
        let labels = self
            .model
            .fit_predict(&projection)
            .map_err(EnvError::Model)?;
        if labels.len() != self.table.n_samples() {
            return Err(EnvError::LabelCount {
                expected: self.table.n_samples(),
                found: labels.len(),
            });
        }
        let score = score::score(&self.table, &labels, &self.evaluators)?;

        self.state.activate(action);
        let selected_features = self.state.selected_names(&self.table);
        if let ScoreResult::Degenerate { index } = &score {
            debug_event!(
                "degenerate clustering on {:?} (index '{}' undefined), scoring {}",
                selected_features,
                index,
                DEGENERATE_SCORE
            );
        }
        let reward = self.state.record_score(&score);

        let verdict = self
            .state
            .cumulative()
            .map(|cumulative| self.detector.update_metric(cumulative));
        let mut terminated = match verdict {
            Some(Verdict::Improve) => {
                self.state.set_best(selected_features.clone());
                false
            }
            Some(Verdict::Safe) | None => false,
            Some(Verdict::Stalled) => true,
        };
        if self.config.terminate_when_exhausted && self.state.is_exhausted() {
            terminated = true;
        }
        self.terminated = terminated;

        debug_event!(
            "step {}: action={} score={:.4} reward={:.4} verdict={:?}",
            self.state.steps(),
            action,
            score.value(),
            reward,
            verdict
        );

        Ok(Transition {
            observation: self.state.observation(),
            reward,
            terminated,
            truncated: false,
            info: self.info(),
            selected_features,
            score,
            verdict,
        })
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            legal_actions: self.state.legal_actions(),
            score_history: self.state.score_history().to_vec(),
        }
    }

    #[must_use]
    pub fn observation(&self) -> Vec<f32> {
        self.state.observation()
    }

    #[must_use]
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    #[must_use]
    pub fn best_feature_subset(&self) -> &[String] {
        self.state.best_feature_subset()
    }

    /// Zielgröße für den Aufrufer; wird hier nie erzwungen.
    #[must_use]
    pub fn target_features(&self) -> usize {
        self.target_features
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.table.n_features()
    }

    #[must_use]
    pub fn table(&self) -> &Arc<FeatureTable> {
        &self.table
    }

    #[must_use]
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn evaluator_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.evaluators.iter().map(|e| e.name())
    }
}

impl<M: ClusteringModel, D: StoppingDetector + Clone> Environment for FeatureSelectionEnv<M, D> {
    type Action = usize;
    type Outcome = Transition;
    type Error = EnvError;

    fn step(&mut self, action: usize) -> Result<Transition> {
        FeatureSelectionEnv::step(self, action)
    }

    fn observation_size(&self) -> usize {
        self.table.n_features()
    }

    fn action_count(&self) -> usize {
        self.table.n_features()
    }
}
