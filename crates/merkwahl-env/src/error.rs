use merkwahl_core::{BoxError, TableError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Invalid action: {action} (environment has {n_features} features)")]
    InvalidAction { action: usize, n_features: usize },
    #[error("Episode already terminated; call reset first")]
    EpisodeTerminated,
    #[error("At least one validity index is required")]
    NoEvaluators,
    #[error("Clustering returned {found} labels for {expected} samples")]
    LabelCount { expected: usize, found: usize },
    #[error("Clustering model failed: {0}")]
    Model(#[source] BoxError),
    #[error("Validity index '{index}' failed: {source}")]
    Evaluator {
        index: String,
        #[source]
        source: BoxError,
    },
    #[error("Feature table error: {0}")]
    Table(#[from] TableError),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EnvError>;
