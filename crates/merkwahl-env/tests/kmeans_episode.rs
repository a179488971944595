use merkwahl_core::FeatureTable;
use merkwahl_env::{EnvConfig, EnvError, FeatureSelectionEnv, ScoreResult, StoppingConfig};
use merkwahl_indices::{build_all, IndexKind, KMeans};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

fn blobs() -> Arc<FeatureTable> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../tests/fixtures/tables/blobs.json");
    let file = File::open(path).unwrap();
    Arc::new(FeatureTable::from_json_reader(BufReader::new(file)).unwrap())
}

fn kmeans_env(table: Arc<FeatureTable>, config: EnvConfig) -> FeatureSelectionEnv<KMeans> {
    FeatureSelectionEnv::new(
        table,
        2,
        KMeans::new(2).with_seed(4),
        build_all(&IndexKind::all()),
        config,
    )
    .unwrap()
}

#[test]
fn constant_feature_alone_is_degenerate_but_not_terminal() {
    let table = blobs();
    let flat = table.column_index("flat").unwrap();
    let mut env = kmeans_env(table, EnvConfig::default());

    let t = env.step(flat).unwrap();
    assert!(t.score.is_degenerate());
    assert!((t.reward - -1.0).abs() < 1e-12);
    assert!(!t.terminated);
    assert_eq!(t.verdict, None);
    assert!(env.best_feature_subset().is_empty());
    assert_eq!(env.state().cumulative(), None);

    let x1 = env.table().column_index("x1").unwrap();
    let t = env.step(x1).unwrap();
    match t.score {
        ScoreResult::Finite(score) => assert!(score > 0.0 && score <= 1.0),
        ScoreResult::Degenerate { index } => panic!("unexpected degenerate index {index}"),
    }
    assert_eq!(t.selected_features, vec!["x1", "flat"]);
    assert_eq!(env.best_feature_subset(), &["x1", "flat"]);
}

#[test]
fn reactivating_a_feature_rescores_with_zero_reward() {
    let table = blobs();
    let x2 = table.column_index("x2").unwrap();
    let mut env = kmeans_env(table, EnvConfig::default());

    let first = env.step(x2).unwrap();
    let again = env.step(x2).unwrap();

    assert_eq!(first.selected_features, again.selected_features);
    assert_eq!(first.observation, again.observation);
    assert!(again.reward.abs() < 1e-12);
    assert_eq!(env.state().steps(), 2);
    assert_eq!(again.info.legal_actions, vec![0, 2, 3]);
}

#[test]
fn invalid_action_leaves_episode_untouched() {
    let mut env = kmeans_env(blobs(), EnvConfig::default());
    let before = env.state().clone();

    assert!(matches!(
        env.step(4),
        Err(EnvError::InvalidAction {
            action: 4,
            n_features: 4
        })
    ));
    assert_eq!(env.state(), &before);
}

#[test]
fn impatient_detector_ends_episode_and_reset_recovers() {
    let config = EnvConfig {
        stopping: StoppingConfig {
            patience: 0,
            plateau_patience: 0,
            min_delta: 10.0,
            ..StoppingConfig::default()
        },
        terminate_when_exhausted: false,
    };
    let table = blobs();
    let x1 = table.column_index("x1").unwrap();
    let mut env = kmeans_env(table, config);

    // normalized scores never exceed 1, so nothing after the first step clears min_delta
    env.step(x1).unwrap();
    let t = env.step(x1).unwrap();
    assert!(t.terminated);
    assert!(!t.truncated);
    assert!(matches!(env.step(x1), Err(EnvError::EpisodeTerminated)));

    let (observation, info) = env.reset(build_all(&[IndexKind::Silhouette]), Some(9)).unwrap();
    assert_eq!(observation, vec![0.0; 4]);
    assert_eq!(info.legal_actions, vec![0, 1, 2, 3]);
    assert!(info.score_history.is_empty());
    assert_eq!(env.evaluator_names().collect::<Vec<_>>(), vec!["silhouette"]);
    assert!(env.step(x1).is_ok());
}

#[test]
fn environments_share_one_table_across_threads() {
    let table = blobs();
    let envs: Vec<_> = (0..3)
        .map(|_| kmeans_env(Arc::clone(&table), EnvConfig::default()))
        .collect();

    let histories: Vec<Vec<f64>> = std::thread::scope(|scope| {
        let handles: Vec<_> = envs
            .into_iter()
            .map(|mut env| {
                scope.spawn(move || {
                    for action in [0, 1] {
                        env.step(action).unwrap();
                    }
                    env.state().score_history().to_vec()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(Arc::strong_count(&table), 1);
    assert!(histories.windows(2).all(|w| w[0] == w[1]));
}
