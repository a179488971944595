//! Spielt eine Episode mit fester Aktionsfolge auf einer Feature-Tabelle.
//!
//! Aufruf: `cargo run -p merkwahl-env --example walk_episode -- <table.json>`

use merkwahl_core::FeatureTable;
use merkwahl_env::{EnvConfig, FeatureSelectionEnv};
use merkwahl_indices::{build_all, IndexKind, KMeans};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("usage: walk_episode <table.json>")?;
    let table = Arc::new(FeatureTable::from_json_reader(BufReader::new(File::open(
        &path,
    )?))?);

    let mut env = FeatureSelectionEnv::new(
        Arc::clone(&table),
        table.n_features(),
        KMeans::new(2),
        build_all(&IndexKind::all()),
        EnvConfig::default(),
    )?;

    let mut action = 0;
    loop {
        let legal = env.state().legal_actions();
        if legal.is_empty() {
            break;
        }
        action = legal[(action * 7 + 3) % legal.len()];
        let t = env.step(action)?;
        println!("{}", serde_json::to_string(&t)?);
        if t.terminated {
            break;
        }
    }

    eprintln!("beste Auswahl: {:?}", env.best_feature_subset());
    Ok(())
}
