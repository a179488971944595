//! CLI for merkwahl.
//!
//! Runs feature-selection episodes with a seeded random agent and scores
//! individual feature subsets. It is the operational interface for trying
//! out a feature table before wiring up a learning agent.

#![warn(clippy::unwrap_used, clippy::expect_used)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use merkwahl_core::FeatureTable;
use merkwahl_env::score::{aggregate, evaluate_all};
use merkwahl_env::{EnvConfig, Environment, FeatureSelectionEnv, ScoreResult};
use merkwahl_indices::{build_all, IndexKind, KMeans};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;
use tracing_subscriber::EnvFilter;

const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run episodes with a random agent and emit one JSON line per step
    Run {
        /// Feature table (`.jsonl` records or table JSON)
        #[arg(long)]
        table: PathBuf,

        /// JSON run configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of episodes
        #[arg(long, default_value = "1")]
        episodes: u64,

        /// Seed for the agent and the clustering model
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Stop an episode once this many features are active
        #[arg(long)]
        target_features: Option<usize>,

        /// Number of k-means clusters (overrides config)
        #[arg(long)]
        clusters: Option<usize>,

        /// Comma-separated validity indices (overrides config)
        #[arg(long, value_delimiter = ',')]
        indices: Option<Vec<IndexKind>>,

        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Cluster one feature subset and print every index value
    Score {
        /// Feature table (`.jsonl` records or table JSON)
        #[arg(long)]
        table: PathBuf,

        /// Comma-separated feature names
        #[arg(long, value_delimiter = ',', required = true)]
        features: Vec<String>,

        /// JSON run configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of k-means clusters (overrides config)
        #[arg(long)]
        clusters: Option<usize>,

        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
struct RunConfig {
    #[serde(flatten)]
    env: EnvConfig,
    clusters: usize,
    max_iter: usize,
    tolerance: f64,
    indices: Vec<IndexKind>,
    target_features: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let kmeans = KMeans::default();
        Self {
            env: EnvConfig::default(),
            clusters: kmeans.n_clusters,
            max_iter: kmeans.max_iter,
            tolerance: kmeans.tolerance,
            indices: IndexKind::all().to_vec(),
            target_features: None,
        }
    }
}

impl RunConfig {
    fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let file = File::open(path)
            .with_context(|| format!("Failed to open config {}", path.display()))?;
        let config: RunConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.env.validate().context("Invalid stopping configuration")?;
        if config.indices.is_empty() {
            anyhow::bail!("Config must name at least one validity index");
        }
        Ok(config)
    }

    fn kmeans(&self, seed: u64) -> KMeans {
        KMeans {
            n_clusters: self.clusters,
            max_iter: self.max_iter,
            tolerance: self.tolerance,
            seed,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Step {
        ts: String,
        episode: u64,
        step: usize,
        action: usize,
        reward: f64,
        score: f64,
        degenerate: bool,
        terminated: bool,
        selected_features: &'a [String],
    },
    Episode {
        ts: String,
        episode: u64,
        steps: usize,
        best_feature_subset: &'a [String],
        final_score: f64,
        terminated: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct EpisodeSummary {
    steps: usize,
    best_feature_subset: Vec<String>,
    final_score: f64,
    terminated: bool,
}

fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
}

fn load_table(path: &Path) -> Result<FeatureTable> {
    let file =
        File::open(path).with_context(|| format!("Failed to open table {}", path.display()))?;
    let reader = BufReader::new(file);
    let table = if path.extension().is_some_and(|ext| ext == "jsonl") {
        FeatureTable::from_jsonl_reader(reader)
    } else {
        FeatureTable::from_json_reader(reader)
    };
    table.with_context(|| format!("Failed to load table {}", path.display()))
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to create output {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn write_record(out: &mut dyn Write, record: &Record<'_>) -> Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Plays one episode, picking uniformly among the legal actions.
///
/// Stops on termination, once `target` features are active, or when no
/// inactive feature is left.
fn run_episode(
    env: &mut FeatureSelectionEnv<KMeans>,
    rng: &mut StdRng,
    episode: u64,
    target: usize,
    out: &mut dyn Write,
) -> Result<EpisodeSummary> {
    let mut terminated = false;
    while env.state().selected_indices().len() < target {
        let legal = env.state().legal_actions();
        let Some(&action) = legal.choose(rng) else {
            break;
        };
        let transition = env
            .step(action)
            .with_context(|| format!("Step failed in episode {episode} (action {action})"))?;
        write_record(
            out,
            &Record::Step {
                ts: iso8601_now(),
                episode,
                step: env.state().steps(),
                action,
                reward: transition.reward,
                score: transition.score.value(),
                degenerate: transition.score.is_degenerate(),
                terminated: transition.terminated,
                selected_features: &transition.selected_features,
            },
        )?;
        if transition.terminated {
            terminated = true;
            break;
        }
    }

    Ok(EpisodeSummary {
        steps: env.state().steps(),
        best_feature_subset: env.best_feature_subset().to_vec(),
        final_score: env.state().last_score(),
        terminated,
    })
}

#[allow(clippy::too_many_arguments)]
fn run(
    table: &Path,
    config: Option<&Path>,
    episodes: u64,
    seed: u64,
    target_features: Option<usize>,
    clusters: Option<usize>,
    indices: Option<Vec<IndexKind>>,
    output: Option<&Path>,
) -> Result<()> {
    let mut config = RunConfig::load(config)?;
    if let Some(clusters) = clusters {
        config.clusters = clusters;
    }
    if let Some(indices) = indices {
        config.indices = indices;
    }
    if target_features.is_some() {
        config.target_features = target_features;
    }

    let table = Arc::new(load_table(table)?);
    info!(
        samples = table.n_samples(),
        features = table.n_features(),
        "loaded feature table"
    );

    let mut env = FeatureSelectionEnv::new(
        Arc::clone(&table),
        config.target_features.unwrap_or(table.n_features()),
        config.kmeans(seed),
        build_all(&config.indices),
        config.env,
    )
    .context("Failed to build environment")?;
    let target = env.target_features().min(env.action_count());

    let mut out = open_output(output)?;
    let mut rng = StdRng::seed_from_u64(seed);
    for episode in 0..episodes {
        env.reset(build_all(&config.indices), Some(seed.wrapping_add(episode)))?;
        let summary = run_episode(&mut env, &mut rng, episode, target, out.as_mut())?;
        info!(
            episode,
            steps = summary.steps,
            final_score = summary.final_score,
            best = ?summary.best_feature_subset,
            "episode finished"
        );
        write_record(
            out.as_mut(),
            &Record::Episode {
                ts: iso8601_now(),
                episode,
                steps: summary.steps,
                best_feature_subset: &summary.best_feature_subset,
                final_score: summary.final_score,
                terminated: summary.terminated,
            },
        )?;
    }
    out.flush()?;
    Ok(())
}

#[derive(Serialize, Debug)]
struct SubsetReport {
    features: Vec<String>,
    indices: Vec<IndexReport>,
    score: ScoreResult,
}

#[derive(Serialize, Debug)]
struct IndexReport {
    name: String,
    raw: f64,
    normalized: f64,
}

fn score_subset(
    table: &FeatureTable,
    features: &[String],
    config: &RunConfig,
    seed: u64,
) -> Result<SubsetReport> {
    let columns = features
        .iter()
        .map(|name| {
            table
                .column_index(name)
                .with_context(|| format!("Unknown feature: {name}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let projection = table.select(&columns)?;
    let labels = config
        .kmeans(seed)
        .fit(&projection)
        .context("Clustering failed")?
        .labels;

    let evaluators = build_all(&config.indices);
    let values = evaluate_all(table, &labels, &evaluators)?;
    let score = aggregate(&values)?;
    Ok(SubsetReport {
        features: features.to_vec(),
        indices: values
            .into_iter()
            .map(|(name, value)| IndexReport {
                name,
                raw: value.raw,
                normalized: value.normalized,
            })
            .collect(),
        score,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            table,
            config,
            episodes,
            seed,
            target_features,
            clusters,
            indices,
            output,
        } => run(
            &table,
            config.as_deref(),
            episodes,
            seed,
            target_features,
            clusters,
            indices,
            output.as_deref(),
        )?,
        Commands::Score {
            table,
            features,
            config,
            clusters,
            seed,
        } => {
            let mut config = RunConfig::load(config.as_deref())?;
            if let Some(clusters) = clusters {
                config.clusters = clusters;
            }
            let table = load_table(&table)?;
            let report = score_subset(&table, &features, &config, seed)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
