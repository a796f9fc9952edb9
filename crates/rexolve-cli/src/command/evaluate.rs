use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use rexolve_engine::EpisodeSeed;
use rexolve_evaluator::evaluation_unit::EvaluationUnit;
use serde::Serialize;

use crate::{
    model::{store, trained_model::TrainedModel},
    util::Output,
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct EvaluateArg {
    /// Model file, or a directory of generation models
    model: PathBuf,
    /// Number of episodes played by each model
    #[arg(long, default_value_t = 10)]
    episodes: u64,
    /// Seed of the first episode; episode i uses seed + i
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Frame limit of an episode, overriding the model's physics
    #[arg(long)]
    max_frames: Option<u64>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct ModelReport {
    path: PathBuf,
    name: String,
    generation: usize,
    training_fitness: f32,
    mean_score: f64,
    best_score: u64,
    worst_score: u64,
    scores: Vec<u64>,
}

pub(crate) fn run(arg: &EvaluateArg) -> anyhow::Result<()> {
    if arg.episodes == 0 {
        bail!("--episodes must be positive");
    }
    let paths = model_paths(&arg.model)?;
    if paths.is_empty() {
        bail!("No generation models found in {}", arg.model.display());
    }
    let seeds = episode_seeds(arg.seed, arg.episodes);

    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        let report = evaluate_model(path, &seeds, arg.max_frames)?;
        tracing::info!(
            generation = report.generation,
            mean = report.mean_score,
            best = report.best_score,
            worst = report.worst_score,
            "evaluated {}",
            report.path.display()
        );
        reports.push(report);
    }

    Output::from_path(arg.output.clone()).write_json(&reports)
}

fn model_paths(model: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if model.is_dir() {
        Ok(store::list_generation_models(model)?
            .into_iter()
            .map(|(_, path)| path)
            .collect())
    } else {
        Ok(vec![model.to_owned()])
    }
}

fn episode_seeds(first: u64, count: u64) -> Vec<EpisodeSeed> {
    (0..count).map(|i| first.wrapping_add(i)).collect()
}

fn evaluate_model(
    path: PathBuf,
    seeds: &[EpisodeSeed],
    max_frames: Option<u64>,
) -> anyhow::Result<ModelReport> {
    let model = TrainedModel::open(&path)?;
    let policy = model.to_policy()?;
    let mut physics = model.physics.clone();
    if max_frames.is_some() {
        physics.max_frames = max_frames;
    }

    let scores = EvaluationUnit::new(policy, physics)
        .run_episodes(seeds, &mut ())
        .with_context(|| format!("Failed to evaluate model: {}", path.display()))?;
    let (Some(&best_score), Some(&worst_score)) = (scores.iter().max(), scores.iter().min())
    else {
        bail!("No episodes were played for model: {}", path.display());
    };
    #[expect(clippy::cast_precision_loss)]
    let mean_score = scores.iter().sum::<u64>() as f64 / scores.len() as f64;

    Ok(ModelReport {
        path,
        name: model.name,
        generation: model.generation,
        training_fitness: model.fitness,
        mean_score,
        best_score,
        worst_score,
        scores,
    })
}
