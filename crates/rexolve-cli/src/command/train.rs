use std::path::PathBuf;

use anyhow::Context;
use rexolve_training::{
    config::TrainingConfig,
    controller::{InitialPopulation, PopulationController},
};

use crate::{
    model::{
        store::{self, JsonModelStore},
        trained_model::TrainedModel,
    },
    observer::LogObserver,
    util,
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// Training config JSON file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of individuals per generation
    #[arg(long)]
    population: Option<usize>,
    /// Number of generations to run
    #[arg(long)]
    generations: Option<usize>,
    /// Episodes played by each individual per generation
    #[arg(long)]
    episodes: Option<usize>,
    /// Seed of the training run
    #[arg(long)]
    seed: Option<u64>,
    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,
    /// Time budget of one evaluation unit in seconds
    #[arg(long)]
    unit_timeout: Option<f64>,
    /// Frames between episode snapshots
    #[arg(long)]
    snapshot_interval: Option<u64>,
    /// Frame limit of an episode
    #[arg(long)]
    max_frames: Option<u64>,
    /// Draw new episode seeds every generation
    #[arg(long)]
    resample_episodes: bool,
    /// Directory models and history are written to
    #[arg(long, default_value = "models")]
    output_dir: PathBuf,
    /// Name stored in saved models
    #[arg(long, default_value = "rexolve")]
    name: String,
    /// Start from the latest generation model in the output directory
    #[arg(long)]
    resume: bool,
    /// Start from the given model file
    #[arg(long, conflicts_with = "resume")]
    resume_from: Option<PathBuf>,
}

impl TrainArg {
    fn training_config(&self) -> anyhow::Result<TrainingConfig> {
        let mut config: TrainingConfig = match &self.config {
            Some(path) => util::read_json_file("config", path)?,
            None => TrainingConfig::default(),
        };
        if let Some(population) = self.population {
            config.population_size = population;
        }
        if let Some(generations) = self.generations {
            config.max_generations = generations;
        }
        if let Some(episodes) = self.episodes {
            config.episodes_per_unit = episodes;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(timeout) = self.unit_timeout {
            config.unit_timeout_secs = Some(timeout);
        }
        if let Some(interval) = self.snapshot_interval {
            config.snapshot_interval = Some(interval);
        }
        if let Some(max_frames) = self.max_frames {
            config.physics.max_frames = Some(max_frames);
        }
        if self.resample_episodes {
            config.resample_episodes = true;
        }
        Ok(config)
    }

    /// Loads the model to resume from; `None` when not resuming or when no
    /// usable model exists.
    fn resume_model(&self) -> Option<TrainedModel> {
        let loaded = if let Some(path) = &self.resume_from {
            TrainedModel::open(path).map(Some)
        } else if self.resume {
            store::load_latest(&self.output_dir)
        } else {
            return None;
        };
        match loaded {
            Ok(Some(model)) => {
                tracing::info!(
                    name = %model.name,
                    generation = model.generation,
                    fitness = model.fitness,
                    "loaded model to resume from"
                );
                Some(model)
            }
            Ok(None) => {
                tracing::warn!(
                    dir = %self.output_dir.display(),
                    "no saved model to resume from, starting from random individuals"
                );
                None
            }
            Err(err) => {
                tracing::warn!(
                    error = %format!("{err:#}"),
                    "failed to load model, starting from random individuals"
                );
                None
            }
        }
    }

    /// Initial population and the directory-wide number of its generation.
    ///
    /// Numbering continues after every generation file already in the output
    /// directory and after the resumed model.
    fn run_start(&self) -> anyhow::Result<RunStart> {
        let next_free = store::next_generation(&self.output_dir)?;
        let Some(model) = self.resume_model() else {
            return Ok(RunStart {
                population: InitialPopulation::Random,
                first_generation: next_free,
            });
        };
        Ok(RunStart {
            first_generation: next_free.max(model.generation + 1),
            population: InitialPopulation::Resume {
                parameters: model.parameters,
            },
        })
    }
}

#[derive(Debug)]
struct RunStart {
    population: InitialPopulation,
    first_generation: usize,
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let config = arg.training_config()?;
    let controller = PopulationController::new(config).context("Invalid training config")?;
    let start = arg.run_start()?;
    if start.first_generation > 0 {
        tracing::info!(
            first_generation = start.first_generation,
            "continuing generation numbering of {}",
            arg.output_dir.display()
        );
    }

    let mut store = JsonModelStore::new(
        arg.output_dir.clone(),
        arg.name.clone(),
        controller.network_shape().clone(),
        controller.config().physics.clone(),
    )
    .with_first_generation(start.first_generation);
    let mut observer = LogObserver::new();
    let summary = controller
        .run(start.population, &mut observer, &mut store)
        .context("Training failed")?;

    eprintln!();
    eprintln!("Training completed");
    eprintln!("  Seed: {}", summary.seed);
    eprintln!("  Generations: {}", summary.history.len());
    match &summary.best {
        Some(best) => {
            eprintln!("  Best fitness: {:.3}", best.fitness);
            eprintln!("  Found in generation: {}", start.first_generation + best.generation);
            eprintln!("  Models: {}", arg.output_dir.display());
        }
        None => eprintln!("  No individual was evaluated successfully"),
    }
    Ok(())
}
