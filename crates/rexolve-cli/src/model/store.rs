//! Model directory layout.
//!
//! ```text
//! <dir>/generation_<g>.json   best model as of generation g
//! <dir>/final.json            best model of the finished run
//! <dir>/history.json          per-generation statistics
//! ```
//!
//! Generation numbers are global to the directory: a run writing into a
//! directory that already holds generation files continues after the highest
//! one, so the latest file is always the newest model.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use rexolve_engine::PhysicsConfig;
use rexolve_evaluator::network::NetworkShape;
use rexolve_training::controller::{BestSnapshot, GenerationRecord, ModelStore};

use crate::{model::trained_model::TrainedModel, util};

const GENERATION_PREFIX: &str = "generation_";
const JSON_EXTENSION: &str = ".json";

/// Writes models of a run as JSON files into one directory.
#[derive(Debug)]
pub(crate) struct JsonModelStore {
    dir: PathBuf,
    name: String,
    network: NetworkShape,
    physics: PhysicsConfig,
    /// Directory-wide number of the run's generation 0.
    first_generation: usize,
}

impl JsonModelStore {
    pub(crate) fn new(
        dir: PathBuf,
        name: String,
        network: NetworkShape,
        physics: PhysicsConfig,
    ) -> Self {
        Self {
            dir,
            name,
            network,
            physics,
            first_generation: 0,
        }
    }

    /// Numbers the run's generations starting at `first_generation`.
    #[must_use]
    pub(crate) fn with_first_generation(mut self, first_generation: usize) -> Self {
        self.first_generation = first_generation;
        self
    }

    fn model(&self, best: &BestSnapshot) -> TrainedModel {
        let best = BestSnapshot {
            generation: self.first_generation + best.generation,
            ..best.clone()
        };
        TrainedModel::from_best(&self.name, &self.network, &self.physics, &best)
    }
}

impl ModelStore for JsonModelStore {
    type Error = anyhow::Error;

    fn save_best(&mut self, best: &BestSnapshot) -> Result<(), Self::Error> {
        let model = self.model(best);
        let path = generation_path(&self.dir, model.generation);
        model.save(&path)?;
        tracing::debug!(path = %path.display(), "saved generation model");
        Ok(())
    }

    fn save_final(&mut self, best: &BestSnapshot) -> Result<(), Self::Error> {
        let path = final_path(&self.dir);
        self.model(best).save(&path)?;
        tracing::info!(path = %path.display(), fitness = best.fitness, "saved final model");
        Ok(())
    }

    fn save_history(&mut self, history: &[GenerationRecord]) -> Result<(), Self::Error> {
        let history: Vec<GenerationRecord> = history
            .iter()
            .map(|record| GenerationRecord {
                generation: self.first_generation + record.generation,
                ..record.clone()
            })
            .collect();
        util::write_json_file("history", history_path(&self.dir), &history)
    }
}

pub(crate) fn generation_path(dir: &Path, generation: usize) -> PathBuf {
    dir.join(format!("{GENERATION_PREFIX}{generation}{JSON_EXTENSION}"))
}

pub(crate) fn final_path(dir: &Path) -> PathBuf {
    dir.join("final.json")
}

pub(crate) fn history_path(dir: &Path) -> PathBuf {
    dir.join("history.json")
}

fn parse_generation(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix(GENERATION_PREFIX)?
        .strip_suffix(JSON_EXTENSION)?
        .parse()
        .ok()
}

/// Lists the `generation_<g>.json` files of `dir`, ordered by generation.
pub(crate) fn list_generation_models(dir: &Path) -> anyhow::Result<Vec<(usize, PathBuf)>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read model directory: {}", dir.display()))?;
    let mut models = vec![];
    for entry in entries {
        let entry =
            entry.with_context(|| format!("Failed to read model directory: {}", dir.display()))?;
        if let Some(generation) = entry.file_name().to_str().and_then(parse_generation) {
            models.push((generation, entry.path()));
        }
    }
    models.sort_by_key(|(generation, _)| *generation);
    Ok(models)
}

/// Number the next run writing into `dir` starts at; 0 for a missing directory.
pub(crate) fn next_generation(dir: &Path) -> anyhow::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    Ok(list_generation_models(dir)?
        .last()
        .map_or(0, |(generation, _)| generation + 1))
}

/// Loads the model of the highest generation saved in `dir`.
pub(crate) fn load_latest(dir: &Path) -> anyhow::Result<Option<TrainedModel>> {
    list_generation_models(dir)?
        .pop()
        .map(|(_, path)| TrainedModel::open(path))
        .transpose()
}
