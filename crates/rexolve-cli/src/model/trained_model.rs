use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rexolve_engine::PhysicsConfig;
use rexolve_evaluator::{network::NetworkShape, policy_evaluator::NetworkPolicyEvaluator};
use rexolve_training::controller::BestSnapshot;
use serde::{Deserialize, Serialize};

use crate::util;

/// A policy network saved by a training run.
///
/// The physics the model was trained under are stored alongside the weights so
/// that evaluation replays the same game.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct TrainedModel {
    pub name: String,
    pub trained_at: DateTime<Utc>,
    pub generation: usize,
    pub fitness: f32,
    pub network: NetworkShape,
    pub physics: PhysicsConfig,
    pub parameters: Vec<f32>,
}

impl TrainedModel {
    pub(crate) fn from_best(
        name: &str,
        network: &NetworkShape,
        physics: &PhysicsConfig,
        best: &BestSnapshot,
    ) -> Self {
        Self {
            name: name.to_owned(),
            trained_at: Utc::now(),
            generation: best.generation,
            fitness: best.fitness,
            network: network.clone(),
            physics: physics.clone(),
            parameters: best.parameters.clone(),
        }
    }

    pub(crate) fn open<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        util::read_json_file("model", path)
    }

    pub(crate) fn save<P>(&self, path: P) -> anyhow::Result<()>
    where
        P: AsRef<Path>,
    {
        util::write_json_file("model", path, self)
    }

    pub(crate) fn to_policy(&self) -> anyhow::Result<NetworkPolicyEvaluator> {
        NetworkPolicyEvaluator::new(self.network.clone(), self.parameters.clone())
            .with_context(|| format!("Model {} does not fit its network", self.name))
    }
}
