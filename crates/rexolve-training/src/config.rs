//! Training run configuration.
//!
//! [`TrainingConfig`] is the single state struct threaded into the controller.
//! It deserializes from JSON with every field optional; missing fields take the
//! defaults below.
//!
//! | field                 | default                         |
//! |-----------------------|---------------------------------|
//! | `population_size`     | available parallelism − 1, ≥ 1  |
//! | `max_generations`     | 300                             |
//! | `episodes_per_unit`   | 1                               |
//! | `seed`                | random                          |
//! | `workers`             | population size                 |
//! | `unit_timeout_secs`   | none                            |
//! | `mutation_sigma`      | 0.1                             |
//! | `hidden_layers`       | `[32, 16]`                      |
//! | `snapshot_interval`   | none                            |
//! | `resample_episodes`   | `false`                         |

use std::{num::NonZeroUsize, thread, time::Duration};

use rexolve_engine::PhysicsConfig;
use rexolve_evaluator::network::NetworkShape;
use serde::{Deserialize, Serialize};

use crate::{TrainingError, schedule::AdaptiveSchedule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub population_size: usize,
    pub max_generations: usize,
    pub episodes_per_unit: usize,
    /// Seed of the controller RNG; drawn at random when absent.
    pub seed: Option<u64>,
    /// Worker threads evaluating units; defaults to the population size.
    pub workers: Option<usize>,
    /// Time budget of one unit, counted from when a worker picks it up;
    /// unlimited when absent.
    pub unit_timeout_secs: Option<f64>,
    /// Standard deviation of mutation noise.
    pub mutation_sigma: f32,
    pub schedule: AdaptiveSchedule,
    pub hidden_layers: Vec<usize>,
    /// Frames between episode snapshots; disabled when absent.
    pub snapshot_interval: Option<u64>,
    /// Draw new episode seeds every generation instead of once per run.
    pub resample_episodes: bool,
    pub physics: PhysicsConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            max_generations: 300,
            episodes_per_unit: 1,
            seed: None,
            workers: None,
            unit_timeout_secs: None,
            mutation_sigma: 0.1,
            schedule: AdaptiveSchedule::default(),
            hidden_layers: NetworkShape::DEFAULT_HIDDEN.to_vec(),
            snapshot_interval: None,
            resample_episodes: false,
            physics: PhysicsConfig::default(),
        }
    }
}

/// One individual per spare CPU, leaving a core for the controller.
#[must_use]
pub fn default_population_size() -> usize {
    thread::available_parallelism()
        .map_or(1, |n| n.get().saturating_sub(1))
        .max(1)
}

impl TrainingConfig {
    /// Checks the config for values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.population_size == 0 {
            return Err(TrainingError::EmptyPopulation);
        }
        if self.max_generations == 0 {
            return Err(TrainingError::NoGenerations);
        }
        if self.episodes_per_unit == 0 {
            return Err(TrainingError::NoEpisodes);
        }
        if self.workers == Some(0) {
            return invalid("workers must be positive");
        }
        if self
            .unit_timeout_secs
            .is_some_and(|t| !(t.is_finite() && t > 0.0))
        {
            return invalid("unit_timeout_secs must be a positive number of seconds");
        }
        if !(self.mutation_sigma.is_finite() && self.mutation_sigma >= 0.0) {
            return invalid("mutation_sigma must be finite and non-negative");
        }
        let rates = [
            self.schedule.initial_mutation_rate,
            self.schedule.final_mutation_rate,
            self.schedule.initial_crossover_rate,
            self.schedule.final_crossover_rate,
        ];
        if rates.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return invalid("schedule rates must be within [0, 1]");
        }
        if self.snapshot_interval == Some(0) {
            return invalid("snapshot_interval must be positive");
        }
        if !(self.physics.frame_millis.is_finite() && self.physics.frame_millis > 0.0) {
            return invalid("physics.frame_millis must be positive");
        }
        if self.physics.max_speed < self.physics.initial_speed {
            return invalid("physics.max_speed must not be below physics.initial_speed");
        }
        self.network_shape()?;
        Ok(())
    }

    /// Shape of the policy network trained by this config.
    pub fn network_shape(&self) -> Result<NetworkShape, TrainingError> {
        Ok(NetworkShape::for_policy(&self.hidden_layers)?)
    }

    /// Number of worker threads, never zero.
    #[must_use]
    pub fn worker_count(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.workers.unwrap_or(self.population_size))
            .unwrap_or(NonZeroUsize::MIN)
    }

    #[must_use]
    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

fn invalid(reason: &str) -> Result<(), TrainingError> {
    Err(TrainingError::InvalidConfig {
        reason: reason.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TrainingConfig::default();
        assert!(config.population_size >= 1);
        assert_eq!(config.max_generations, 300);
        config.validate().unwrap();
        assert_eq!(config.network_shape().unwrap().layers(), &[7, 32, 16, 3]);
    }

    #[test]
    fn test_rejects_degenerate_runs() {
        let zero_pop = TrainingConfig {
            population_size: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(zero_pop.validate(), Err(TrainingError::EmptyPopulation)));

        let zero_gen = TrainingConfig {
            max_generations: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(zero_gen.validate(), Err(TrainingError::NoGenerations)));

        let zero_eps = TrainingConfig {
            episodes_per_unit: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(zero_eps.validate(), Err(TrainingError::NoEpisodes)));

        let bad_layers = TrainingConfig {
            hidden_layers: vec![8, 0],
            ..TrainingConfig::default()
        };
        assert!(matches!(
            bad_layers.validate(),
            Err(TrainingError::InvalidNetwork { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_rates() {
        let mut config = TrainingConfig::default();
        config.schedule.initial_mutation_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(TrainingError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_workers_default_to_population_size() {
        let config = TrainingConfig {
            population_size: 6,
            ..TrainingConfig::default()
        };
        assert_eq!(config.worker_count().get(), 6);
        let config = TrainingConfig {
            workers: Some(2),
            ..config
        };
        assert_eq!(config.worker_count().get(), 2);
    }

    #[test]
    fn test_partial_json() {
        let config: TrainingConfig = serde_json::from_str(
            r#"{
                "population_size": 12,
                "unit_timeout_secs": 2.5,
                "physics": { "max_frames": 1000 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.population_size, 12);
        assert_eq!(config.unit_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.physics.max_frames, Some(1000));
        assert_eq!(config.physics.initial_speed, 6.0);
        assert_eq!(config.hidden_layers, [32, 16]);
        config.validate().unwrap();
    }
}
