//! Training system for evolving runner policies with a genetic algorithm.
//!
//! This crate searches the parameter space of the policy network defined in
//! [`rexolve_evaluator`] for blobs that survive long in the runner game. Fitness
//! is the mean terminal score over a set of seeded episodes.
//!
//! # How Training Works
//!
//! 1. **Population** - Create random individuals (or mutated copies of a saved model)
//! 2. **Evaluation** - Every individual plays its episodes on a worker thread
//! 3. **Fitness** - The mean episode score, or "failed" if the unit errored or timed out
//! 4. **Selection** - Elites are kept, parents are picked by tournament
//! 5. **Reproduction** - Uniform crossover and Gaussian mutation with scheduled rates
//! 6. **Repeat** - Until the configured number of generations is reached
//!
//! # Architecture
//!
//! ```text
//! PopulationController (controller)
//!     ↓ dispatches one task per individual
//! WorkerPool (dispatcher)
//!     ↓ runs
//! EvaluationUnit (rexolve-evaluator)
//!     ↓ reports fitness
//! PopulationEvolver (genetic) ← AdaptiveSchedule (schedule)
//!     ↓ produces
//! Next Population
//! ```
//!
//! # Collaborators
//!
//! The controller reports progress through a
//! [`TrainingObserver`](controller::TrainingObserver) and persists models through a
//! [`ModelStore`](controller::ModelStore). Both are traits so that frontends can
//! choose how to display and where to store results.
//!
//! # Example
//!
//! ```
//! use rexolve_training::{
//!     config::TrainingConfig,
//!     controller::{InitialPopulation, NullModelStore, PopulationController},
//! };
//!
//! let mut config = TrainingConfig {
//!     population_size: 4,
//!     max_generations: 2,
//!     seed: Some(7),
//!     ..TrainingConfig::default()
//! };
//! config.physics.max_frames = Some(200);
//!
//! let controller = PopulationController::new(config)?;
//! let summary = controller.run(InitialPopulation::Random, &mut (), &mut NullModelStore)?;
//! assert_eq!(summary.history.len(), 2);
//! # Ok::<(), rexolve_training::TrainingError>(())
//! ```
//!
//! # Current Limitations
//!
//! - **Fixed topology**: Only the weights evolve; layer sizes are fixed by the config
//! - **Single objective**: Fitness is the mean score; no trade-off between survival and style
//! - **Shared trials**: All individuals of a generation play the same episode seeds, which
//!   makes comparisons fair but can overfit to those seeds unless `resample_episodes` is set

use std::io;

use rexolve_evaluator::policy_evaluator::PolicyError;

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod genetic;
pub mod schedule;
pub mod weights;

/// Fatal error of a training run.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum TrainingError {
    #[display("population size must be positive")]
    EmptyPopulation,
    #[display("number of generations must be positive")]
    NoGenerations,
    #[display("episodes per unit must be positive")]
    NoEpisodes,
    #[display("invalid training config: {reason}")]
    InvalidConfig { reason: String },
    #[display("invalid network shape")]
    #[from]
    InvalidNetwork { source: PolicyError },
    #[display("failed to start evaluation workers")]
    #[from]
    WorkerSpawn { source: io::Error },
}
