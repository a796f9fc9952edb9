//! Fitness evaluation of one policy over a batch of episodes.
//!
//! An [`EvaluationUnit`] plays its episodes strictly one after another on a
//! single [`SimulationEngine`], reseeding it before each episode, and reports
//! the mean terminal score as fitness. The first simulation or policy error
//! aborts the remaining episodes.
//!
//! # Snapshots
//!
//! With a snapshot interval configured, the unit hands an [`EpisodeSnapshot`]
//! to a [`SnapshotSink`] every `interval` frames. Snapshots are pure side
//! output: they never influence the episode.
//!
//! # Cancellation
//!
//! A unit may share an [`AtomicBool`] with its supervisor. The flag is polled
//! once per frame; once raised the unit stops and returns
//! [`EvaluationError::Cancelled`].

use std::{
    num::NonZeroU64,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use rexolve_engine::{EpisodeSeed, EpisodeState, PhysicsConfig, SimulationEngine, SimulationError};
use serde::Serialize;

use crate::policy_evaluator::{PolicyError, PolicyEvaluator};

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum EvaluationError {
    #[display("simulation failed in episode {episode}")]
    Simulation {
        episode: usize,
        source: SimulationError,
    },
    #[display("policy failed in episode {episode}")]
    Policy { episode: usize, source: PolicyError },
    #[display("invalid policy")]
    InvalidPolicy { source: PolicyError },
    #[display("evaluation cancelled")]
    Cancelled,
    #[display("no episodes to evaluate")]
    NoEpisodes,
    #[display("evaluation panicked: {message}")]
    Panicked { message: String },
    #[display("evaluation produced a non-finite fitness")]
    NonFiniteFitness,
}

/// Progress report of a running episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSnapshot {
    /// Position of the episode within the unit's batch.
    pub episode: usize,
    pub frame: u64,
    pub score: u64,
    pub speed: f32,
    pub runner_y: f32,
    pub obstacle_count: usize,
    /// Horizontal distance from the runner to the nearest obstacle ahead.
    pub nearest_obstacle_distance: Option<f32>,
}

impl EpisodeSnapshot {
    #[must_use]
    pub fn capture(episode: usize, state: &EpisodeState) -> Self {
        let runner = state.runner();
        Self {
            episode,
            frame: state.frame(),
            score: state.score(),
            speed: state.speed(),
            runner_y: runner.y(),
            obstacle_count: state.obstacles().len(),
            nearest_obstacle_distance: state.nearest_obstacle().map(|o| o.x() - runner.x()),
        }
    }
}

/// Receiver of periodic [`EpisodeSnapshot`]s.
pub trait SnapshotSink {
    fn snapshot(&mut self, snapshot: EpisodeSnapshot);
}

impl SnapshotSink for () {
    fn snapshot(&mut self, _snapshot: EpisodeSnapshot) {}
}

impl SnapshotSink for Vec<EpisodeSnapshot> {
    fn snapshot(&mut self, snapshot: EpisodeSnapshot) {
        self.push(snapshot);
    }
}

impl<S> SnapshotSink for &mut S
where
    S: SnapshotSink + ?Sized,
{
    fn snapshot(&mut self, snapshot: EpisodeSnapshot) {
        (**self).snapshot(snapshot);
    }
}

/// Plays a batch of episodes with one policy.
#[derive(Debug, Clone)]
pub struct EvaluationUnit<P> {
    policy: P,
    physics: PhysicsConfig,
    snapshot_interval: Option<NonZeroU64>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<P> EvaluationUnit<P>
where
    P: PolicyEvaluator,
{
    #[must_use]
    pub fn new(policy: P, physics: PhysicsConfig) -> Self {
        Self {
            policy,
            physics,
            snapshot_interval: None,
            cancel: None,
        }
    }

    /// Emits a snapshot every `interval` frames of each episode.
    #[must_use]
    pub fn with_snapshot_interval(mut self, interval: Option<NonZeroU64>) -> Self {
        self.snapshot_interval = interval;
        self
    }

    /// Stops the unit at the next frame once `flag` is set.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[must_use]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Plays one episode per seed and returns the terminal scores in order.
    pub fn run_episodes<S>(
        &self,
        seeds: &[EpisodeSeed],
        sink: &mut S,
    ) -> Result<Vec<u64>, EvaluationError>
    where
        S: SnapshotSink + ?Sized,
    {
        let Some(&first_seed) = seeds.first() else {
            return Err(EvaluationError::NoEpisodes);
        };
        let mut engine = SimulationEngine::new(self.physics.clone(), first_seed);
        let mut scores = Vec::with_capacity(seeds.len());
        for (episode, &seed) in seeds.iter().enumerate() {
            engine.reset_with_seed(seed);
            scores.push(self.play_episode(&mut engine, episode, sink)?);
        }
        Ok(scores)
    }

    /// Plays one episode per seed and returns the mean terminal score.
    ///
    /// ```
    /// use rexolve_engine::{Action, PhysicsConfig};
    /// use rexolve_evaluator::{
    ///     evaluation_unit::EvaluationUnit, policy_evaluator::ConstantPolicyEvaluator,
    /// };
    ///
    /// let unit = EvaluationUnit::new(ConstantPolicyEvaluator(Action::Run), PhysicsConfig::default());
    /// let fitness = unit.run(&[1, 2, 3], &mut ()).unwrap();
    /// assert!(fitness > 0.0);
    /// ```
    pub fn run<S>(&self, seeds: &[EpisodeSeed], sink: &mut S) -> Result<f32, EvaluationError>
    where
        S: SnapshotSink + ?Sized,
    {
        let scores = self.run_episodes(seeds, sink)?;
        let fitness = mean_score(&scores);
        if !fitness.is_finite() {
            return Err(EvaluationError::NonFiniteFitness);
        }
        Ok(fitness)
    }

    fn play_episode<S>(
        &self,
        engine: &mut SimulationEngine,
        episode: usize,
        sink: &mut S,
    ) -> Result<u64, EvaluationError>
    where
        S: SnapshotSink + ?Sized,
    {
        while !engine.state().is_terminal() {
            if self.is_cancelled() {
                return Err(EvaluationError::Cancelled);
            }
            let action = self
                .policy
                .choose_action(engine.state())
                .map_err(|source| EvaluationError::Policy { episode, source })?;
            let state = engine
                .step(action)
                .map_err(|source| EvaluationError::Simulation { episode, source })?;
            if let Some(interval) = self.snapshot_interval
                && state.frame() % interval.get() == 0
            {
                sink.snapshot(EpisodeSnapshot::capture(episode, state));
            }
        }
        Ok(engine.state().score())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[expect(clippy::cast_precision_loss)]
fn mean_score(scores: &[u64]) -> f32 {
    let total: f64 = scores.iter().map(|&s| s as f64).sum();
    (total / scores.len() as f64) as f32
}
