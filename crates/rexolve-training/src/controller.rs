//! Generation loop of a training run.
//!
//! [`PopulationController`] owns the population and drives it through the
//! phases of each generation:
//!
//! ```text
//! Idle → Initializing → Evaluating → Selecting → Breeding → Evaluating → … → Completed
//! ```
//!
//! - **Initializing** builds generation 0, either random or resumed from a saved blob.
//! - **Evaluating** dispatches one unit per individual and waits for all of them.
//! - **Selecting** attaches fitness, records statistics and tracks the all-time best.
//! - **Breeding** builds the next population (skipped after the last generation).
//!
//! # Episode Seeds
//!
//! A set of `episodes_per_unit` seeds is drawn from the controller RNG when the
//! run starts and shared by every unit of every generation. Re-evaluated elites
//! therefore reproduce their fitness exactly, so the best fitness per generation
//! never decreases. With `resample_episodes` the seeds are redrawn each generation
//! instead.
//!
//! # Persistence
//!
//! The controller calls its [`ModelStore`] only between generations, on its own
//! thread. Storage failures are logged and never abort the run.

use std::{convert::Infallible, fmt, sync::Arc};

use rand::prelude::*;
use rand_pcg::Pcg32;
use rexolve_engine::EpisodeSeed;
use rexolve_evaluator::{evaluation_unit::EpisodeSnapshot, network::NetworkShape};
use serde::{Deserialize, Serialize};

use crate::{
    TrainingError,
    config::TrainingConfig,
    dispatcher::{
        DispatchEvent, DispatchTask, FitnessEvaluator, NetworkFitnessEvaluator, UnitOutcome,
        WorkerPool,
    },
    genetic::{Population, PopulationEvolver},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum ControllerPhase {
    #[display("idle")]
    Idle,
    #[display("initializing")]
    Initializing,
    #[display("evaluating")]
    Evaluating,
    #[display("selecting")]
    Selecting,
    #[display("breeding")]
    Breeding,
    #[display("completed")]
    Completed,
}

/// Statistics of one completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    /// Best fitness among evaluated individuals; `None` if every unit failed.
    pub best_fitness: Option<f32>,
    pub mean_fitness: Option<f32>,
    /// Units without a fitness, timed-out ones included.
    pub failed_units: usize,
    pub timed_out_units: usize,
}

/// The best individual found so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestSnapshot {
    pub parameters: Vec<f32>,
    pub generation: usize,
    pub fitness: f32,
}

/// How generation 0 is built.
#[derive(Debug, Clone, Default)]
pub enum InitialPopulation {
    #[default]
    Random,
    /// The given blob plus mutated copies of it.
    Resume { parameters: Vec<f32> },
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// Seed of the controller RNG, to reproduce the run.
    pub seed: u64,
    pub best: Option<BestSnapshot>,
    pub history: Vec<GenerationRecord>,
}

/// Receives progress of a training run.
///
/// Every method defaults to doing nothing.
pub trait TrainingObserver {
    fn on_phase_changed(&mut self, _phase: ControllerPhase) {}
    fn on_generation_started(&mut self, _generation: usize, _max_generations: usize) {}
    fn on_progress(&mut self, _generation: usize, _completed: usize, _total: usize) {}
    fn on_unit_snapshot(
        &mut self,
        _generation: usize,
        _unit_id: usize,
        _snapshot: &EpisodeSnapshot,
    ) {
    }
    fn on_generation_completed(&mut self, _record: &GenerationRecord) {}
    fn on_new_best(&mut self, _best: &BestSnapshot) {}
    fn on_completed(&mut self, _summary: &TrainingSummary) {}
}

impl TrainingObserver for () {}

/// Persists models and statistics of a run.
pub trait ModelStore {
    type Error: fmt::Display;

    /// Called whenever a generation produces a new all-time best.
    fn save_best(&mut self, best: &BestSnapshot) -> Result<(), Self::Error>;
    /// Called once with the all-time best when the run completes.
    fn save_final(&mut self, best: &BestSnapshot) -> Result<(), Self::Error>;
    fn save_history(&mut self, history: &[GenerationRecord]) -> Result<(), Self::Error>;
}

/// Store that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullModelStore;

impl ModelStore for NullModelStore {
    type Error = Infallible;

    fn save_best(&mut self, _best: &BestSnapshot) -> Result<(), Self::Error> {
        Ok(())
    }

    fn save_final(&mut self, _best: &BestSnapshot) -> Result<(), Self::Error> {
        Ok(())
    }

    fn save_history(&mut self, _history: &[GenerationRecord]) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Drives a population through the configured number of generations.
#[derive(Debug)]
pub struct PopulationController<E = NetworkFitnessEvaluator> {
    config: TrainingConfig,
    shape: NetworkShape,
    pool: WorkerPool<E>,
    seed: u64,
    rng: Pcg32,
    phase: ControllerPhase,
    history: Vec<GenerationRecord>,
    best: Option<BestSnapshot>,
}

impl PopulationController {
    /// Creates a controller evaluating individuals as network policies.
    pub fn new(config: TrainingConfig) -> Result<Self, TrainingError> {
        config.validate()?;
        let evaluator = NetworkFitnessEvaluator::new(
            config.network_shape()?,
            config.physics.clone(),
            config.snapshot_interval.and_then(std::num::NonZeroU64::new),
        );
        Self::with_evaluator(config, evaluator)
    }
}

impl<E> PopulationController<E>
where
    E: FitnessEvaluator,
{
    /// Creates a controller with a custom fitness evaluator.
    pub fn with_evaluator(config: TrainingConfig, evaluator: E) -> Result<Self, TrainingError> {
        config.validate()?;
        let shape = config.network_shape()?;
        let pool = WorkerPool::new(evaluator, config.worker_count())
            .with_unit_timeout(config.unit_timeout());
        let seed = config.seed.unwrap_or_else(rand::random);
        Ok(Self {
            config,
            shape,
            pool,
            seed,
            rng: Pcg32::seed_from_u64(seed),
            phase: ControllerPhase::Idle,
            history: vec![],
            best: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    #[must_use]
    pub fn network_shape(&self) -> &NetworkShape {
        &self.shape
    }

    #[must_use]
    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs every generation and returns the run's results.
    pub fn run<O, S>(
        mut self,
        initial: InitialPopulation,
        observer: &mut O,
        store: &mut S,
    ) -> Result<TrainingSummary, TrainingError>
    where
        O: TrainingObserver + ?Sized,
        S: ModelStore + ?Sized,
    {
        let max_generations = self.config.max_generations;
        tracing::info!(
            seed = self.seed,
            population = self.config.population_size,
            workers = self.pool.workers().get(),
            parameters = self.shape.parameter_count(),
            max_generations,
            "starting training"
        );

        self.set_phase(ControllerPhase::Initializing, observer);
        let mut population = self.initial_population(initial);
        let mut seeds = self.draw_episode_seeds();

        for generation in 0..max_generations {
            if generation > 0 && self.config.resample_episodes {
                seeds = self.draw_episode_seeds();
            }
            observer.on_generation_started(generation, max_generations);

            self.set_phase(ControllerPhase::Evaluating, observer);
            let outcomes = self.evaluate(&population, generation, &seeds, observer)?;

            self.set_phase(ControllerPhase::Selecting, observer);
            population = population.with_outcomes(outcomes.iter().map(UnitOutcome::fitness));
            let record = self.record_generation(generation, &population, &outcomes);
            observer.on_generation_completed(&record);
            self.history.push(record);
            self.update_best(&population, generation, observer, store);

            if generation + 1 < max_generations {
                self.set_phase(ControllerPhase::Breeding, observer);
                population = self.breed(&population, generation);
            }
        }

        self.set_phase(ControllerPhase::Completed, observer);
        if let Some(best) = &self.best
            && let Err(err) = store.save_final(best)
        {
            tracing::error!(error = %err, "failed to save final model");
        }
        if let Err(err) = store.save_history(&self.history) {
            tracing::error!(error = %err, "failed to save training history");
        }

        let summary = TrainingSummary {
            seed: self.seed,
            best: self.best,
            history: self.history,
        };
        observer.on_completed(&summary);
        Ok(summary)
    }

    fn set_phase<O>(&mut self, phase: ControllerPhase, observer: &mut O)
    where
        O: TrainingObserver + ?Sized,
    {
        tracing::debug!(from = %self.phase, to = %phase, "phase transition");
        self.phase = phase;
        observer.on_phase_changed(phase);
    }

    fn initial_population(&mut self, initial: InitialPopulation) -> Population {
        let size = self.config.population_size;
        match initial {
            InitialPopulation::Resume { parameters }
                if parameters.len() == self.shape.parameter_count() =>
            {
                tracing::info!("resuming from saved parameters");
                let rate = self
                    .config
                    .schedule
                    .mutation_rate(0, self.config.max_generations);
                Population::resumed(
                    &parameters,
                    size,
                    rate,
                    self.config.mutation_sigma,
                    &mut self.rng,
                )
            }
            InitialPopulation::Resume { parameters } => {
                tracing::warn!(
                    expected = self.shape.parameter_count(),
                    actual = parameters.len(),
                    "saved parameters do not fit the network, starting from random individuals"
                );
                Population::random(&self.shape, size, &mut self.rng)
            }
            InitialPopulation::Random => Population::random(&self.shape, size, &mut self.rng),
        }
    }

    fn draw_episode_seeds(&mut self) -> Arc<[EpisodeSeed]> {
        (0..self.config.episodes_per_unit)
            .map(|_| self.rng.random())
            .collect()
    }

    fn evaluate<O>(
        &self,
        population: &Population,
        generation: usize,
        seeds: &Arc<[EpisodeSeed]>,
        observer: &mut O,
    ) -> Result<Vec<UnitOutcome>, TrainingError>
    where
        O: TrainingObserver + ?Sized,
    {
        let tasks = population
            .individuals()
            .iter()
            .enumerate()
            .map(|(individual_id, ind)| DispatchTask {
                individual_id,
                episodes_per_unit: seeds.len(),
                parameters: Arc::from(ind.parameters()),
                generation,
                max_generations: self.config.max_generations,
                episode_seeds: Arc::clone(seeds),
            })
            .collect();

        let outcomes = self.pool.dispatch(tasks, |event| match event {
            DispatchEvent::Snapshot { unit_id, snapshot } => {
                observer.on_unit_snapshot(generation, unit_id, snapshot);
            }
            DispatchEvent::Completed {
                completed, total, ..
            } => observer.on_progress(generation, completed, total),
        })?;

        for (unit_id, outcome) in outcomes.iter().enumerate() {
            match outcome {
                UnitOutcome::Fitness(_) => {}
                UnitOutcome::Failed(err) => {
                    tracing::warn!(generation, unit_id, error = %err, "evaluation unit failed");
                }
                UnitOutcome::TimedOut => {
                    tracing::warn!(generation, unit_id, "evaluation unit timed out");
                }
            }
        }
        Ok(outcomes)
    }

    fn record_generation(
        &self,
        generation: usize,
        population: &Population,
        outcomes: &[UnitOutcome],
    ) -> GenerationRecord {
        let summary = population.summary();
        let record = GenerationRecord {
            generation,
            best_fitness: summary.best,
            mean_fitness: summary.mean,
            failed_units: summary.failed,
            timed_out_units: outcomes.iter().filter(|o| o.is_timed_out()).count(),
        };
        tracing::info!(
            generation,
            max_generations = self.config.max_generations,
            best = ?record.best_fitness,
            mean = ?record.mean_fitness,
            failed = record.failed_units,
            "generation completed"
        );
        record
    }

    fn update_best<O, S>(
        &mut self,
        population: &Population,
        generation: usize,
        observer: &mut O,
        store: &mut S,
    ) where
        O: TrainingObserver + ?Sized,
        S: ModelStore + ?Sized,
    {
        let Some(candidate) = population.best() else {
            return;
        };
        let Some(fitness) = candidate.fitness() else {
            return;
        };
        if self.best.as_ref().is_some_and(|best| best.fitness >= fitness) {
            return;
        }

        let best = BestSnapshot {
            parameters: candidate.parameters().to_vec(),
            generation,
            fitness,
        };
        tracing::info!(generation, fitness, "new best individual");
        observer.on_new_best(&best);
        if let Err(err) = store.save_best(&best) {
            tracing::error!(generation, error = %err, "failed to save best model");
        }
        self.best = Some(best);
    }

    fn breed(&mut self, population: &Population, generation: usize) -> Population {
        let evolver = PopulationEvolver::for_generation(
            &self.config.schedule,
            generation,
            self.config.max_generations,
            population.len(),
            self.config.mutation_sigma,
        );
        let offspring = evolver.evolve(population, &self.shape, &mut self.rng);
        if offspring.random_refills > 0 {
            tracing::warn!(
                generation,
                refills = offspring.random_refills,
                "no evaluated parents, refilled population with random individuals"
            );
        }
        offspring.population
    }
}

#[cfg(test)]
mod tests {
    use rexolve_evaluator::evaluation_unit::EvaluationError;

    use super::*;
    use crate::dispatcher::UnitContext;

    /// Fitness is the sum of the parameters.
    #[derive(Debug)]
    struct SumFitness;

    impl FitnessEvaluator for SumFitness {
        fn evaluate(
            &self,
            task: &DispatchTask,
            _context: &mut UnitContext<'_>,
        ) -> Result<f32, EvaluationError> {
            Ok(task.parameters.iter().sum())
        }
    }

    #[derive(Debug, Default)]
    struct Recorder {
        phases: Vec<ControllerPhase>,
        progress: Vec<(usize, usize, usize)>,
        bests: Vec<f32>,
        completed: bool,
    }

    impl TrainingObserver for Recorder {
        fn on_phase_changed(&mut self, phase: ControllerPhase) {
            self.phases.push(phase);
        }
        fn on_progress(&mut self, generation: usize, completed: usize, total: usize) {
            self.progress.push((generation, completed, total));
        }
        fn on_new_best(&mut self, best: &BestSnapshot) {
            self.bests.push(best.fitness);
        }
        fn on_completed(&mut self, _summary: &TrainingSummary) {
            self.completed = true;
        }
    }

    #[derive(Debug, Default)]
    struct MemoryStore {
        saved: Vec<usize>,
        finals: usize,
        history_len: Option<usize>,
    }

    impl ModelStore for MemoryStore {
        type Error = Infallible;

        fn save_best(&mut self, best: &BestSnapshot) -> Result<(), Self::Error> {
            self.saved.push(best.generation);
            Ok(())
        }

        fn save_final(&mut self, _best: &BestSnapshot) -> Result<(), Self::Error> {
            self.finals += 1;
            Ok(())
        }

        fn save_history(&mut self, history: &[GenerationRecord]) -> Result<(), Self::Error> {
            self.history_len = Some(history.len());
            Ok(())
        }
    }

    fn config(population_size: usize, max_generations: usize) -> TrainingConfig {
        TrainingConfig {
            population_size,
            max_generations,
            seed: Some(42),
            hidden_layers: vec![],
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_phases_follow_generation_cycle() {
        let controller = PopulationController::with_evaluator(config(3, 2), SumFitness).unwrap();
        assert_eq!(controller.phase(), ControllerPhase::Idle);
        let mut recorder = Recorder::default();
        controller
            .run(InitialPopulation::Random, &mut recorder, &mut NullModelStore)
            .unwrap();
        use ControllerPhase as P;
        assert_eq!(
            recorder.phases,
            [
                P::Initializing,
                P::Evaluating,
                P::Selecting,
                P::Breeding,
                P::Evaluating,
                P::Selecting,
                P::Completed
            ]
        );
        assert!(recorder.completed);
        assert_eq!(
            recorder.progress,
            [
                (0, 1, 3),
                (0, 2, 3),
                (0, 3, 3),
                (1, 1, 3),
                (1, 2, 3),
                (1, 3, 3)
            ]
        );
    }

    #[test]
    fn test_best_improvements_are_persisted() {
        let controller = PopulationController::with_evaluator(config(6, 8), SumFitness).unwrap();
        let mut recorder = Recorder::default();
        let mut store = MemoryStore::default();
        let summary = controller
            .run(InitialPopulation::Random, &mut recorder, &mut store)
            .unwrap();

        assert_eq!(summary.history.len(), 8);
        assert!(recorder.bests.is_sorted_by(|a, b| a < b));
        assert_eq!(store.saved.len(), recorder.bests.len());
        assert_eq!(store.finals, 1);
        assert_eq!(store.history_len, Some(8));

        let best = summary.best.unwrap();
        let history_best = summary
            .history
            .iter()
            .filter_map(|r| r.best_fitness)
            .max_by(f32::total_cmp)
            .unwrap();
        assert_eq!(best.fitness, history_best);
        assert_eq!(best.parameters.iter().sum::<f32>(), best.fitness);
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = || {
            PopulationController::with_evaluator(config(5, 4), SumFitness)
                .unwrap()
                .run(InitialPopulation::Random, &mut (), &mut NullModelStore)
                .unwrap()
                .history
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_resume_with_mismatched_blob_starts_randomly() {
        let controller = PopulationController::with_evaluator(config(4, 1), SumFitness).unwrap();
        let summary = controller
            .run(
                InitialPopulation::Resume {
                    parameters: vec![1.0; 3],
                },
                &mut (),
                &mut NullModelStore,
            )
            .unwrap();
        let best = summary.best.unwrap();
        assert_eq!(best.parameters.len(), 7 * 3 + 3);
    }

    #[test]
    fn test_resume_keeps_saved_blob() {
        let blob = vec![10.0; 7 * 3 + 3];
        let controller = PopulationController::with_evaluator(config(4, 1), SumFitness).unwrap();
        let summary = controller
            .run(
                InitialPopulation::Resume {
                    parameters: blob.clone(),
                },
                &mut (),
                &mut NullModelStore,
            )
            .unwrap();
        assert_eq!(summary.history[0].failed_units, 0);
        // The unmodified blob is individual 0 and scores 240.
        assert!(summary.best.unwrap().fitness >= 239.0);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let err = PopulationController::with_evaluator(config(0, 1), SumFitness).unwrap_err();
        assert!(matches!(err, TrainingError::EmptyPopulation));
    }
}
