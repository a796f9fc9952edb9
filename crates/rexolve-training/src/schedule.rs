//! Generation-dependent genetic operator parameters.
//!
//! Early generations explore (high mutation, high crossover, weak selection
//! pressure); late generations exploit (rare mutation, more cloning, larger
//! tournaments). Every parameter moves linearly from its initial to its final
//! value as `generation / max_generations` goes from 0 to 1.
//!
//! All functions here are pure: the same `(generation, max_generations)` always
//! yields the same rates.

use serde::{Deserialize, Serialize};

/// Linear schedules for mutation rate, crossover rate and tournament size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveSchedule {
    pub initial_mutation_rate: f32,
    pub final_mutation_rate: f32,
    pub initial_crossover_rate: f32,
    pub final_crossover_rate: f32,
    pub initial_tournament_size: usize,
    pub final_tournament_size: usize,
}

impl Default for AdaptiveSchedule {
    fn default() -> Self {
        Self {
            initial_mutation_rate: 0.3,
            final_mutation_rate: 0.01,
            initial_crossover_rate: 0.9,
            final_crossover_rate: 0.6,
            initial_tournament_size: 2,
            final_tournament_size: 5,
        }
    }
}

/// Operator parameters in effect for one generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationRates {
    pub mutation_rate: f32,
    pub crossover_rate: f32,
    pub tournament_size: usize,
}

/// Smallest tournament the schedule ever produces.
pub const MIN_TOURNAMENT_SIZE: usize = 2;

impl AdaptiveSchedule {
    /// Per-element mutation probability.
    ///
    /// ```
    /// use rexolve_training::schedule::AdaptiveSchedule;
    ///
    /// let schedule = AdaptiveSchedule::default();
    /// assert_eq!(schedule.mutation_rate(0, 300), 0.3);
    /// assert_eq!(schedule.mutation_rate(300, 300), 0.01);
    /// ```
    #[must_use]
    pub fn mutation_rate(&self, generation: usize, max_generations: usize) -> f32 {
        lerp(
            self.initial_mutation_rate,
            self.final_mutation_rate,
            progress(generation, max_generations),
        )
    }

    /// Probability of taking each element from the first parent.
    #[must_use]
    pub fn crossover_rate(&self, generation: usize, max_generations: usize) -> f32 {
        lerp(
            self.initial_crossover_rate,
            self.final_crossover_rate,
            progress(generation, max_generations),
        )
    }

    /// Number of draws per tournament, floored and never below
    /// [`MIN_TOURNAMENT_SIZE`].
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn tournament_size(&self, generation: usize, max_generations: usize) -> usize {
        let size = lerp(
            self.initial_tournament_size as f32,
            self.final_tournament_size as f32,
            progress(generation, max_generations),
        );
        (size.floor() as usize).max(MIN_TOURNAMENT_SIZE)
    }

    #[must_use]
    pub fn rates(&self, generation: usize, max_generations: usize) -> GenerationRates {
        GenerationRates {
            mutation_rate: self.mutation_rate(generation, max_generations),
            crossover_rate: self.crossover_rate(generation, max_generations),
            tournament_size: self.tournament_size(generation, max_generations),
        }
    }
}

#[expect(clippy::cast_precision_loss)]
fn progress(generation: usize, max_generations: usize) -> f32 {
    if max_generations == 0 {
        return 1.0;
    }
    (generation as f32 / max_generations as f32).clamp(0.0, 1.0)
}

fn lerp(start: f32, end: f32, t: f32) -> f32 {
    start * (1.0 - t) + end * t
}
