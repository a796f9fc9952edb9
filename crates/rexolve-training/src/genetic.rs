//! Genetic algorithm over policy network parameter blobs.
//!
//! This module implements the population model and the selection and breeding
//! steps of the training loop. Fitness evaluation itself is dispatched elsewhere
//! ([`dispatcher`](crate::dispatcher)); here a [`Population`] only receives the
//! resulting outcomes.
//!
//! # Algorithm Overview
//!
//! 1. **Evaluate Fitness** - Each individual plays seeded episodes; fitness is the mean score
//! 2. **Rank** - Individuals are ordered by fitness, failed evaluations last
//! 3. **Elite Selection** - Top [`elite_count`] evaluated individuals are cloned unchanged
//! 4. **Tournament Selection** - Two parents are picked from the evaluated population
//! 5. **Crossover** - Uniform crossover of the parents' blobs
//! 6. **Mutation** - Sparse Gaussian noise on the child
//!
//! # Key Components
//!
//! - [`Individual`] - A parameter blob plus its fitness, if known
//! - [`Population`] - Fixed-size collection of individuals of one generation
//! - [`PopulationEvolver`] - Operator parameters of one generation and the breeding step
//!
//! # Failed Individuals
//!
//! An individual whose evaluation failed or timed out has no fitness. It ranks
//! below every evaluated individual, is never an elite and never wins a
//! tournament. If no individual of a generation was evaluated, breeding refills
//! the population with fresh random individuals instead.
//!
//! # Immutability
//!
//! Evolution never edits a population in place: [`PopulationEvolver::evolve`]
//! builds a new [`Population`], and elites are copies whose fitness is cleared
//! so they are re-evaluated alongside their offspring.

use std::cmp::Ordering;

use rand::{
    Rng,
    seq::{IndexedRandom, IteratorRandom},
};
use rexolve_evaluator::network::NetworkShape;

use crate::{
    schedule::{AdaptiveSchedule, GenerationRates},
    weights,
};

/// A candidate policy: a parameter blob and its fitness.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    parameters: Vec<f32>,
    fitness: Option<f32>,
}

impl Individual {
    /// Creates an unevaluated individual.
    #[must_use]
    pub fn new(parameters: Vec<f32>) -> Self {
        Self {
            parameters,
            fitness: None,
        }
    }

    /// Creates an unevaluated individual with freshly initialized parameters.
    pub fn random<R>(shape: &NetworkShape, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::new(shape.random_parameters(rng))
    }

    #[must_use]
    pub fn parameters(&self) -> &[f32] {
        &self.parameters
    }

    /// Mean episode score, or `None` if not evaluated or the evaluation failed.
    #[must_use]
    pub fn fitness(&self) -> Option<f32> {
        self.fitness
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    fn cmp_fitness(&self, other: &Self) -> Ordering {
        match (self.fitness, other.fitness) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    }
}

/// Fitness statistics of an evaluated population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessSummary {
    pub best: Option<f32>,
    pub mean: Option<f32>,
    pub evaluated: usize,
    pub failed: usize,
}

/// The individuals of one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    individuals: Vec<Individual>,
}

impl Population {
    #[must_use]
    pub fn new(individuals: Vec<Individual>) -> Self {
        Self { individuals }
    }

    /// Creates `size` random individuals.
    pub fn random<R>(shape: &NetworkShape, size: usize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let individuals = (0..size).map(|_| Individual::random(shape, rng)).collect();
        Self { individuals }
    }

    /// Seeds a population from a previously trained blob.
    ///
    /// The first individual is the blob itself; the other `size - 1` are
    /// mutated copies of it.
    pub fn resumed<R>(
        parameters: &[f32],
        size: usize,
        mutation_rate: f32,
        mutation_sigma: f32,
        rng: &mut R,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        let individuals = (0..size)
            .map(|i| {
                let mut blob = parameters.to_vec();
                if i > 0 {
                    weights::mutate(&mut blob, mutation_rate, mutation_sigma, rng);
                }
                Individual::new(blob)
            })
            .collect();
        Self { individuals }
    }

    #[must_use]
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Attaches evaluation outcomes, in individual order.
    ///
    /// Non-finite fitness values are treated as failures. Individuals without a
    /// matching outcome are left unevaluated.
    #[must_use]
    pub fn with_outcomes<I>(mut self, outcomes: I) -> Self
    where
        I: IntoIterator<Item = Option<f32>>,
    {
        for (ind, fitness) in self.individuals.iter_mut().zip(outcomes) {
            ind.fitness = fitness.filter(|f| f.is_finite());
        }
        self
    }

    /// Individuals ordered by fitness descending, failed ones last.
    ///
    /// The sort is stable, so equal fitness keeps population order.
    #[must_use]
    pub fn ranked(&self) -> Vec<&Individual> {
        let mut ranked: Vec<_> = self.individuals.iter().collect();
        ranked.sort_by(|a, b| b.cmp_fitness(a));
        ranked
    }

    /// The fittest evaluated individual.
    #[must_use]
    pub fn best(&self) -> Option<&Individual> {
        self.ranked().into_iter().next().filter(|ind| ind.is_evaluated())
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn summary(&self) -> FitnessSummary {
        let fitnesses: Vec<f32> = self.individuals.iter().filter_map(|i| i.fitness).collect();
        let evaluated = fitnesses.len();
        let mean = (evaluated > 0).then(|| {
            let total: f64 = fitnesses.iter().map(|&f| f64::from(f)).sum();
            (total / evaluated as f64) as f32
        });
        FitnessSummary {
            best: fitnesses.iter().copied().max_by(f32::total_cmp),
            mean,
            evaluated,
            failed: self.individuals.len() - evaluated,
        }
    }
}

/// Number of individuals carried over unchanged: 20% of the population, at least one.
///
/// ```
/// use rexolve_training::genetic::elite_count;
///
/// assert_eq!(elite_count(1), 1);
/// assert_eq!(elite_count(9), 1);
/// assert_eq!(elite_count(10), 2);
/// assert_eq!(elite_count(31), 6);
/// ```
#[must_use]
pub fn elite_count(population_size: usize) -> usize {
    usize::max(1, population_size / 5)
}

/// Selects a parent by tournament.
///
/// Draws `tournament_size` individuals uniformly with replacement and returns
/// the fittest evaluated one. If every draw hit a failed individual, the winner
/// is drawn uniformly among the evaluated individuals instead. Returns `None`
/// only when no individual is evaluated.
pub fn tournament_select<'a, R>(
    population: &'a [Individual],
    tournament_size: usize,
    rng: &mut R,
) -> Option<&'a Individual>
where
    R: Rng + ?Sized,
{
    let winner = (0..tournament_size.max(1))
        .filter_map(|_| population.choose(rng))
        .filter(|ind| ind.is_evaluated())
        .max_by(|a, b| a.cmp_fitness(b));
    winner.or_else(|| {
        population
            .iter()
            .filter(|ind| ind.is_evaluated())
            .choose(rng)
    })
}

/// Operator parameters for breeding one generation.
#[derive(Debug, Clone)]
pub struct PopulationEvolver {
    /// Number of top individuals preserved unchanged (elitism)
    pub elite_count: usize,
    /// Tournament size for selection (larger = stronger selection pressure)
    pub tournament_size: usize,
    /// Probability of taking each element from the first parent
    pub crossover_rate: f32,
    /// Probability of mutating each element
    pub mutation_rate: f32,
    /// Standard deviation for Gaussian mutation noise
    pub mutation_sigma: f32,
}

/// Result of breeding one generation.
#[derive(Debug, Clone)]
pub struct Offspring {
    pub population: Population,
    /// Slots filled with fresh random individuals because no parent was available.
    pub random_refills: usize,
}

impl PopulationEvolver {
    /// Builds the evolver for `generation` from an adaptive schedule.
    #[must_use]
    pub fn for_generation(
        schedule: &AdaptiveSchedule,
        generation: usize,
        max_generations: usize,
        population_size: usize,
        mutation_sigma: f32,
    ) -> Self {
        let GenerationRates {
            mutation_rate,
            crossover_rate,
            tournament_size,
        } = schedule.rates(generation, max_generations);
        Self {
            elite_count: elite_count(population_size),
            tournament_size,
            crossover_rate,
            mutation_rate,
            mutation_sigma,
        }
    }

    /// Breeds the next generation from an evaluated population.
    ///
    /// 1. Copies the top `elite_count` evaluated individuals with fitness cleared
    /// 2. Fills the remaining slots with mutated crossover children of tournament winners
    /// 3. Falls back to random individuals when no parent can be selected
    ///
    /// The returned population has the same size as the input.
    pub fn evolve<R>(
        &self,
        population: &Population,
        shape: &NetworkShape,
        rng: &mut R,
    ) -> Offspring
    where
        R: Rng + ?Sized,
    {
        let size = population.len();
        let mut next_individuals = Vec::with_capacity(size);

        // elite selection
        next_individuals.extend(
            population
                .ranked()
                .into_iter()
                .filter(|ind| ind.is_evaluated())
                .take(self.elite_count.min(size))
                .map(|ind| Individual::new(ind.parameters.clone())),
        );

        // generate the rest individuals
        let mut random_refills = 0;
        while next_individuals.len() < size {
            let parents = tournament_select(&population.individuals, self.tournament_size, rng)
                .zip(tournament_select(
                    &population.individuals,
                    self.tournament_size,
                    rng,
                ));
            let Some((p1, p2)) = parents else {
                random_refills += 1;
                next_individuals.push(Individual::random(shape, rng));
                continue;
            };

            let mut child =
                weights::crossover(&p1.parameters, &p2.parameters, self.crossover_rate, rng);
            weights::mutate(&mut child, self.mutation_rate, self.mutation_sigma, rng);
            next_individuals.push(Individual::new(child));
        }

        Offspring {
            population: Population::new(next_individuals),
            random_refills,
        }
    }
}
