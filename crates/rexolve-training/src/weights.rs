//! Parameter blob operations for the genetic algorithm.
//!
//! Individuals are flat `Vec<f32>` blobs laid out as described in
//! [`rexolve_evaluator::network`]. The operators here work element by element
//! and never look at the layer structure, so any two blobs of the same network
//! shape can be recombined.
//!
//! # Operations
//!
//! - **Crossover**: [`crossover`] implements uniform crossover with a biased mask
//! - **Mutation**: [`mutate`] applies sparse Gaussian noise
//!
//! # Design Decisions
//!
//! ## Uniform Crossover
//!
//! Each element of the child is copied from the first parent with probability
//! `rate`, otherwise from the second. With `rate` close to 1 the child is mostly
//! a clone of the first parent, so lowering the rate over the run shifts breeding
//! from cloning towards recombination.
//!
//! Unlike blending operators, uniform crossover never produces values outside the
//! parents' range; new values only come from mutation.
//!
//! ## Gaussian Mutation
//!
//! - **Gradual refinement**: Small changes are more likely than large jumps
//! - **Unbounded**: Network weights have no natural range, so results are not clamped
//! - **Sparse**: `rate` controls how many elements are touched
//!
//! # Related
//!
//! - [`genetic`](crate::genetic) module uses these operations to breed populations
//! - [`schedule`](crate::schedule) supplies the per-generation rates

use rand::Rng;
use rand_distr::StandardNormal;

/// Builds a child by picking each element from one of two parents.
///
/// For each index `i` a uniform sample `u` in `[0, 1)` is drawn; the child takes
/// `a[i]` when `u < rate` and `b[i]` otherwise.
///
/// # Panics
///
/// Panics if the parents have different lengths.
///
/// # Examples
///
/// ```
/// use rand::SeedableRng as _;
/// use rand_pcg::Pcg32;
/// use rexolve_training::weights;
///
/// let mut rng = Pcg32::seed_from_u64(0);
/// let child = weights::crossover(&[1.0; 4], &[2.0; 4], 1.0, &mut rng);
/// assert_eq!(child, vec![1.0; 4]);
/// ```
pub fn crossover<R>(a: &[f32], b: &[f32], rate: f32, rng: &mut R) -> Vec<f32>
where
    R: Rng + ?Sized,
{
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(&x, &y)| if rng.random::<f32>() < rate { x } else { y })
        .collect()
}

/// Applies Gaussian mutation to a parameter blob in-place.
///
/// Each element, with probability `rate`, receives additive noise drawn from
/// `N(0, sigma)`.
///
/// # Arguments
///
/// * `blob` - Parameters to mutate (modified in-place)
/// * `rate` - Probability of mutating each element (scheduled 0.3 → 0.01)
/// * `sigma` - Standard deviation of the noise (typical: 0.1)
/// * `rng` - Random number generator
pub fn mutate<R>(blob: &mut [f32], rate: f32, sigma: f32, rng: &mut R)
where
    R: Rng + ?Sized,
{
    for w in blob {
        if rng.random::<f32>() < rate {
            let z: f32 = rng.sample(StandardNormal);
            *w += z * sigma;
        }
    }
}
