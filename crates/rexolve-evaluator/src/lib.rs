//! Policies and fitness evaluation for the runner agent.
//!
//! The crate sits between the simulation and the genetic algorithm:
//!
//! 1. **Observation** ([`observation`]) - turns an
//!    [`EpisodeState`](rexolve_engine::EpisodeState) into seven normalized features.
//!
//! 2. **Network** ([`network`]) - a dense feed-forward network evaluated directly
//!    over a flat parameter blob, so that individuals stay plain `Vec<f32>`s.
//!
//! 3. **Policy** ([`policy_evaluator`]) - picks one
//!    [`Action`](rexolve_engine::Action) per frame from the network outputs.
//!
//! 4. **Evaluation unit** ([`evaluation_unit`]) - plays a batch of seeded episodes
//!    with one policy and reports the mean terminal score as fitness.
//!
//! # Architecture
//!
//! ```text
//! EvaluationUnit (fitness for training)
//!     ↓ drives
//! SimulationEngine + PolicyEvaluator (one action per frame)
//!     ↓ uses
//! observation → network forward pass → argmax
//! ```
//!
//! # Determinism
//!
//! Nothing in this crate reads a clock or an unseeded random source. Given
//! the same parameters, physics config and episode seeds, an evaluation unit
//! always returns the same fitness.

pub mod evaluation_unit;
pub mod network;
pub mod observation;
pub mod policy_evaluator;
