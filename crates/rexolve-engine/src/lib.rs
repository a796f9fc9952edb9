//! Deterministic physics and collision simulation of the T-Rex endless runner.
//!
//! The engine is the fitness function of the training system: every candidate
//! policy is scored by playing episodes in a [`SimulationEngine`]. It has no
//! rendering and no wall clock; each [`SimulationEngine::step`] advances exactly
//! one nominal frame, so an episode is fully determined by its seed and the
//! sequence of actions.
//!
//! - [`core`] - geometric primitives: collision boxes, the runner, obstacles, actions
//! - [`engine`] - the per-episode stepper, its state and its tunable physics
//!
//! # Coordinates
//!
//! The playfield uses a ground-up convention: `y` is the height above the ground
//! line (`0.0`), growing upwards, and `x` grows to the right. Collision boxes are
//! anchored at the bottom-left corner of the entity that owns them.
//!
//! # Example
//!
//! ```
//! use rexolve_engine::{Action, PhysicsConfig, SimulationEngine};
//!
//! let mut engine = SimulationEngine::new(PhysicsConfig::default(), 42);
//! while !engine.state().is_terminal() {
//!     engine.step(Action::Jump).unwrap();
//! }
//! println!("score: {}", engine.state().score());
//! ```

pub use self::{core::*, engine::*};

pub mod core;
pub mod engine;

/// Internal failure while advancing an episode.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum SimulationError {
    #[display("episode already ended")]
    EpisodeEnded,
    #[display("simulation produced a non-finite {quantity}")]
    NonFiniteState { quantity: &'static str },
}
