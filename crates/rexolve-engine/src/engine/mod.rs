//! Episode stepping for the runner game.
//!
//! [`SimulationEngine`] owns one [`EpisodeState`] and advances it frame by frame
//! according to a [`PhysicsConfig`]. Obstacle spawning is driven by a seeded
//! generator, so an episode is fully determined by its seed and the actions taken.

pub use self::{config::*, episode_state::*, simulation::*};

mod config;
mod episode_state;
mod simulation;
