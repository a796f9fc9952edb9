//! Feature extraction from an episode state.
//!
//! The policy network sees the game through a fixed vector of
//! [`OBSERVATION_LEN`] normalized features:
//!
//! | index | feature                                                    |
//! |-------|------------------------------------------------------------|
//! | 0     | `(runner_y + MAX_JUMP_HEIGHT) / MAX_JUMP_HEIGHT`           |
//! | 1     | `runner_velocity_y / MAX_VELOCITY_Y`                       |
//! | 2     | `(obstacle_x - runner_x) / MAX_DISTANCE`, `1.0` if none    |
//! | 3     | `obstacle_width / OBSTACLE_SCALE`, `0.0` if none           |
//! | 4     | `obstacle_height / OBSTACLE_SCALE`, `0.0` if none          |
//! | 5     | `1.0` if an obstacle is ahead, else `0.0`                  |
//! | 6     | `1.0` if the runner is on the ground, else `0.0`           |
//!
//! The obstacle features describe the
//! [nearest obstacle](rexolve_engine::EpisodeState::nearest_obstacle): the first one,
//! in spawn order, whose trailing edge is still ahead of the runner.

use rexolve_engine::EpisodeState;

pub const OBSERVATION_LEN: usize = 7;

pub const MAX_JUMP_HEIGHT: f32 = 100.0;
pub const MAX_VELOCITY_Y: f32 = 20.0;
pub const MAX_DISTANCE: f32 = 600.0;
pub const OBSTACLE_SCALE: f32 = 50.0;

pub type Observation = [f32; OBSERVATION_LEN];

#[must_use]
pub fn observe(state: &EpisodeState) -> Observation {
    let runner = state.runner();
    let (distance, width, height, present) = match state.nearest_obstacle() {
        Some(obstacle) => (
            (obstacle.x() - runner.x()) / MAX_DISTANCE,
            obstacle.width() / OBSTACLE_SCALE,
            obstacle.height() / OBSTACLE_SCALE,
            1.0,
        ),
        None => (1.0, 0.0, 0.0, 0.0),
    };
    [
        (runner.y() + MAX_JUMP_HEIGHT) / MAX_JUMP_HEIGHT,
        runner.velocity_y() / MAX_VELOCITY_Y,
        distance,
        width,
        height,
        present,
        if runner.is_grounded() { 1.0 } else { 0.0 },
    ]
}
