use serde::{Deserialize, Serialize};

/// Tunable constants of the runner game.
///
/// Distances are in pixels, velocities in pixels per nominal frame. The defaults
/// reproduce the browser game the agent is trained for.
///
/// ```
/// use rexolve_engine::PhysicsConfig;
///
/// let config = PhysicsConfig::default();
/// assert_eq!(config.min_gap(config.initial_speed), 100.0);
/// assert_eq!(config.max_gap(config.initial_speed), 300.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Duration of one nominal frame in milliseconds (60 Hz).
    pub frame_millis: f32,
    /// Width of the visible playfield; obstacles spawn at this x.
    pub field_width: f32,
    /// Fixed horizontal position of the runner.
    pub runner_x: f32,
    pub initial_speed: f32,
    pub max_speed: f32,
    /// Speed gained per nominal frame.
    pub acceleration: f32,
    /// Vertical acceleration per frame; negative pulls towards the ground.
    pub gravity: f32,
    /// Upward velocity applied when a jump starts.
    pub jump_velocity: f32,
    /// Score gained per pixel of distance.
    pub score_coefficient: f64,
    /// No obstacle spawns before the score reaches this value.
    pub clear_start_score: u64,
    pub min_gap_base: f32,
    pub max_gap_base: f32,
    /// Multiplier applied to both gap bounds.
    pub gap_coefficient: f32,
    /// Episodes are cut off after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            frame_millis: 1000.0 / 60.0,
            field_width: 600.0,
            runner_x: 50.0,
            initial_speed: 6.0,
            max_speed: 13.0,
            acceleration: 0.001,
            gravity: -0.6,
            jump_velocity: 12.0,
            score_coefficient: 0.1,
            clear_start_score: 40,
            min_gap_base: 100.0,
            max_gap_base: 300.0,
            gap_coefficient: 1.0,
            max_frames: Some(20_000),
        }
    }
}

impl PhysicsConfig {
    /// Smallest gap allowed between two obstacles at `speed`.
    ///
    /// Gaps grow proportionally with speed so the reaction time stays constant.
    #[must_use]
    pub fn min_gap(&self, speed: f32) -> f32 {
        self.gap_coefficient * self.min_gap_base * speed / self.initial_speed
    }

    /// Largest gap drawn between two obstacles at `speed`.
    #[must_use]
    pub fn max_gap(&self, speed: f32) -> f32 {
        self.gap_coefficient * self.max_gap_base * speed / self.initial_speed
    }
}
