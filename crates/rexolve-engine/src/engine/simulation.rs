use std::time::Duration;

use rand::prelude::*;
use rand_pcg::Pcg32;

use crate::{
    SimulationError,
    core::{
        action::Action,
        obstacle::{Obstacle, ObstacleKind},
    },
};

use super::{
    config::PhysicsConfig,
    episode_state::{EpisodeState, Termination},
};

/// Seed of one episode's obstacle generator.
pub type EpisodeSeed = u64;

/// Single-threaded stepper for one episode of the runner game.
///
/// Each engine exclusively owns its [`EpisodeState`] and its random generator;
/// two engines built with the same config and seed produce identical episodes
/// for identical action sequences.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    config: PhysicsConfig,
    rng: Pcg32,
    state: EpisodeState,
    pending_gap: Option<f32>,
    next_spawn_index: u64,
}

impl SimulationEngine {
    #[must_use]
    pub fn new(config: PhysicsConfig, seed: EpisodeSeed) -> Self {
        let state = EpisodeState::new(config.runner_x, config.initial_speed);
        Self {
            config,
            rng: Pcg32::seed_from_u64(seed),
            state,
            pending_gap: None,
            next_spawn_index: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> &EpisodeState {
        &self.state
    }

    /// Gap the next obstacle waits for, if one has been drawn.
    #[must_use]
    pub fn pending_gap(&self) -> Option<f32> {
        self.pending_gap
    }

    /// Restarts the episode, continuing the current random stream.
    pub fn reset(&mut self) {
        self.state = EpisodeState::new(self.config.runner_x, self.config.initial_speed);
        self.pending_gap = None;
        self.next_spawn_index = 0;
    }

    /// Restarts the episode with a fresh random stream.
    pub fn reset_with_seed(&mut self, seed: EpisodeSeed) {
        self.rng = Pcg32::seed_from_u64(seed);
        self.reset();
    }

    /// Places an obstacle at the end of the spawn queue.
    ///
    /// Used to script scenarios; regular spawning keeps working afterwards.
    pub fn spawn_obstacle(&mut self, mut make: impl FnMut(u64) -> Obstacle) {
        let obstacle = make(self.next_spawn_index);
        self.next_spawn_index += 1;
        self.state.obstacles.push_back(obstacle);
    }

    /// Advances the episode by one nominal frame.
    pub fn step(&mut self, action: Action) -> Result<&EpisodeState, SimulationError> {
        self.advance(action, 1.0)
    }

    /// Advances the episode by an arbitrary wall-clock duration.
    ///
    /// All per-frame deltas are scaled by `elapsed / frame_millis`.
    pub fn step_elapsed(
        &mut self,
        action: Action,
        elapsed: Duration,
    ) -> Result<&EpisodeState, SimulationError> {
        let ratio = elapsed.as_secs_f32() * 1000.0 / self.config.frame_millis;
        self.advance(action, ratio)
    }

    fn advance(&mut self, action: Action, ratio: f32) -> Result<&EpisodeState, SimulationError> {
        if self.state.is_terminal() {
            return Err(SimulationError::EpisodeEnded);
        }

        self.apply_action(action);
        self.state.runner.update(self.config.gravity, ratio);
        self.update_obstacles(ratio);
        self.state.frame += 1;

        if self.is_colliding() {
            self.state.termination = Some(Termination::Collision);
        } else {
            let state = &mut self.state;
            state.distance += f64::from(state.speed * ratio);
            let score = score_from_distance(state.distance, self.config.score_coefficient);
            state.score = state.score.max(score);
            state.speed = f32::min(
                state.speed + self.config.acceleration * ratio,
                self.config.max_speed,
            )
            .max(state.speed);
        }

        self.check_finite()?;

        if !self.state.is_terminal()
            && self
                .config
                .max_frames
                .is_some_and(|limit| self.state.frame >= limit)
        {
            self.state.termination = Some(Termination::FrameLimit);
        }

        Ok(&self.state)
    }

    fn apply_action(&mut self, action: Action) {
        let runner = &mut self.state.runner;
        match action {
            Action::Jump => {
                runner.try_jump(self.config.jump_velocity);
            }
            Action::Duck => {
                runner.try_duck();
            }
            Action::Run => runner.stand_up(),
        }
    }

    fn update_obstacles(&mut self, ratio: f32) {
        let dx = self.state.speed * ratio;
        for obstacle in &mut self.state.obstacles {
            obstacle.scroll(dx);
        }
        self.state.obstacles.retain(|o| !o.is_off_screen());

        if self.should_spawn() {
            let kinds = ObstacleKind::unlocked(self.state.score);
            if let Some(&kind) = kinds.choose(&mut self.rng) {
                let x = self.config.field_width;
                self.spawn_obstacle(|index| Obstacle::new(kind, x, index));
            }
            self.pending_gap = None;
        }
    }

    fn should_spawn(&mut self) -> bool {
        if self.state.score < self.config.clear_start_score {
            return false;
        }
        let Some(last) = self.state.obstacles.back() else {
            return true;
        };
        let last_right = last.right();
        let speed = self.state.speed;
        let gap = *self.pending_gap.get_or_insert_with(|| {
            let min = self.config.min_gap(speed);
            let max = f32::max(self.config.max_gap(speed), min);
            self.rng.random_range(min..=max)
        });
        last_right < self.config.field_width - gap
    }

    fn is_colliding(&self) -> bool {
        let runner = &self.state.runner;
        self.state.obstacles.iter().any(|o| runner.collides_with(o))
    }

    fn check_finite(&self) -> Result<(), SimulationError> {
        let runner = &self.state.runner;
        let checks = [
            ("runner position", runner.y().is_finite()),
            ("runner velocity", runner.velocity_y().is_finite()),
            ("speed", self.state.speed.is_finite()),
            ("distance", self.state.distance.is_finite()),
        ];
        match checks.into_iter().find(|(_, ok)| !ok) {
            Some((quantity, _)) => Err(SimulationError::NonFiniteState { quantity }),
            None => Ok(()),
        }
    }
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn score_from_distance(distance: f64, coefficient: f64) -> u64 {
    (distance * coefficient).floor().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collision_box::CollisionBox;

    fn no_obstacles() -> PhysicsConfig {
        PhysicsConfig {
            clear_start_score: u64::MAX,
            max_frames: None,
            ..PhysicsConfig::default()
        }
    }

    #[test]
    fn test_reset_clears_episode() {
        let mut engine = SimulationEngine::new(PhysicsConfig::default(), 1);
        for _ in 0..200 {
            if engine.step(Action::Run).unwrap().is_terminal() {
                break;
            }
        }
        assert!(engine.state().score() > 0);

        engine.reset();
        let state = engine.state();
        assert_eq!(state.score(), 0);
        assert_eq!(state.frame(), 0);
        assert_eq!(state.obstacles().len(), 0);
        assert_eq!(state.speed(), engine.config().initial_speed);
        assert!(state.runner().is_grounded());
        assert!(engine.pending_gap().is_none());
    }

    #[test]
    fn test_score_is_monotonic_within_episode() {
        let mut engine = SimulationEngine::new(PhysicsConfig::default(), 7);
        let mut last_score = 0;
        let actions = [Action::Run, Action::Jump, Action::Duck, Action::Run];
        for i in 0.. {
            let state = engine.step(actions[i % actions.len()]).unwrap();
            assert!(state.score() >= last_score);
            last_score = state.score();
            if state.is_terminal() {
                break;
            }
        }
    }

    #[test]
    fn test_runner_never_below_ground() {
        let mut engine = SimulationEngine::new(no_obstacles(), 3);
        for i in 0..2_000 {
            let action = if i % 7 == 0 { Action::Jump } else { Action::Run };
            let state = engine.step(action).unwrap();
            assert!(state.runner().y() >= 0.0);
        }
    }

    #[test]
    fn test_speed_approaches_but_never_exceeds_max() {
        let config = PhysicsConfig {
            acceleration: 0.01,
            ..no_obstacles()
        };
        let mut engine = SimulationEngine::new(config, 0);
        let mut last_speed = engine.state().speed();
        assert_eq!(last_speed, 6.0);
        for _ in 0..5_000 {
            let speed = engine.step(Action::Run).unwrap().speed();
            assert!(speed >= last_speed);
            assert!(speed <= 13.0);
            last_speed = speed;
        }
        assert!((last_speed - 13.0).abs() < 1e-4);
    }

    #[test]
    fn test_duck_then_jump_is_rejected_until_cancelled() {
        let mut engine = SimulationEngine::new(no_obstacles(), 0);
        let state = engine.step(Action::Duck).unwrap();
        assert!(state.runner().is_ducking());
        assert_eq!(state.runner().height(), crate::RUNNER_DUCKING_HEIGHT);

        let state = engine.step(Action::Jump).unwrap();
        assert!(!state.runner().is_jumping());
        assert!(state.runner().is_ducking());

        let state = engine.step(Action::Run).unwrap();
        assert!(!state.runner().is_ducking());
        let state = engine.step(Action::Jump).unwrap();
        assert!(state.runner().is_jumping());
        assert!(state.runner().y() > 0.0);
    }

    #[test]
    fn test_collision_terminates_episode() {
        let mut engine = SimulationEngine::new(no_obstacles(), 0);
        // After one frame of scrolling at speed 6 the obstacle sits at x = 54,
        // overlapping the runner's body box.
        engine.spawn_obstacle(|index| {
            Obstacle::custom(
                60.0,
                0.0,
                30.0,
                35.0,
                &[CollisionBox::new(0.0, 0.0, 30.0, 35.0)],
                index,
            )
        });
        let state = engine.step(Action::Run).unwrap();
        assert_eq!(state.termination(), Some(Termination::Collision));
        assert_eq!(state.score(), 0);
        assert_eq!(
            engine.step(Action::Run).unwrap_err(),
            SimulationError::EpisodeEnded
        );
    }

    #[test]
    fn test_obstacles_spawn_in_order_and_leave_screen() {
        let config = PhysicsConfig {
            clear_start_score: 0,
            max_frames: None,
            ..PhysicsConfig::default()
        };
        let mut engine = SimulationEngine::new(config, 11);
        let mut removed_up_to = None;
        for _ in 0..400 {
            let Ok(state) = engine.step(Action::Run) else {
                break;
            };
            let indices: Vec<_> = state.obstacles().map(Obstacle::spawn_index).collect();
            assert!(indices.is_sorted(), "{indices:?}");
            assert!(state.obstacles().all(|o| !o.is_off_screen()));
            if let Some(&first) = indices.first() {
                if let Some(prev) = removed_up_to {
                    assert!(first >= prev);
                }
                removed_up_to = Some(first);
            }
            if state.is_terminal() {
                break;
            }
        }
        assert!(removed_up_to.is_some());
    }

    #[test]
    fn test_at_most_one_pending_gap_and_spacing_respected() {
        let config = PhysicsConfig {
            clear_start_score: 0,
            max_frames: None,
            ..PhysicsConfig::default()
        };
        let mut engine = SimulationEngine::new(config.clone(), 5);
        engine.spawn_obstacle(|index| Obstacle::new(ObstacleKind::SmallCactus, 600.0, index));
        let mut spawned = 1;
        while spawned < 3 {
            let gap_before = engine.pending_gap();
            let count_before = engine.state().obstacles().len();
            let state = engine.step(Action::Jump).unwrap();
            if state.obstacles().len() > count_before {
                spawned += 1;
                let mut obstacles = engine.state().obstacles().rev();
                let newest = obstacles.next().unwrap();
                let previous = obstacles.next().unwrap();
                assert!(config.field_width - previous.right() >= gap_before.unwrap_or_default());
                assert_eq!(newest.x(), config.field_width);
                assert!(engine.pending_gap().is_none());
            }
            if engine.state().is_terminal() {
                break;
            }
        }
    }

    #[test]
    fn test_same_seed_same_episode() {
        let run = |seed| {
            let mut engine = SimulationEngine::new(PhysicsConfig::default(), seed);
            let mut frames = 0;
            while !engine.step(Action::Run).unwrap().is_terminal() {
                frames += 1;
            }
            (frames, engine.state().score())
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn test_frame_limit_truncates_episode() {
        let config = PhysicsConfig {
            max_frames: Some(10),
            ..no_obstacles()
        };
        let mut engine = SimulationEngine::new(config, 0);
        for _ in 0..9 {
            assert!(!engine.step(Action::Run).unwrap().is_terminal());
        }
        let state = engine.step(Action::Run).unwrap();
        assert_eq!(state.termination(), Some(Termination::FrameLimit));
    }

    #[test]
    fn test_elapsed_time_scales_motion() {
        let mut nominal = SimulationEngine::new(no_obstacles(), 0);
        let mut doubled = SimulationEngine::new(no_obstacles(), 0);
        nominal.step(Action::Run).unwrap();
        nominal.step(Action::Run).unwrap();
        let frame = Duration::from_secs_f32(2.0 / 60.0);
        doubled.step_elapsed(Action::Run, frame).unwrap();
        let a = nominal.state().distance();
        let b = doubled.state().distance();
        assert!((a - b).abs() < 1e-2, "{a} vs {b}");
    }

    #[test]
    fn test_zero_frame_duration_is_reported() {
        let config = PhysicsConfig {
            frame_millis: 0.0,
            ..no_obstacles()
        };
        let mut engine = SimulationEngine::new(config, 0);
        let err = engine
            .step_elapsed(Action::Run, Duration::from_millis(16))
            .unwrap_err();
        assert!(matches!(err, SimulationError::NonFiniteState { .. }));
    }
}
