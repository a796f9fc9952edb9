use crate::core::{
    collision_box::{CollisionBox, CollisionBoxes, boxes_from},
    obstacle::Obstacle,
};

pub const RUNNER_STANDING_WIDTH: f32 = 44.0;
pub const RUNNER_STANDING_HEIGHT: f32 = 47.0;
pub const RUNNER_DUCKING_WIDTH: f32 = 59.0;
pub const RUNNER_DUCKING_HEIGHT: f32 = 25.0;

// Head and body, then legs.
const STANDING_BOXES: [CollisionBox; 2] = [
    CollisionBox::new(1.0, 11.0, 30.0, 35.0),
    CollisionBox::new(5.0, 1.0, 20.0, 10.0),
];

const DUCKING_BOXES: [CollisionBox; 1] = [CollisionBox::new(1.0, 1.0, 55.0, 23.0)];

/// The player-controlled character.
///
/// The runner never moves horizontally; obstacles scroll towards it instead.
/// Its pose is one of standing, ducking (grounded only) or jumping.
#[derive(Debug, Clone)]
pub struct Runner {
    x: f32,
    y: f32,
    velocity_y: f32,
    width: f32,
    height: f32,
    jumping: bool,
    ducking: bool,
    boxes: CollisionBoxes,
}

impl Runner {
    /// Creates a standing runner on the ground at horizontal position `x`.
    #[must_use]
    pub fn new(x: f32) -> Self {
        Self {
            x,
            y: 0.0,
            velocity_y: 0.0,
            width: RUNNER_STANDING_WIDTH,
            height: RUNNER_STANDING_HEIGHT,
            jumping: false,
            ducking: false,
            boxes: boxes_from(&STANDING_BOXES),
        }
    }

    #[must_use]
    pub fn x(&self) -> f32 {
        self.x
    }

    /// Height of the runner's feet above the ground.
    #[must_use]
    pub fn y(&self) -> f32 {
        self.y
    }

    /// Vertical velocity, positive while rising.
    #[must_use]
    pub fn velocity_y(&self) -> f32 {
        self.velocity_y
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.height
    }

    #[must_use]
    pub fn is_jumping(&self) -> bool {
        self.jumping
    }

    #[must_use]
    pub fn is_ducking(&self) -> bool {
        self.ducking
    }

    #[must_use]
    pub fn is_grounded(&self) -> bool {
        !self.jumping
    }

    /// Collision boxes in runner-local coordinates for the current pose.
    #[must_use]
    pub fn collision_boxes(&self) -> &[CollisionBox] {
        &self.boxes
    }

    /// Collision boxes in world coordinates.
    pub fn world_boxes(&self) -> impl Iterator<Item = CollisionBox> + '_ {
        self.boxes.iter().map(|b| b.translated(self.x, self.y))
    }

    /// Starts a jump with the given upward velocity.
    ///
    /// Rejected (returns `false`) while airborne or ducking.
    pub fn try_jump(&mut self, jump_velocity: f32) -> bool {
        if self.jumping || self.ducking {
            return false;
        }
        self.jumping = true;
        self.velocity_y = jump_velocity;
        true
    }

    /// Switches to the ducking pose.
    ///
    /// Rejected (returns `false`) while airborne.
    pub fn try_duck(&mut self) -> bool {
        if self.jumping {
            return false;
        }
        if !self.ducking {
            self.ducking = true;
            self.width = RUNNER_DUCKING_WIDTH;
            self.height = RUNNER_DUCKING_HEIGHT;
            self.boxes = boxes_from(&DUCKING_BOXES);
        }
        true
    }

    /// Cancels ducking, restoring the standing pose.
    pub fn stand_up(&mut self) {
        if self.ducking {
            self.ducking = false;
            self.width = RUNNER_STANDING_WIDTH;
            self.height = RUNNER_STANDING_HEIGHT;
            self.boxes = boxes_from(&STANDING_BOXES);
        }
    }

    /// Integrates vertical motion over `ratio` nominal frames.
    ///
    /// `gravity` is negative in the ground-up convention. Landing clamps the
    /// runner exactly onto the ground.
    pub fn update(&mut self, gravity: f32, ratio: f32) {
        if !self.jumping {
            return;
        }
        self.velocity_y += gravity * ratio;
        self.y += self.velocity_y * ratio;
        if self.y <= 0.0 {
            self.y = 0.0;
            self.velocity_y = 0.0;
            self.jumping = false;
        }
    }

    /// Returns `true` if any runner sub-box overlaps any obstacle sub-box.
    #[must_use]
    pub fn collides_with(&self, obstacle: &Obstacle) -> bool {
        self.world_boxes().any(|runner_box| {
            obstacle
                .world_boxes()
                .any(|obstacle_box| runner_box.overlaps(&obstacle_box))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAVITY: f32 = -0.6;
    const JUMP_VELOCITY: f32 = 12.0;

    #[test]
    fn test_duck_changes_dimensions_and_blocks_jump() {
        let mut runner = Runner::new(50.0);
        assert!(runner.try_duck());
        assert!(runner.is_ducking());
        assert_eq!(runner.height(), RUNNER_DUCKING_HEIGHT);
        assert_eq!(runner.width(), RUNNER_DUCKING_WIDTH);

        assert!(!runner.try_jump(JUMP_VELOCITY));
        assert!(!runner.is_jumping());
        assert_eq!(runner.velocity_y(), 0.0);

        runner.stand_up();
        assert_eq!(runner.height(), RUNNER_STANDING_HEIGHT);
        assert!(runner.try_jump(JUMP_VELOCITY));
    }

    #[test]
    fn test_duck_rejected_while_airborne() {
        let mut runner = Runner::new(50.0);
        assert!(runner.try_jump(JUMP_VELOCITY));
        runner.update(GRAVITY, 1.0);
        assert!(!runner.try_duck());
        assert!(!runner.is_ducking());
        assert_eq!(runner.height(), RUNNER_STANDING_HEIGHT);
    }

    #[test]
    fn test_jump_lands_exactly_on_ground() {
        let mut runner = Runner::new(50.0);
        assert!(runner.try_jump(JUMP_VELOCITY));
        let mut peak: f32 = 0.0;
        for _ in 0..200 {
            runner.update(GRAVITY, 1.0);
            assert!(runner.y() >= 0.0);
            peak = peak.max(runner.y());
            if runner.is_grounded() {
                break;
            }
        }
        assert!(runner.is_grounded());
        assert_eq!(runner.y(), 0.0);
        assert_eq!(runner.velocity_y(), 0.0);
        assert!(peak > 100.0, "peak = {peak}");
    }

    #[test]
    fn test_second_jump_rejected_mid_air() {
        let mut runner = Runner::new(50.0);
        assert!(runner.try_jump(JUMP_VELOCITY));
        runner.update(GRAVITY, 1.0);
        let velocity = runner.velocity_y();
        assert!(!runner.try_jump(JUMP_VELOCITY));
        assert_eq!(runner.velocity_y(), velocity);
    }
}
