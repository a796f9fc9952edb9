use arrayvec::ArrayVec;

use crate::core::collision_box::{CollisionBox, CollisionBoxes, boxes_from};

/// Obstacle variants the spawner can draw from.
///
/// Larger variants are unlocked as the score grows; see [`ObstacleKind::min_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ObstacleKind {
    #[display("small cactus")]
    SmallCactus,
    #[display("large cactus")]
    LargeCactus,
    #[display("cactus cluster")]
    CactusCluster,
    /// Flies low enough that a standing runner hits it; ducking passes under.
    #[display("bird")]
    Bird,
}

impl ObstacleKind {
    pub const LEN: usize = 4;
    pub const ALL: [Self; Self::LEN] = [
        Self::SmallCactus,
        Self::LargeCactus,
        Self::CactusCluster,
        Self::Bird,
    ];

    /// Score from which this variant may spawn.
    #[must_use]
    pub const fn min_score(self) -> u64 {
        match self {
            Self::SmallCactus => 0,
            Self::LargeCactus => 100,
            Self::CactusCluster => 200,
            Self::Bird => 300,
        }
    }

    #[must_use]
    pub const fn width(self) -> f32 {
        match self {
            Self::SmallCactus => 17.0,
            Self::LargeCactus => 25.0,
            Self::CactusCluster => 51.0,
            Self::Bird => 46.0,
        }
    }

    #[must_use]
    pub const fn height(self) -> f32 {
        match self {
            Self::SmallCactus | Self::CactusCluster => 35.0,
            Self::LargeCactus => 50.0,
            Self::Bird => 40.0,
        }
    }

    /// Height of the obstacle's bottom edge above the ground.
    #[must_use]
    pub const fn elevation(self) -> f32 {
        match self {
            Self::Bird => 30.0,
            _ => 0.0,
        }
    }

    #[must_use]
    pub const fn collision_boxes(self) -> &'static [CollisionBox] {
        const SMALL_CACTUS: [CollisionBox; 3] = [
            CollisionBox::new(0.0, 1.0, 5.0, 27.0),
            CollisionBox::new(4.0, 1.0, 6.0, 34.0),
            CollisionBox::new(10.0, 17.0, 7.0, 14.0),
        ];
        const LARGE_CACTUS: [CollisionBox; 3] = [
            CollisionBox::new(0.0, 14.0, 7.0, 24.0),
            CollisionBox::new(8.0, 0.0, 9.0, 50.0),
            CollisionBox::new(18.0, 10.0, 7.0, 26.0),
        ];
        const CACTUS_CLUSTER: [CollisionBox; 3] = [
            CollisionBox::new(0.0, 1.0, 17.0, 30.0),
            CollisionBox::new(17.0, 0.0, 17.0, 35.0),
            CollisionBox::new(34.0, 1.0, 17.0, 30.0),
        ];
        const BIRD: [CollisionBox; 3] = [
            CollisionBox::new(2.0, 20.0, 42.0, 10.0),
            CollisionBox::new(14.0, 12.0, 18.0, 8.0),
            CollisionBox::new(18.0, 30.0, 12.0, 6.0),
        ];
        match self {
            Self::SmallCactus => &SMALL_CACTUS,
            Self::LargeCactus => &LARGE_CACTUS,
            Self::CactusCluster => &CACTUS_CLUSTER,
            Self::Bird => &BIRD,
        }
    }

    /// Variants allowed to spawn at the given score tier.
    #[must_use]
    pub fn unlocked(score: u64) -> ArrayVec<Self, { ObstacleKind::LEN }> {
        Self::ALL
            .into_iter()
            .filter(|kind| score >= kind.min_score())
            .collect()
    }
}

/// An obstacle scrolling towards the runner.
#[derive(Debug, Clone)]
pub struct Obstacle {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    boxes: CollisionBoxes,
    spawn_index: u64,
}

impl Obstacle {
    /// Creates an obstacle of a catalog variant with its left edge at `x`.
    #[must_use]
    pub fn new(kind: ObstacleKind, x: f32, spawn_index: u64) -> Self {
        Self {
            x,
            y: kind.elevation(),
            width: kind.width(),
            height: kind.height(),
            boxes: boxes_from(kind.collision_boxes()),
            spawn_index,
        }
    }

    /// Creates an obstacle with arbitrary geometry.
    ///
    /// At most [`MAX_COLLISION_BOXES`](crate::MAX_COLLISION_BOXES) boxes are kept.
    #[must_use]
    pub fn custom(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        boxes: &[CollisionBox],
        spawn_index: u64,
    ) -> Self {
        Self {
            x,
            y,
            width,
            height,
            boxes: boxes_from(boxes),
            spawn_index,
        }
    }

    #[must_use]
    pub fn x(&self) -> f32 {
        self.x
    }

    #[must_use]
    pub fn y(&self) -> f32 {
        self.y
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.height
    }

    /// X coordinate of the trailing (right) edge.
    #[must_use]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Position in the spawn sequence of the episode, starting at 0.
    #[must_use]
    pub fn spawn_index(&self) -> u64 {
        self.spawn_index
    }

    #[must_use]
    pub fn collision_boxes(&self) -> &[CollisionBox] {
        &self.boxes
    }

    pub fn world_boxes(&self) -> impl Iterator<Item = CollisionBox> + '_ {
        self.boxes.iter().map(|b| b.translated(self.x, self.y))
    }

    /// Returns `true` once the obstacle is entirely past the left boundary.
    #[must_use]
    pub fn is_off_screen(&self) -> bool {
        self.right() <= 0.0
    }

    pub(crate) fn scroll(&mut self, dx: f32) {
        self.x -= dx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runner;

    #[test]
    fn test_catalog_boxes_fit_inside_dimensions() {
        for kind in ObstacleKind::ALL {
            for b in kind.collision_boxes() {
                assert!(b.x >= 0.0 && b.x + b.width <= kind.width(), "{kind}: {b:?}");
                assert!(b.y >= 0.0 && b.y + b.height <= kind.height(), "{kind}: {b:?}");
            }
        }
    }

    #[test]
    fn test_unlocked_grows_with_score() {
        assert_eq!(ObstacleKind::unlocked(0).as_slice(), &[ObstacleKind::SmallCactus]);
        assert_eq!(ObstacleKind::unlocked(150).len(), 2);
        assert_eq!(ObstacleKind::unlocked(299).len(), 3);
        assert_eq!(ObstacleKind::unlocked(10_000).len(), ObstacleKind::LEN);
    }

    #[test]
    fn test_custom_obstacle_collides_with_overlapping_runner() {
        // Runner sub-box and obstacle sub-box both cover x = 600..630 on the ground.
        let obstacle = Obstacle::custom(
            600.0,
            0.0,
            30.0,
            35.0,
            &[CollisionBox::new(0.0, 0.0, 30.0, 35.0)],
            0,
        );
        let runner = Runner::new(580.0);
        assert!(runner.collides_with(&obstacle));

        let far_runner = Runner::new(50.0);
        assert!(!far_runner.collides_with(&obstacle));
    }

    #[test]
    fn test_ducking_runner_passes_under_bird() {
        let mut runner = Runner::new(50.0);
        let bird = Obstacle::new(ObstacleKind::Bird, 60.0, 0);
        assert!(runner.collides_with(&bird));
        assert!(runner.try_duck());
        assert!(!runner.collides_with(&bird));
    }

    #[test]
    fn test_off_screen_when_right_edge_passes_left_boundary() {
        let mut obstacle = Obstacle::new(ObstacleKind::SmallCactus, 5.0, 0);
        assert!(!obstacle.is_off_screen());
        obstacle.scroll(22.0);
        assert!(obstacle.is_off_screen());
    }
}
