use std::collections::VecDeque;

use crate::core::{obstacle::Obstacle, runner::Runner};

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum Termination {
    #[display("collision")]
    Collision,
    #[display("frame limit")]
    FrameLimit,
}

/// Observable state of one episode.
///
/// Obstacles are kept in spawn order; the front is the oldest (leftmost) one.
#[derive(Debug, Clone)]
pub struct EpisodeState {
    pub(crate) runner: Runner,
    pub(crate) obstacles: VecDeque<Obstacle>,
    pub(crate) distance: f64,
    pub(crate) speed: f32,
    pub(crate) score: u64,
    pub(crate) frame: u64,
    pub(crate) termination: Option<Termination>,
}

impl EpisodeState {
    pub(crate) fn new(runner_x: f32, initial_speed: f32) -> Self {
        Self {
            runner: Runner::new(runner_x),
            obstacles: VecDeque::new(),
            distance: 0.0,
            speed: initial_speed,
            score: 0,
            frame: 0,
            termination: None,
        }
    }

    #[must_use]
    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn obstacles(
        &self,
    ) -> impl DoubleEndedIterator<Item = &Obstacle> + ExactSizeIterator + '_ {
        self.obstacles.iter()
    }

    /// First obstacle, in spawn order, whose trailing edge is still ahead of the runner.
    #[must_use]
    pub fn nearest_obstacle(&self) -> Option<&Obstacle> {
        let runner_x = self.runner.x();
        self.obstacles.iter().find(|o| o.right() > runner_x)
    }

    /// Total distance scrolled since the episode started.
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    #[must_use]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    #[must_use]
    pub fn score(&self) -> u64 {
        self.score
    }

    /// Number of frames stepped so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[must_use]
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.termination.is_some()
    }
}
