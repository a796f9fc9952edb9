use std::time::{Duration, Instant};

use rexolve_evaluator::evaluation_unit::EpisodeSnapshot;
use rexolve_training::controller::{
    BestSnapshot, GenerationRecord, TrainingObserver, TrainingSummary,
};

/// Reports training progress as `tracing` events.
#[derive(Debug)]
pub(crate) struct LogObserver {
    run_started: Instant,
    generation_started: Instant,
    max_generations: usize,
    /// Next progress quarter to report within the current generation.
    next_quarter: usize,
}

impl LogObserver {
    pub(crate) fn new() -> Self {
        let now = Instant::now();
        Self {
            run_started: now,
            generation_started: now,
            max_generations: 0,
            next_quarter: 1,
        }
    }
}

impl TrainingObserver for LogObserver {
    fn on_generation_started(&mut self, generation: usize, max_generations: usize) {
        self.generation_started = Instant::now();
        self.max_generations = max_generations;
        self.next_quarter = 1;
        tracing::debug!(generation, max_generations, "generation started");
    }

    fn on_progress(&mut self, generation: usize, completed: usize, total: usize) {
        if total == 0 {
            return;
        }
        while self.next_quarter <= 4 && completed * 4 >= total * self.next_quarter {
            tracing::debug!(
                generation,
                completed,
                total,
                "{}% of units evaluated",
                self.next_quarter * 25
            );
            self.next_quarter += 1;
        }
    }

    fn on_unit_snapshot(&mut self, generation: usize, unit_id: usize, snapshot: &EpisodeSnapshot) {
        tracing::trace!(
            generation,
            unit_id,
            episode = snapshot.episode,
            frame = snapshot.frame,
            score = snapshot.score,
            speed = snapshot.speed,
            "episode snapshot"
        );
    }

    fn on_generation_completed(&mut self, record: &GenerationRecord) {
        let elapsed = self.generation_started.elapsed();
        let remaining = self.max_generations.saturating_sub(record.generation + 1);
        tracing::debug!(
            generation = record.generation,
            elapsed = ?elapsed,
            eta = ?estimate_remaining(self.run_started.elapsed(), record.generation + 1, remaining),
            "generation finished"
        );
    }

    fn on_new_best(&mut self, best: &BestSnapshot) {
        tracing::debug!(
            generation = best.generation,
            parameters = best.parameters.len(),
            "best model updated"
        );
    }

    fn on_completed(&mut self, summary: &TrainingSummary) {
        let best = summary.best.as_ref();
        tracing::info!(
            seed = summary.seed,
            generations = summary.history.len(),
            best_fitness = best.map(|b| b.fitness),
            best_generation = best.map(|b| b.generation),
            elapsed = ?self.run_started.elapsed(),
            "training completed"
        );
    }
}

/// Extrapolates the time left from the mean duration of finished generations.
fn estimate_remaining(elapsed: Duration, finished: usize, remaining: usize) -> Duration {
    let (Ok(finished), Ok(remaining)) = (u32::try_from(finished), u32::try_from(remaining)) else {
        return Duration::MAX;
    };
    if finished == 0 {
        return Duration::ZERO;
    }
    (elapsed / finished).saturating_mul(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_remaining() {
        let elapsed = Duration::from_secs(30);
        assert_eq!(estimate_remaining(elapsed, 3, 2), Duration::from_secs(20));
        assert_eq!(estimate_remaining(elapsed, 3, 0), Duration::ZERO);
        assert_eq!(estimate_remaining(elapsed, 0, 5), Duration::ZERO);
    }

    #[test]
    fn test_progress_quarters_advance_once() {
        let mut observer = LogObserver::new();
        observer.on_generation_started(0, 1);
        observer.on_progress(0, 1, 8);
        assert_eq!(observer.next_quarter, 1);
        observer.on_progress(0, 4, 8);
        assert_eq!(observer.next_quarter, 3);
        observer.on_progress(0, 8, 8);
        assert_eq!(observer.next_quarter, 5);
        observer.on_generation_started(1, 2);
        assert_eq!(observer.next_quarter, 1);
    }
}
