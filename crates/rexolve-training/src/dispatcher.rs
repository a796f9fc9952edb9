//! Parallel fitness evaluation of a generation.
//!
//! The controller hands one [`DispatchTask`] per individual to a [`WorkerPool`].
//! Worker threads pull tasks from a shared queue, run a [`FitnessEvaluator`] and
//! push typed [`Report`]s back. [`WorkerPool::dispatch`] is the generation
//! barrier: it returns one [`UnitOutcome`] per task, in task order, once every
//! unit has reported or timed out.
//!
//! # Failures
//!
//! - An evaluator error becomes [`UnitOutcome::Failed`].
//! - A panic inside an evaluator is caught and reported as
//!   [`EvaluationError::Panicked`].
//! - A unit still running `unit_timeout` after a worker picked it up becomes
//!   [`UnitOutcome::TimedOut`]; its cancellation flag is raised so the worker
//!   abandons it at the next frame. Units waiting in the queue are not charged
//!   for that time.
//!
//! Workers are detached threads. The pool never waits for a timed-out unit: a
//! replacement worker takes over the queue, so a stuck evaluator delays at most
//! its own slot.

use std::{
    collections::HashMap,
    io,
    num::{NonZeroU64, NonZeroUsize},
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use rexolve_engine::{EpisodeSeed, PhysicsConfig};
use rexolve_evaluator::{
    evaluation_unit::{EpisodeSnapshot, EvaluationError, EvaluationUnit, SnapshotSink},
    network::NetworkShape,
    policy_evaluator::NetworkPolicyEvaluator,
};

/// Work item for one evaluation unit.
#[derive(Debug, Clone)]
pub struct DispatchTask {
    /// Position of the individual in its population.
    pub individual_id: usize,
    /// Number of episodes to play; equals `episode_seeds.len()`.
    pub episodes_per_unit: usize,
    pub parameters: Arc<[f32]>,
    pub generation: usize,
    pub max_generations: usize,
    pub episode_seeds: Arc<[EpisodeSeed]>,
}

/// Message from a worker to the controller.
#[derive(Debug, Clone)]
pub enum Report {
    Fitness {
        unit_id: usize,
        fitness: f32,
    },
    EpisodeSnapshot {
        unit_id: usize,
        snapshot: EpisodeSnapshot,
    },
    Failed {
        unit_id: usize,
        error: EvaluationError,
    },
}

/// Final result of one unit.
#[derive(Debug, Clone, PartialEq, derive_more::IsVariant)]
pub enum UnitOutcome {
    Fitness(f32),
    Failed(EvaluationError),
    TimedOut,
}

impl UnitOutcome {
    #[must_use]
    pub fn fitness(&self) -> Option<f32> {
        match self {
            Self::Fitness(f) => Some(*f),
            Self::Failed(_) | Self::TimedOut => None,
        }
    }
}

/// Progress notification emitted while a dispatch is running.
#[derive(Debug)]
pub enum DispatchEvent<'a> {
    Snapshot {
        unit_id: usize,
        snapshot: &'a EpisodeSnapshot,
    },
    Completed {
        unit_id: usize,
        outcome: &'a UnitOutcome,
        completed: usize,
        total: usize,
    },
}

/// Computes the fitness of one task on a worker thread.
pub trait FitnessEvaluator: Send + Sync + 'static {
    fn evaluate(
        &self,
        task: &DispatchTask,
        context: &mut UnitContext<'_>,
    ) -> Result<f32, EvaluationError>;
}

/// Per-unit handle passed to a [`FitnessEvaluator`].
///
/// Forwards snapshots to the controller and exposes the unit's cancellation flag.
#[derive(Debug)]
pub struct UnitContext<'a> {
    unit_id: usize,
    cancel: &'a Arc<AtomicBool>,
    reports: &'a Sender<Report>,
}

impl UnitContext<'_> {
    #[must_use]
    pub fn unit_id(&self) -> usize {
        self.unit_id
    }

    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(self.cancel)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

impl SnapshotSink for UnitContext<'_> {
    fn snapshot(&mut self, snapshot: EpisodeSnapshot) {
        // The controller may already have given up on this unit.
        let _ = self.reports.send(Report::EpisodeSnapshot {
            unit_id: self.unit_id,
            snapshot,
        });
    }
}

/// Evaluates tasks by playing episodes with a network policy.
#[derive(Debug, Clone)]
pub struct NetworkFitnessEvaluator {
    shape: NetworkShape,
    physics: PhysicsConfig,
    snapshot_interval: Option<NonZeroU64>,
}

impl NetworkFitnessEvaluator {
    #[must_use]
    pub fn new(
        shape: NetworkShape,
        physics: PhysicsConfig,
        snapshot_interval: Option<NonZeroU64>,
    ) -> Self {
        Self {
            shape,
            physics,
            snapshot_interval,
        }
    }
}

impl FitnessEvaluator for NetworkFitnessEvaluator {
    fn evaluate(
        &self,
        task: &DispatchTask,
        context: &mut UnitContext<'_>,
    ) -> Result<f32, EvaluationError> {
        let policy = NetworkPolicyEvaluator::new(self.shape.clone(), task.parameters.to_vec())
            .map_err(|source| EvaluationError::InvalidPolicy { source })?;
        EvaluationUnit::new(policy, self.physics.clone())
            .with_snapshot_interval(self.snapshot_interval)
            .with_cancel_flag(context.cancel_flag())
            .run(&task.episode_seeds, context)
    }
}

/// Bookkeeping shared between the controller and the worker running a unit.
#[derive(Debug, Default)]
struct UnitClock {
    cancel: Arc<AtomicBool>,
    /// Set when a worker picks the unit up.
    started: OnceLock<Instant>,
}

impl UnitClock {
    fn is_overdue(&self, timeout: Duration, now: Instant) -> bool {
        self.started
            .get()
            .is_some_and(|started| now.saturating_duration_since(*started) >= timeout)
    }
}

type Job = (DispatchTask, Arc<UnitClock>);
type JobQueue = Arc<Mutex<Receiver<Job>>>;

/// Longest time the barrier sleeps before rechecking timeouts and workers.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Bounded set of worker threads evaluating units.
#[derive(Debug)]
pub struct WorkerPool<E> {
    evaluator: Arc<E>,
    workers: NonZeroUsize,
    unit_timeout: Option<Duration>,
}

impl<E> WorkerPool<E>
where
    E: FitnessEvaluator,
{
    #[must_use]
    pub fn new(evaluator: E, workers: NonZeroUsize) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            workers,
            unit_timeout: None,
        }
    }

    /// Bounds the time a unit may run once a worker has picked it up.
    #[must_use]
    pub fn with_unit_timeout(mut self, unit_timeout: Option<Duration>) -> Self {
        self.unit_timeout = unit_timeout;
        self
    }

    #[must_use]
    pub fn workers(&self) -> NonZeroUsize {
        self.workers
    }

    #[must_use]
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Evaluates every task and waits for all of them.
    ///
    /// Returns one outcome per task, in the order of `tasks`. Fails only if a
    /// worker thread cannot be spawned.
    pub fn dispatch<F>(&self, tasks: Vec<DispatchTask>, on_event: F) -> io::Result<Vec<UnitOutcome>>
    where
        F: FnMut(DispatchEvent<'_>),
    {
        let total = tasks.len();
        if total == 0 {
            return Ok(vec![]);
        }

        let unit_ids: Vec<usize> = tasks.iter().map(|task| task.individual_id).collect();
        let clocks: Vec<Arc<UnitClock>> = (0..total).map(|_| Arc::default()).collect();

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        for (task, clock) in tasks.into_iter().zip(&clocks) {
            // The receiver is alive until the workers below drop it.
            let _ = job_tx.send((task, Arc::clone(clock)));
        }
        drop(job_tx);

        let jobs: JobQueue = Arc::new(Mutex::new(job_rx));
        let (report_tx, report_rx) = mpsc::channel();
        let mut workers = Vec::with_capacity(self.workers.get());
        for _ in 0..self.workers.get().min(total) {
            workers.push(self.spawn_worker(workers.len(), &jobs, &report_tx)?);
        }

        let mut barrier = Barrier::new(&unit_ids, on_event);
        while !barrier.is_done() {
            match report_rx.recv_timeout(self.poll_wait(&barrier, &clocks)) {
                Ok(report) => barrier.receive(report),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(timeout) = self.unit_timeout {
                let now = Instant::now();
                for (slot, clock) in clocks.iter().enumerate() {
                    if barrier.is_pending(slot) && clock.is_overdue(timeout, now) {
                        clock.cancel.store(true, Ordering::Relaxed);
                        barrier.complete(slot, UnitOutcome::TimedOut);
                        workers.push(self.spawn_worker(workers.len(), &jobs, &report_tx)?);
                    }
                }
            }

            if workers.iter().all(JoinHandle::is_finished) {
                while let Ok(report) = report_rx.try_recv() {
                    barrier.receive(report);
                }
                break;
            }
        }

        Ok(barrier.finish(&clocks))
    }

    fn spawn_worker(
        &self,
        index: usize,
        jobs: &JobQueue,
        reports: &Sender<Report>,
    ) -> io::Result<JoinHandle<()>> {
        let jobs = Arc::clone(jobs);
        let reports = reports.clone();
        let evaluator = Arc::clone(&self.evaluator);
        thread::Builder::new()
            .name(format!("rexolve-worker-{index}"))
            .spawn(move || worker_loop(&*evaluator, &jobs, &reports))
    }

    /// Time until the earliest running unit expires, capped by [`POLL_INTERVAL`].
    fn poll_wait<F>(&self, barrier: &Barrier<'_, F>, clocks: &[Arc<UnitClock>]) -> Duration
    where
        F: FnMut(DispatchEvent<'_>),
    {
        let Some(timeout) = self.unit_timeout else {
            return POLL_INTERVAL;
        };
        let now = Instant::now();
        clocks
            .iter()
            .enumerate()
            .filter(|(slot, _)| barrier.is_pending(*slot))
            .filter_map(|(_, clock)| clock.started.get())
            .map(|started| (*started + timeout).saturating_duration_since(now))
            .min()
            .map_or(POLL_INTERVAL, |wait| wait.min(POLL_INTERVAL))
    }
}

/// Collects unit outcomes into their task slots.
struct Barrier<'a, F> {
    unit_ids: &'a [usize],
    slot_of: HashMap<usize, usize>,
    outcomes: Vec<Option<UnitOutcome>>,
    completed: usize,
    on_event: F,
}

impl<'a, F> Barrier<'a, F>
where
    F: FnMut(DispatchEvent<'_>),
{
    fn new(unit_ids: &'a [usize], on_event: F) -> Self {
        Self {
            unit_ids,
            slot_of: unit_ids
                .iter()
                .enumerate()
                .map(|(slot, &unit_id)| (unit_id, slot))
                .collect(),
            outcomes: vec![None; unit_ids.len()],
            completed: 0,
            on_event,
        }
    }

    fn is_done(&self) -> bool {
        self.completed == self.outcomes.len()
    }

    fn is_pending(&self, slot: usize) -> bool {
        self.outcomes[slot].is_none()
    }

    fn receive(&mut self, report: Report) {
        let (unit_id, outcome) = match report {
            Report::EpisodeSnapshot { unit_id, snapshot } => {
                (self.on_event)(DispatchEvent::Snapshot {
                    unit_id,
                    snapshot: &snapshot,
                });
                return;
            }
            Report::Fitness { unit_id, fitness } => (unit_id, UnitOutcome::Fitness(fitness)),
            Report::Failed { unit_id, error } => (unit_id, UnitOutcome::Failed(error)),
        };
        let Some(&slot) = self.slot_of.get(&unit_id) else {
            tracing::warn!(unit_id, "report for an unknown unit");
            return;
        };
        // A late report of a timed-out unit keeps the timeout.
        if self.is_pending(slot) {
            self.complete(slot, outcome);
        }
    }

    fn complete(&mut self, slot: usize, outcome: UnitOutcome) {
        self.completed += 1;
        let total = self.outcomes.len();
        let outcome = self.outcomes[slot].insert(outcome);
        (self.on_event)(DispatchEvent::Completed {
            unit_id: self.unit_ids[slot],
            outcome,
            completed: self.completed,
            total,
        });
    }

    /// Outcomes in task order; units that never reported are cancelled and failed.
    fn finish(self, clocks: &[Arc<UnitClock>]) -> Vec<UnitOutcome> {
        self.outcomes
            .into_iter()
            .zip(clocks)
            .map(|(outcome, clock)| {
                outcome.unwrap_or_else(|| {
                    clock.cancel.store(true, Ordering::Relaxed);
                    UnitOutcome::Failed(EvaluationError::Panicked {
                        message: "worker exited without reporting".to_owned(),
                    })
                })
            })
            .collect()
    }
}

fn worker_loop<E>(evaluator: &E, jobs: &Mutex<Receiver<Job>>, reports: &Sender<Report>)
where
    E: FitnessEvaluator + ?Sized,
{
    loop {
        let job = match jobs.lock() {
            Ok(rx) => rx.recv(),
            Err(poisoned) => poisoned.into_inner().recv(),
        };
        let Ok((task, clock)) = job else {
            break;
        };
        let _ = clock.started.set(Instant::now());

        let unit_id = task.individual_id;
        let mut context = UnitContext {
            unit_id,
            cancel: &clock.cancel,
            reports,
        };
        let result =
            panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(&task, &mut context)))
                .unwrap_or_else(|payload| {
                    Err(EvaluationError::Panicked {
                        message: panic_message(payload.as_ref()),
                    })
                });
        let report = match result {
            Ok(fitness) if fitness.is_finite() => Report::Fitness { unit_id, fitness },
            Ok(_) => Report::Failed {
                unit_id,
                error: EvaluationError::NonFiniteFitness,
            },
            Err(error) => Report::Failed { unit_id, error },
        };
        if reports.send(report).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rexolve_engine::Action;
    use rexolve_evaluator::policy_evaluator::ConstantPolicyEvaluator;

    use super::*;

    fn tasks(count: usize) -> Vec<DispatchTask> {
        let seeds: Arc<[EpisodeSeed]> = Arc::from([1, 2]);
        (0..count)
            .map(|individual_id| DispatchTask {
                individual_id,
                episodes_per_unit: seeds.len(),
                parameters: Arc::from([individual_id as f32]),
                generation: 0,
                max_generations: 1,
                episode_seeds: Arc::clone(&seeds),
            })
            .collect()
    }

    /// Fitness is the first parameter; negative parameters fail.
    #[derive(Debug)]
    struct ParameterFitness;

    impl FitnessEvaluator for ParameterFitness {
        fn evaluate(
            &self,
            task: &DispatchTask,
            _context: &mut UnitContext<'_>,
        ) -> Result<f32, EvaluationError> {
            match task.parameters[0] {
                p if p == 3.0 => panic!("unit three panics"),
                p if p == 5.0 => Err(EvaluationError::NoEpisodes),
                p => Ok(p),
            }
        }
    }

    #[test]
    fn test_outcomes_are_keyed_by_task() {
        for workers in [1, 2, 3, 8] {
            let pool = WorkerPool::new(ParameterFitness, NonZeroUsize::new(workers).unwrap());
            let outcomes = pool.dispatch(tasks(7), |_| {}).unwrap();
            assert_eq!(outcomes.len(), 7);
            for (i, outcome) in outcomes.iter().enumerate() {
                match i {
                    3 => assert!(matches!(
                        outcome,
                        UnitOutcome::Failed(EvaluationError::Panicked { message })
                            if message == "unit three panics"
                    )),
                    5 => assert_eq!(outcome, &UnitOutcome::Failed(EvaluationError::NoEpisodes)),
                    _ => assert_eq!(outcome.fitness(), Some(i as f32)),
                }
            }
        }
    }

    #[test]
    fn test_progress_events_count_to_total() {
        let pool = WorkerPool::new(ParameterFitness, NonZeroUsize::new(2).unwrap());
        let mut progress = vec![];
        pool.dispatch(tasks(4), |event| {
            if let DispatchEvent::Completed { completed, total, .. } = event {
                progress.push((completed, total));
            }
        })
        .unwrap();
        assert_eq!(progress, [(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    /// Blocks unit 0 until it is cancelled.
    #[derive(Debug, Default)]
    struct StuckUnit {
        cancelled: Arc<AtomicUsize>,
    }

    impl FitnessEvaluator for StuckUnit {
        fn evaluate(
            &self,
            task: &DispatchTask,
            context: &mut UnitContext<'_>,
        ) -> Result<f32, EvaluationError> {
            if task.individual_id != 0 {
                return Ok(1.0);
            }
            let start = Instant::now();
            while start.elapsed() < Duration::from_secs(10) {
                if context.is_cancelled() {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    return Err(EvaluationError::Cancelled);
                }
                thread::sleep(Duration::from_millis(1));
            }
            Ok(0.0)
        }
    }

    #[test]
    fn test_stuck_unit_times_out_and_is_cancelled() {
        let evaluator = StuckUnit::default();
        let cancelled = Arc::clone(&evaluator.cancelled);
        let pool = WorkerPool::new(evaluator, NonZeroUsize::new(3).unwrap())
            .with_unit_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let outcomes = pool.dispatch(tasks(3), |_| {}).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcomes[0], UnitOutcome::TimedOut);
        assert_eq!(outcomes[1], UnitOutcome::Fitness(1.0));
        assert_eq!(outcomes[2], UnitOutcome::Fitness(1.0));

        let wait = Instant::now();
        while cancelled.load(Ordering::SeqCst) == 0 && wait.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    /// Unit 0 hangs until cancelled; every other unit takes `work`.
    #[derive(Debug)]
    struct HungAmongSlowUnits {
        work: Duration,
    }

    impl FitnessEvaluator for HungAmongSlowUnits {
        fn evaluate(
            &self,
            task: &DispatchTask,
            context: &mut UnitContext<'_>,
        ) -> Result<f32, EvaluationError> {
            if task.individual_id == 0 {
                let start = Instant::now();
                while !context.is_cancelled() && start.elapsed() < Duration::from_secs(10) {
                    thread::sleep(Duration::from_millis(1));
                }
                return Err(EvaluationError::Cancelled);
            }
            thread::sleep(self.work);
            Ok(1.0)
        }
    }

    #[test]
    fn test_queued_units_are_not_charged_for_a_hung_unit() {
        let evaluator = HungAmongSlowUnits {
            work: Duration::from_millis(100),
        };
        // Units 1..=4 share one worker and need 400ms in total, more than the
        // budget, while each one stays well inside it.
        let pool = WorkerPool::new(evaluator, NonZeroUsize::new(2).unwrap())
            .with_unit_timeout(Some(Duration::from_millis(300)));
        let started = Instant::now();
        let outcomes = pool.dispatch(tasks(5), |_| {}).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            outcomes,
            [
                UnitOutcome::TimedOut,
                UnitOutcome::Fitness(1.0),
                UnitOutcome::Fitness(1.0),
                UnitOutcome::Fitness(1.0),
                UnitOutcome::Fitness(1.0),
            ]
        );
    }

    #[test]
    fn test_timed_out_unit_is_counted_once() {
        let pool = WorkerPool::new(StuckUnit::default(), NonZeroUsize::MIN)
            .with_unit_timeout(Some(Duration::from_millis(100)));
        let mut completions = vec![];
        let outcomes = pool
            .dispatch(tasks(3), |event| {
                if let DispatchEvent::Completed { unit_id, completed, .. } = event {
                    completions.push((unit_id, completed));
                }
            })
            .unwrap();
        assert_eq!(
            outcomes,
            [UnitOutcome::TimedOut, UnitOutcome::Fitness(1.0), UnitOutcome::Fitness(1.0)]
        );
        assert_eq!(completions.len(), 3);
        assert_eq!(completions[0], (0, 1));
        let mut ids: Vec<usize> = completions.iter().map(|&(id, _)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, [0, 1, 2]);
    }

    #[test]
    fn test_network_evaluator_rejects_bad_blob() {
        let shape = NetworkShape::for_policy(&[4]).unwrap();
        let evaluator = NetworkFitnessEvaluator::new(shape, PhysicsConfig::default(), None);
        let pool = WorkerPool::new(evaluator, NonZeroUsize::MIN);
        let outcomes = pool.dispatch(tasks(1), |_| {}).unwrap();
        assert!(matches!(
            outcomes[0],
            UnitOutcome::Failed(EvaluationError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_network_evaluator_forwards_snapshots() {
        let shape = NetworkShape::for_policy(&[]).unwrap();
        let physics = PhysicsConfig {
            max_frames: Some(40),
            ..PhysicsConfig::default()
        };
        // Zero weights, bias favours `Run`.
        let mut params = vec![0.0; shape.parameter_count()];
        *params.last_mut().unwrap() = 1.0;
        let evaluator = NetworkFitnessEvaluator::new(shape, physics.clone(), NonZeroU64::new(10));
        let task = DispatchTask {
            parameters: Arc::from(params),
            ..tasks(1).remove(0)
        };
        let mut snapshots = 0;
        let outcomes = WorkerPool::new(evaluator, NonZeroUsize::MIN)
            .dispatch(vec![task], |event| {
                if let DispatchEvent::Snapshot { unit_id, .. } = event {
                    assert_eq!(unit_id, 0);
                    snapshots += 1;
                }
            })
            .unwrap();
        assert_eq!(snapshots, 8);

        let expected = EvaluationUnit::new(ConstantPolicyEvaluator(Action::Run), physics)
            .run(&[1, 2], &mut ())
            .unwrap();
        assert_eq!(outcomes[0], UnitOutcome::Fitness(expected));
    }
}
