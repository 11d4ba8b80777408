use super::builder::{SessionBuilder, SessionConfig};
use super::pool::{Liveness, Role, WorkerPool, WorkerReport};
use super::resize::ResizeCoordinator;
use super::{consumer, producer};
use crate::error::{PoolResult, QueueError, QueueResult};
use crate::MPMC::Buffer::{BoundedQueue, ResizeDirection};
use crate::MPMC::Policy::{Discipline, SyncPolicy};

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Longest uninterrupted sleep of a worker between liveness checks.
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// State shared by every worker of a session. Replaces process-wide flags:
/// all cross-worker signalling goes through this object.
pub(crate) struct SessionContext {
    pub(crate) config: SessionConfig,
    pub(crate) policy: Arc<dyn SyncPolicy>,
    pub(crate) coordinator: ResizeCoordinator,
    pub(crate) running: Arc<AtomicBool>,
}

impl SessionContext {
    /// Sleeps for `duration`, returning early once the worker is no longer live.
    pub(crate) fn pause(&self, live: &Liveness, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline || !live.is_live() {
                return;
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }

    /// Random delay between two operations of a worker.
    pub(crate) fn work_delay(&self, rng: &mut fastrand::Rng) -> Duration {
        let min = self.config.work_delay_min.as_micros() as u64;
        let max = self.config.work_delay_max.as_micros() as u64;
        if max <= min {
            Duration::from_micros(min)
        } else {
            Duration::from_micros(rng.u64(min..max))
        }
    }
}

/// Read-only snapshot of a running session, taken under the queue lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub discipline: Discipline,
    pub capacity: usize,
    pub occupied: usize,
    pub free_slots: usize,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub active_producers: usize,
    pub active_consumers: usize,
    pub pending_resize: Option<(ResizeDirection, usize)>,
    /// `(empty_slots, filled_slots)` for the permit discipline.
    pub permits: Option<(usize, usize)>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- STATUS ({}) ---", self.discipline)?;
        writeln!(f, "Queue capacity:    {}", self.capacity)?;
        writeln!(f, "Elements occupied: {}", self.occupied)?;
        writeln!(f, "Free slots:        {}", self.free_slots)?;
        if let Some((empty, filled)) = self.permits {
            writeln!(f, "Permits empty:     {empty}")?;
            writeln!(f, "Permits filled:    {filled}")?;
        }
        writeln!(f, "Total added:       {}", self.total_enqueued)?;
        writeln!(f, "Total extracted:   {}", self.total_dequeued)?;
        writeln!(f, "Active producers:  {}", self.active_producers)?;
        writeln!(f, "Active consumers:  {}", self.active_consumers)?;
        match self.pending_resize {
            Some((direction, target)) => writeln!(f, "Resize request:    {direction:?} to {target}")?,
            None => writeln!(f, "Resize request:    none")?,
        }
        write!(f, "------------------------")
    }
}

/// Final accounting of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    /// Messages still queued at teardown and destroyed with the queue.
    pub destroyed: usize,
    pub workers: Vec<WorkerReport>,
}

/// One run: a queue, its sync policy, and the pool of workers around it.
///
/// Every method is callable from the control thread while workers run.
/// Dropping the session shuts it down.
pub struct Session {
    ctx: Arc<SessionContext>,
    pool: WorkerPool,
    seeds: Mutex<fastrand::Rng>,
    summary: Mutex<Option<SessionSummary>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub(crate) fn start(config: SessionConfig) -> QueueResult<Self> {
        if config.capacity > config.discipline.max_capacity() {
            return Err(QueueError::InvalidCapacity {
                requested: config.capacity,
            });
        }
        let queue = BoundedQueue::new(config.capacity)?;
        let policy = config.discipline.build(queue, &config);
        let running = Arc::new(AtomicBool::new(true));
        let pool = WorkerPool::new(policy.clone(), running.clone(), config.max_workers_per_role);
        let seeds = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };

        info!(discipline = %config.discipline, capacity = config.capacity, "session started");

        let ctx = Arc::new(SessionContext {
            coordinator: ResizeCoordinator::new(policy.clone()),
            policy,
            running,
            config,
        });
        Ok(Self {
            ctx,
            pool,
            seeds: Mutex::new(seeds),
            summary: Mutex::new(None),
        })
    }

    pub fn discipline(&self) -> Discipline {
        self.ctx.config.discipline
    }

    pub fn config(&self) -> &SessionConfig {
        &self.ctx.config
    }

    pub fn policy(&self) -> &Arc<dyn SyncPolicy> {
        &self.ctx.policy
    }

    pub fn is_running(&self) -> bool {
        self.ctx.running.load(Ordering::Acquire)
    }

    fn next_seed(&self) -> u64 {
        self.seeds.lock().u64(..)
    }

    pub fn spawn_producer(&self) -> PoolResult<usize> {
        let ctx = self.ctx.clone();
        self.pool
            .spawn(Role::Producer, self.next_seed(), move |worker| producer::run(ctx, worker))
    }

    pub fn retire_producer(&self) -> PoolResult<usize> {
        self.pool.retire_latest(Role::Producer)
    }

    pub fn spawn_consumer(&self) -> PoolResult<usize> {
        let ctx = self.ctx.clone();
        self.pool
            .spawn(Role::Consumer, self.next_seed(), move |worker| consumer::run(ctx, worker))
    }

    pub fn retire_consumer(&self) -> PoolResult<usize> {
        self.pool.retire_latest(Role::Consumer)
    }

    /// Requests a capacity increase by `delta`; returns the target.
    pub fn request_grow(&self, delta: usize) -> QueueResult<usize> {
        self.ctx.coordinator.request(ResizeDirection::Grow, delta)
    }

    /// Requests a capacity decrease by `delta`; returns the target. The
    /// shrink stays pending until consumers drain occupancy to the target.
    pub fn request_shrink(&self, delta: usize) -> QueueResult<usize> {
        self.ctx.coordinator.request(ResizeDirection::Shrink, delta)
    }

    /// Grow by the configured resize step.
    pub fn grow(&self) -> QueueResult<usize> {
        self.request_grow(self.ctx.config.resize_step)
    }

    /// Shrink by the configured resize step.
    pub fn shrink(&self) -> QueueResult<usize> {
        self.request_shrink(self.ctx.config.resize_step)
    }

    pub fn status(&self) -> Status {
        let queue = self.ctx.policy.queue().lock();
        Status {
            discipline: self.ctx.config.discipline,
            capacity: queue.capacity(),
            occupied: queue.len(),
            free_slots: queue.free_slots(),
            total_enqueued: queue.total_enqueued(),
            total_dequeued: queue.total_dequeued(),
            active_producers: self.pool.active_count(Role::Producer),
            active_consumers: self.pool.active_count(Role::Consumer),
            pending_resize: queue.resize_state().pending(),
            permits: self.ctx.policy.permit_counts(),
        }
    }

    /// Stops every worker, waits for all of them, then destroys whatever is
    /// still queued. Later calls return the same summary.
    pub fn shutdown(&self) -> SessionSummary {
        let mut summary = self.summary.lock();
        if let Some(done) = summary.as_ref() {
            return done.clone();
        }

        info!(discipline = %self.ctx.config.discipline, "shutting down session");
        self.ctx.running.store(false, Ordering::Release);
        self.pool.shutdown_all();
        let workers = self.pool.join();

        let done = {
            let mut queue = self.ctx.policy.queue().lock();
            let total_enqueued = queue.total_enqueued();
            let total_dequeued = queue.total_dequeued();
            let destroyed = queue.drain_and_destroy();
            SessionSummary {
                total_enqueued,
                total_dequeued,
                destroyed,
                workers,
            }
        };

        info!(
            added = done.total_enqueued,
            extracted = done.total_dequeued,
            destroyed = done.destroyed,
            "all workers completed, queue destroyed"
        );
        *summary = Some(done.clone());
        done
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
