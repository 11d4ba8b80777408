// Dynamic registry of producer and consumer threads.

use crate::error::{PoolError, PoolResult};
use crate::MPMC::Policy::SyncPolicy;

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Producer,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}

/// The two one-way flags a worker polls: the session-wide running flag and
/// its own active flag. Both only ever go from `true` to `false`.
#[derive(Clone, Debug)]
pub struct Liveness {
    session: Arc<AtomicBool>,
    worker: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new(session: Arc<AtomicBool>, worker: Arc<AtomicBool>) -> Self {
        Self { session, worker }
    }

    /// Fresh flags not tied to any session; handy for driving a policy by hand.
    pub fn standalone() -> Self {
        Self::new(
            Arc::new(AtomicBool::new(true)),
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.session.load(Ordering::Acquire) && self.worker.load(Ordering::Acquire)
    }

    /// Clears the worker flag. Idempotent.
    pub fn retire(&self) {
        self.worker.store(false, Ordering::Release);
    }
}

/// Handed to a worker body when its thread starts.
#[derive(Debug)]
pub struct WorkerContext {
    pub id: usize,
    pub role: Role,
    pub liveness: Liveness,
    /// Seed for the worker's own generator.
    pub seed: u64,
}

/// What a worker reports when it terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub role: Role,
    pub id: usize,
    /// Messages enqueued (producer) or dequeued (consumer).
    pub processed: u64,
    pub integrity_failures: u64,
}

struct WorkerSlot {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<WorkerReport>>,
}

/// Producer and consumer threads of one session.
///
/// Ids are per role, start at 0 and are never reused. Retirement is
/// cooperative: the pool clears a flag and wakes every waiter, the worker
/// notices on its next predicate check and leaves on its own.
pub struct WorkerPool {
    policy: Arc<dyn SyncPolicy>,
    running: Arc<AtomicBool>,
    max_per_role: usize,
    producers: Mutex<Vec<WorkerSlot>>,
    consumers: Mutex<Vec<WorkerSlot>>,
}

impl WorkerPool {
    pub fn new(policy: Arc<dyn SyncPolicy>, running: Arc<AtomicBool>, max_per_role: usize) -> Self {
        Self {
            policy,
            running,
            max_per_role,
            producers: Mutex::new(Vec::new()),
            consumers: Mutex::new(Vec::new()),
        }
    }

    fn slots(&self, role: Role) -> &Mutex<Vec<WorkerSlot>> {
        match role {
            Role::Producer => &self.producers,
            Role::Consumer => &self.consumers,
        }
    }

    /// Starts a new worker thread running `body` and returns its id.
    pub fn spawn<F>(&self, role: Role, seed: u64, body: F) -> PoolResult<usize>
    where
        F: FnOnce(WorkerContext) -> WorkerReport + Send + 'static,
    {
        if !self.running.load(Ordering::Acquire) {
            return Err(PoolError::ShuttingDown);
        }

        let mut slots = self.slots(role).lock();
        let active = slots
            .iter()
            .filter(|slot| slot.active.load(Ordering::Acquire))
            .count();
        if active >= self.max_per_role {
            return Err(PoolError::WorkerLimit {
                role,
                max: self.max_per_role,
            });
        }

        let id = slots.len();
        let flag = Arc::new(AtomicBool::new(true));
        let context = WorkerContext {
            id,
            role,
            liveness: Liveness::new(self.running.clone(), flag.clone()),
            seed,
        };

        let spawned = thread::Builder::new()
            .name(format!("{role}-{id}"))
            .spawn(move || body(context));

        match spawned {
            Ok(handle) => {
                slots.push(WorkerSlot {
                    active: flag,
                    handle: Some(handle),
                });
                info!(%role, id, active = active + 1, "worker created");
                Ok(id)
            }
            Err(source) => {
                // The id stays consumed
                flag.store(false, Ordering::Release);
                slots.push(WorkerSlot {
                    active: flag,
                    handle: None,
                });
                Err(PoolError::Spawn { role, source })
            }
        }
    }

    /// Signals the most recently spawned active worker of `role` to stop.
    pub fn retire_latest(&self, role: Role) -> PoolResult<usize> {
        let id = {
            let slots = self.slots(role).lock();
            let (id, slot) = slots
                .iter()
                .enumerate()
                .rev()
                .find(|(_, slot)| slot.active.load(Ordering::Acquire))
                .ok_or(PoolError::NoActiveWorker { role })?;
            slot.active.store(false, Ordering::Release);
            id
        };

        info!(%role, id, "signaling worker to terminate");
        self.policy.wake_all(self.live_workers());
        Ok(id)
    }

    /// Marks every worker inactive and wakes all waiters. Safe to call twice.
    pub fn shutdown_all(&self) {
        self.running.store(false, Ordering::Release);
        let mut workers = 0;
        for role in [Role::Producer, Role::Consumer] {
            let slots = self.slots(role).lock();
            for slot in slots.iter() {
                slot.active.store(false, Ordering::Release);
            }
            workers += slots.len();
        }
        self.policy.wake_all(workers);
    }

    /// Waits for every spawned worker to terminate, producers first.
    /// Workers must have been told to stop, see [`shutdown_all`](Self::shutdown_all).
    /// Each worker is joined once; later calls return only what is left.
    pub fn join(&self) -> Vec<WorkerReport> {
        let mut reports = Vec::new();
        for role in [Role::Producer, Role::Consumer] {
            let handles: Vec<(usize, JoinHandle<WorkerReport>)> = self
                .slots(role)
                .lock()
                .iter_mut()
                .enumerate()
                .filter_map(|(id, slot)| slot.handle.take().map(|h| (id, h)))
                .collect();

            info!(%role, count = handles.len(), "joining workers");
            for (id, handle) in handles {
                match handle.join() {
                    Ok(report) => reports.push(report),
                    Err(_) => error!(%role, id, "worker panicked"),
                }
            }
        }
        reports
    }

    pub fn active_count(&self, role: Role) -> usize {
        self.slots(role)
            .lock()
            .iter()
            .filter(|slot| slot.active.load(Ordering::Acquire))
            .count()
    }

    pub fn spawned_count(&self, role: Role) -> usize {
        self.slots(role).lock().len()
    }

    fn live_workers(&self) -> usize {
        self.active_count(Role::Producer) + self.active_count(Role::Consumer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MPMC::builder::SessionConfig;
    use crate::MPMC::Buffer::BoundedQueue;
    use crate::MPMC::Policy::Discipline;
    use std::time::Duration;

    fn pool(max: usize) -> WorkerPool {
        let policy = Discipline::Monitor.build(
            BoundedQueue::new(4).unwrap(),
            &SessionConfig::default(),
        );
        WorkerPool::new(policy, Arc::new(AtomicBool::new(true)), max)
    }

    fn idle_body(ctx: WorkerContext) -> WorkerReport {
        while ctx.liveness.is_live() {
            thread::sleep(Duration::from_millis(5));
        }
        ctx.liveness.retire();
        WorkerReport {
            role: ctx.role,
            id: ctx.id,
            processed: 0,
            integrity_failures: 0,
        }
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let pool = pool(4);
        assert_eq!(pool.spawn(Role::Producer, 1, idle_body).unwrap(), 0);
        assert_eq!(pool.spawn(Role::Producer, 2, idle_body).unwrap(), 1);
        assert_eq!(pool.retire_latest(Role::Producer).unwrap(), 1);
        assert_eq!(pool.spawn(Role::Producer, 3, idle_body).unwrap(), 2);
        assert_eq!(pool.spawn(Role::Consumer, 4, idle_body).unwrap(), 0);
        pool.shutdown_all();
        assert_eq!(pool.join().len(), 4);
    }

    #[test]
    fn spawn_rejected_at_limit() {
        let pool = pool(1);
        pool.spawn(Role::Consumer, 1, idle_body).unwrap();
        assert!(matches!(
            pool.spawn(Role::Consumer, 2, idle_body),
            Err(PoolError::WorkerLimit { max: 1, .. })
        ));
        pool.shutdown_all();
        pool.join();
    }

    #[test]
    fn retire_without_workers_fails() {
        let pool = pool(1);
        assert!(matches!(
            pool.retire_latest(Role::Producer),
            Err(PoolError::NoActiveWorker { role: Role::Producer })
        ));
    }

    #[test]
    fn shutdown_twice_and_join_twice() {
        let pool = pool(2);
        pool.spawn(Role::Producer, 1, idle_body).unwrap();
        pool.shutdown_all();
        pool.shutdown_all();
        assert_eq!(pool.join().len(), 1);
        assert!(pool.join().is_empty());
        assert!(matches!(
            pool.spawn(Role::Producer, 2, idle_body),
            Err(PoolError::ShuttingDown)
        ));
    }
}
