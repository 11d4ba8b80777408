// The blocking discipline shared by both queue flavours.

use crate::Core::permit::MAX_PERMITS;
use crate::MPMC::builder::SessionConfig;
use crate::MPMC::pool::Liveness;
use crate::MPMC::resize::ResizeOutcome;
use crate::MPMC::Buffer::{BoundedQueue, ResizeDirection};

use super::monitor::MonitorPolicy;
use super::permit::PermitPolicy;

use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Extra posts per permit on a wake-up broadcast, on top of capacity and
/// worker count.
pub const WAKE_SLACK: usize = 5;

/// Result of trying to reserve a slot (producer) or an item (consumer).
pub enum SlotAcquire<'a> {
    /// The predicate holds; the queue is locked and the caller may perform
    /// exactly one enqueue/dequeue before handing the guard to the matching
    /// `release_*` call.
    Ready(MutexGuard<'a, BoundedQueue>),
    /// The bounded wait ran out or a transient obstacle was seen. Re-check
    /// liveness and try again.
    Retry,
    /// The worker has been retired or the session is stopping.
    Stop,
}

impl SlotAcquire<'_> {
    pub fn is_ready(&self) -> bool {
        matches!(self, SlotAcquire::Ready(_))
    }
}

impl fmt::Debug for SlotAcquire<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotAcquire::Ready(guard) => f
                .debug_tuple("Ready")
                .field(&format_args!("{}/{}", guard.len(), guard.capacity()))
                .finish(),
            SlotAcquire::Retry => f.write_str("Retry"),
            SlotAcquire::Stop => f.write_str("Stop"),
        }
    }
}

/// A blocking discipline over a [`BoundedQueue`].
///
/// Both implementations guarantee that occupancy never exceeds capacity, that
/// every wait is bounded by the configured timeout, and that a cleared
/// liveness flag is noticed before any further queue mutation.
pub trait SyncPolicy: Send + Sync {
    fn discipline(&self) -> Discipline;

    /// The exclusive lock over all queue state.
    fn queue(&self) -> &Mutex<BoundedQueue>;

    fn acquire_produce_slot(&self, live: &Liveness) -> SlotAcquire<'_>;

    /// Publishes a completed enqueue to consumers and unlocks the queue.
    fn release_produce_slot(&self, guard: MutexGuard<'_, BoundedQueue>);

    fn acquire_consume_slot(&self, live: &Liveness) -> SlotAcquire<'_>;

    /// Publishes a completed dequeue to producers and unlocks the queue.
    fn release_consume_slot(&self, guard: MutexGuard<'_, BoundedQueue>);

    /// Called after a resize request was recorded, with the lock released.
    fn resize_requested(&self, direction: ResizeDirection);

    /// Called after a resize was applied or abandoned, with the lock released.
    fn resize_settled(&self, outcome: &ResizeOutcome);

    /// Unblocks every waiter so retired or stopping workers can leave.
    /// `workers` is the number of workers that may currently be blocked.
    fn wake_all(&self, workers: usize);

    /// A worker is about to terminate.
    fn worker_exited(&self) {}

    /// `(empty_slots, filled_slots)` for disciplines that count permits.
    fn permit_counts(&self) -> Option<(usize, usize)> {
        None
    }
}

/// Which [`SyncPolicy`] a session runs with.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Discipline {
    /// Counting permits for empty and filled slots.
    Permit,
    /// One lock and two condition variables.
    #[default]
    Monitor,
}

impl Discipline {
    /// Largest queue capacity the discipline can track.
    pub fn max_capacity(self) -> usize {
        match self {
            Discipline::Permit => MAX_PERMITS,
            Discipline::Monitor => usize::MAX,
        }
    }

    pub fn build(self, queue: BoundedQueue, config: &SessionConfig) -> Arc<dyn SyncPolicy> {
        match self {
            Discipline::Permit => Arc::new(PermitPolicy::new(
                queue,
                config.wait_timeout,
                config.retry_backoff,
            )),
            Discipline::Monitor => Arc::new(MonitorPolicy::new(queue, config.wait_timeout)),
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discipline::Permit => f.write_str("permits"),
            Discipline::Monitor => f.write_str("monitor"),
        }
    }
}

impl FromStr for Discipline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "permit" | "permits" | "sem" | "semaphore" | "semaphores" => Ok(Discipline::Permit),
            "monitor" | "cond" | "condvar" => Ok(Discipline::Monitor),
            other => Err(format!("unknown discipline '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discipline_parses_aliases() {
        assert_eq!("sem".parse::<Discipline>(), Ok(Discipline::Permit));
        assert_eq!("Monitor".parse::<Discipline>(), Ok(Discipline::Monitor));
        assert!("spinlock".parse::<Discipline>().is_err());
    }

    #[test]
    fn permit_capacity_is_bounded_by_the_permit_word() {
        assert_eq!(Discipline::Permit.max_capacity(), MAX_PERMITS);
        assert_eq!(Discipline::Monitor.max_capacity(), usize::MAX);
    }
}
