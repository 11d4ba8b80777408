use super::contract::{Discipline, SlotAcquire, SyncPolicy};
use crate::MPMC::pool::Liveness;
use crate::MPMC::resize::ResizeOutcome;
use crate::MPMC::Buffer::{BoundedQueue, ResizeDirection};

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Monitor discipline: the queue lock plus two predicate wait-queues.
///
/// - `can_produce` waits for `count < capacity` with no resize pending.
/// - `can_consume` waits for `count > 0`, or for a resize a consumer could
///   apply right now.
///
/// Predicates are re-checked after every wake, and each wait is re-armed with
/// a fresh timeout, so spurious and stolen wake-ups only cost a loop turn.
pub struct MonitorPolicy {
    queue: Mutex<BoundedQueue>,
    can_produce: Condvar,
    can_consume: Condvar,
    wait_timeout: Duration,
}

impl MonitorPolicy {
    pub fn new(queue: BoundedQueue, wait_timeout: Duration) -> Self {
        Self {
            queue: Mutex::new(queue),
            can_produce: Condvar::new(),
            can_consume: Condvar::new(),
            wait_timeout,
        }
    }

    fn broadcast(&self) {
        self.can_produce.notify_all();
        self.can_consume.notify_all();
    }
}

impl SyncPolicy for MonitorPolicy {
    fn discipline(&self) -> Discipline {
        Discipline::Monitor
    }

    fn queue(&self) -> &Mutex<BoundedQueue> {
        &self.queue
    }

    fn acquire_produce_slot(&self, live: &Liveness) -> SlotAcquire<'_> {
        let mut guard = self.queue.lock();
        loop {
            if !live.is_live() {
                return SlotAcquire::Stop;
            }
            if guard.accepts_produce() {
                return SlotAcquire::Ready(guard);
            }
            let result = self.can_produce.wait_for(&mut guard, self.wait_timeout);
            if result.timed_out() && !guard.accepts_produce() {
                return if live.is_live() {
                    SlotAcquire::Retry
                } else {
                    SlotAcquire::Stop
                };
            }
        }
    }

    fn release_produce_slot(&self, guard: MutexGuard<'_, BoundedQueue>) {
        self.can_consume.notify_one();
        drop(guard);
    }

    fn acquire_consume_slot(&self, live: &Liveness) -> SlotAcquire<'_> {
        let mut guard = self.queue.lock();
        loop {
            if !live.is_live() {
                return SlotAcquire::Stop;
            }
            if guard.resize_ready() {
                // The caller runs the resize before consuming
                return SlotAcquire::Retry;
            }
            if !guard.is_empty() {
                return SlotAcquire::Ready(guard);
            }
            let result = self.can_consume.wait_for(&mut guard, self.wait_timeout);
            if result.timed_out() && guard.is_empty() && !guard.resize_ready() {
                return if live.is_live() {
                    SlotAcquire::Retry
                } else {
                    SlotAcquire::Stop
                };
            }
        }
    }

    fn release_consume_slot(&self, guard: MutexGuard<'_, BoundedQueue>) {
        self.can_produce.notify_one();
        drop(guard);
    }

    fn resize_requested(&self, _direction: ResizeDirection) {
        self.can_consume.notify_all();
    }

    fn resize_settled(&self, _outcome: &ResizeOutcome) {
        self.broadcast();
    }

    fn wake_all(&self, _workers: usize) {
        // Liveness flags change outside the lock; taking it here orders the
        // broadcast after any waiter's last flag check.
        let _guard = self.queue.lock();
        self.broadcast();
    }

    fn worker_exited(&self) {
        let _guard = self.queue.lock();
        self.broadcast();
    }
}
