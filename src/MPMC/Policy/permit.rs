use super::contract::{Discipline, SlotAcquire, SyncPolicy, WAKE_SLACK};
use crate::Core::CountingPermit;
use crate::MPMC::pool::Liveness;
use crate::MPMC::resize::ResizeOutcome;
use crate::MPMC::Buffer::{BoundedQueue, ResizeDirection};

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Counting-permit discipline.
///
/// `empty_slots` starts at the capacity and `filled_slots` at the occupancy.
/// A producer takes an empty permit before locking the queue and posts a
/// filled permit after unlocking; consumers mirror that.
///
/// ### Permit drift:
/// Permits are only an upper bound on real free slots. A shrink may fail to
/// claw back every surplus empty permit, and wake-up broadcasts over-post on
/// purpose. Both are recorded in `debt` and repaid lazily: a consumer skips
/// its empty post while debt is outstanding, and a producer that finds the
/// queue full with a permit in hand discards it. Outside a resize,
/// `empty_slots - debt` equals the real number of free slots. A discard
/// between a shrink and its settle can push `debt` briefly below zero; the
/// settle's shortfall brings it back. The under-lock re-check keeps occupancy
/// bounded regardless of drift.
pub struct PermitPolicy {
    queue: Mutex<BoundedQueue>,
    empty_slots: CountingPermit,
    filled_slots: CountingPermit,
    debt: AtomicIsize,
    wait_timeout: Duration,
    retry_backoff: Duration,
}

impl PermitPolicy {
    pub fn new(queue: BoundedQueue, wait_timeout: Duration, retry_backoff: Duration) -> Self {
        let empty = queue.free_slots();
        let filled = queue.len();
        Self {
            queue: Mutex::new(queue),
            empty_slots: CountingPermit::new(empty),
            filled_slots: CountingPermit::new(filled),
            debt: AtomicIsize::new(0),
            wait_timeout,
            retry_backoff,
        }
    }

    /// Surplus empty permits not yet reconciled.
    pub fn permit_debt(&self) -> isize {
        self.debt.load(Ordering::Acquire)
    }

    /// Consumer side: swallow one empty post if any debt is outstanding.
    fn repay_debt(&self) -> bool {
        self.debt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| (d > 0).then(|| d - 1))
            .is_ok()
    }

    fn timed_out<'a>(live: &Liveness) -> SlotAcquire<'a> {
        if live.is_live() {
            SlotAcquire::Retry
        } else {
            SlotAcquire::Stop
        }
    }
}

impl SyncPolicy for PermitPolicy {
    fn discipline(&self) -> Discipline {
        Discipline::Permit
    }

    fn queue(&self) -> &Mutex<BoundedQueue> {
        &self.queue
    }

    fn acquire_produce_slot(&self, live: &Liveness) -> SlotAcquire<'_> {
        if !live.is_live() {
            return SlotAcquire::Stop;
        }

        // Stay off the permits while a resize is pending
        if !self.queue.lock().resize_state().is_idle() {
            thread::sleep(self.retry_backoff);
            return SlotAcquire::Retry;
        }

        if !self.empty_slots.acquire_timeout(self.wait_timeout) {
            return Self::timed_out(live);
        }
        if !live.is_live() {
            self.empty_slots.release(1);
            return SlotAcquire::Stop;
        }

        let guard = self.queue.lock();
        if !guard.resize_state().is_idle() {
            drop(guard);
            self.empty_slots.release(1);
            trace!("resize pending after taking a slot permit, backing off");
            thread::sleep(self.retry_backoff);
            return SlotAcquire::Retry;
        }
        if guard.is_full() {
            // Surplus permit: no real slot behind it
            drop(guard);
            self.debt.fetch_sub(1, Ordering::AcqRel);
            trace!("discarded surplus empty-slot permit");
            return SlotAcquire::Retry;
        }
        SlotAcquire::Ready(guard)
    }

    fn release_produce_slot(&self, guard: MutexGuard<'_, BoundedQueue>) {
        drop(guard);
        self.filled_slots.release(1);
    }

    fn acquire_consume_slot(&self, live: &Liveness) -> SlotAcquire<'_> {
        if !live.is_live() {
            return SlotAcquire::Stop;
        }

        if !self.filled_slots.acquire_timeout(self.wait_timeout) {
            return Self::timed_out(live);
        }
        if !live.is_live() {
            self.filled_slots.release(1);
            return SlotAcquire::Stop;
        }

        let guard = self.queue.lock();
        if guard.resize_ready() {
            // Let the caller apply the resize first; the item stays claimable
            drop(guard);
            self.filled_slots.release(1);
            return SlotAcquire::Retry;
        }
        if guard.is_empty() {
            drop(guard);
            trace!("discarded surplus filled-slot permit");
            return SlotAcquire::Retry;
        }
        SlotAcquire::Ready(guard)
    }

    fn release_consume_slot(&self, guard: MutexGuard<'_, BoundedQueue>) {
        drop(guard);
        if !self.repay_debt() {
            self.empty_slots.release(1);
        }
    }

    fn resize_requested(&self, _direction: ResizeDirection) {
        // Nudge an idle consumer so it notices the request before its timeout
        self.filled_slots.release(1);
    }

    fn resize_settled(&self, outcome: &ResizeOutcome) {
        if outcome.result.is_err() {
            return;
        }
        if outcome.to > outcome.from {
            let added = outcome.to - outcome.from;
            let posted = self.empty_slots.release(added);
            if posted < added {
                // Unposted slots simply stay unused; no debt to record
                warn!(added, posted, "grow hit the permit ceiling");
            }
        } else if outcome.from > outcome.to {
            let excess = outcome.from - outcome.to;
            let shortfall = (0..excess)
                .filter(|_| !self.empty_slots.try_acquire())
                .count();
            if shortfall > 0 {
                self.debt.fetch_add(shortfall as isize, Ordering::AcqRel);
                info!(
                    shortfall,
                    debt = self.permit_debt(),
                    "shrink could not remove every empty-slot permit immediately"
                );
            }
        }
    }

    fn wake_all(&self, workers: usize) {
        let capacity = self.queue.lock().capacity();
        let posts = capacity.saturating_add(workers).saturating_add(WAKE_SLACK);
        let surplus = self.empty_slots.release(posts);
        self.filled_slots.release(posts);
        // Only what actually landed on the empty side is surplus
        self.debt.fetch_add(surplus as isize, Ordering::AcqRel);
        debug!(posts, surplus, "posted wake-up permits");
    }

    fn permit_counts(&self) -> Option<(usize, usize)> {
        Some((self.empty_slots.available(), self.filled_slots.available()))
    }
}
