// Opportunistic live resize of the shared queue.

use crate::error::{QueueError, QueueResult};
use crate::MPMC::Buffer::{BoundedQueue, ResizeDirection, ResizeState};
use crate::MPMC::Policy::SyncPolicy;

use std::sync::Arc;
use tracing::{info, warn};

/// A settled resize, applied or abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeOutcome {
    pub direction: ResizeDirection,
    pub from: usize,
    pub to: usize,
    pub result: QueueResult<()>,
}

impl ResizeOutcome {
    pub fn applied(&self) -> bool {
        self.result.is_ok()
    }
}

/// Drives `Idle -> Requested -> Applying -> Idle`.
///
/// There is no coordinator thread. The control surface records a request,
/// and whichever consumer next holds the queue lock and sees it ready
/// applies it. A grow is always ready; a shrink waits until consumers have
/// drained occupancy down to the target, so live entries are never dropped.
#[derive(Clone)]
pub struct ResizeCoordinator {
    policy: Arc<dyn SyncPolicy>,
}

impl ResizeCoordinator {
    pub fn new(policy: Arc<dyn SyncPolicy>) -> Self {
        Self { policy }
    }

    /// Records a request to change the capacity by `delta` and returns the
    /// target capacity.
    pub fn request(&self, direction: ResizeDirection, delta: usize) -> QueueResult<usize> {
        let mut queue = self.policy.queue().lock();

        if let Some((_, target)) = queue.resize_state().pending() {
            return Err(QueueError::ResizeAlreadyPending { target });
        }

        let capacity = queue.capacity();
        if delta == 0 {
            return Err(QueueError::InvalidCapacity {
                requested: capacity,
            });
        }
        let target = match direction {
            ResizeDirection::Grow => capacity
                .checked_add(delta)
                .ok_or(QueueError::InvalidCapacity {
                    requested: usize::MAX,
                })?,
            ResizeDirection::Shrink => capacity
                .checked_sub(delta)
                .filter(|&target| target > 0)
                .ok_or(QueueError::InvalidCapacity { requested: 0 })?,
        };
        if target > self.policy.discipline().max_capacity() {
            return Err(QueueError::InvalidCapacity { requested: target });
        }

        queue.resize = ResizeState::Requested { direction, target };
        let count = queue.len();
        drop(queue);

        info!(?direction, from = capacity, target, count, "resize requested");
        self.policy.resize_requested(direction);
        Ok(target)
    }

    /// Applies the pending request if it is ready. The caller holds the lock.
    ///
    /// The request is cleared whether the resize succeeds or fails; a failure
    /// leaves the queue at its prior capacity.
    pub fn apply_pending(&self, queue: &mut BoundedQueue, worker: usize) -> Option<ResizeOutcome> {
        let (direction, target) = match queue.resize_state() {
            ResizeState::Requested { direction, target } => (direction, target),
            _ => return None,
        };
        if !queue.resize_ready() {
            return None;
        }

        let from = queue.capacity();
        queue.resize = ResizeState::Applying { direction, target };
        let result = queue.resize(target);
        queue.resize = ResizeState::Idle;

        match &result {
            Ok(()) => info!(
                consumer = worker,
                ?direction,
                from,
                to = target,
                count = queue.len(),
                "resize complete"
            ),
            Err(e) => warn!(consumer = worker, ?direction, error = %e, "resize failed, clearing request"),
        }

        Some(ResizeOutcome {
            direction,
            from,
            to: target,
            result,
        })
    }

    /// Lets the policy react to a settled resize. Call with the lock released.
    pub fn settle(&self, outcome: &ResizeOutcome) {
        self.policy.resize_settled(outcome);
    }

    /// Lock, apply if ready, unlock, settle.
    pub fn poll(&self, worker: usize) -> Option<ResizeOutcome> {
        let outcome = {
            let mut queue = self.policy.queue().lock();
            self.apply_pending(&mut queue, worker)
        }?;
        self.settle(&outcome);
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MPMC::builder::SessionConfig;
    use crate::MPMC::Policy::Discipline;

    #[test]
    fn failed_grow_clears_request_and_keeps_permits() {
        let policy = Discipline::Permit.build(BoundedQueue::new(10).unwrap(), &SessionConfig::default());
        let coordinator = ResizeCoordinator::new(policy.clone());
        coordinator.request(ResizeDirection::Grow, 1).unwrap();
        let before = policy.permit_counts();

        // Past the request checks: only the allocation can refuse this one
        policy.queue().lock().resize = ResizeState::Requested {
            direction: ResizeDirection::Grow,
            target: usize::MAX,
        };

        let outcome = coordinator.poll(0).unwrap();
        assert!(!outcome.applied());
        assert!(matches!(outcome.result, Err(QueueError::AllocationFailure { .. })));
        assert_eq!((outcome.from, outcome.to), (10, usize::MAX));

        let queue = policy.queue().lock();
        assert_eq!(queue.capacity(), 10);
        assert!(queue.resize_state().is_idle());
        drop(queue);
        assert_eq!(policy.permit_counts(), before);
    }
}
