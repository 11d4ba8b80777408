// src/MPMC/consumer.rs

use super::pool::{Role, WorkerContext, WorkerReport};
use super::session::SessionContext;
use crate::MPMC::Policy::SlotAcquire;
use crate::MPMC::Structs::Message;

use std::sync::Arc;
use tracing::{debug, error, info};

/// Body of a consumer thread.
///
/// Each turn first gives a pending resize the chance to run, then takes one
/// message, checks a shrink that the dequeue may have unblocked, and verifies
/// the hash outside the lock. A hash mismatch is reported, counted and
/// otherwise ignored.
pub(crate) fn run(ctx: Arc<SessionContext>, worker: WorkerContext) -> WorkerReport {
    let WorkerContext {
        id, liveness, seed, ..
    } = worker;
    let policy = &ctx.policy;
    let coordinator = &ctx.coordinator;
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut consumed: u64 = 0;
    let mut integrity_failures: u64 = 0;

    info!(consumer = id, discipline = %policy.discipline(), "consumer started");

    while liveness.is_live() {
        if coordinator.poll(id).is_some() {
            continue;
        }

        let mut queue = match policy.acquire_consume_slot(&liveness) {
            SlotAcquire::Ready(queue) => queue,
            SlotAcquire::Retry => continue,
            SlotAcquire::Stop => break,
        };

        let (msg, ordinal) = queue.dequeue();
        let settled = coordinator.apply_pending(&mut queue, id);
        let (count, capacity) = (queue.len(), queue.capacity());
        policy.release_consume_slot(queue);

        if let Some(outcome) = settled {
            coordinator.settle(&outcome);
        }

        consumed += 1;
        if !inspect(&msg, id, ordinal, count, capacity) {
            integrity_failures += 1;
        }
        drop(msg);

        ctx.pause(&liveness, ctx.work_delay(&mut rng));
    }

    liveness.retire();
    policy.worker_exited();
    info!(consumer = id, consumed, integrity_failures, "consumer exiting");

    WorkerReport {
        role: Role::Consumer,
        id,
        processed: consumed,
        integrity_failures,
    }
}

/// Checks the hash of a dequeued message. A mismatch is logged and reported
/// as `false`; the message is never repaired.
fn inspect(msg: &Message, consumer: usize, ordinal: u64, count: usize, capacity: usize) -> bool {
    match msg.check_integrity() {
        Ok(()) => {
            debug!(
                consumer,
                len = msg.len(),
                total_extracted = ordinal,
                count,
                capacity,
                "got message, hash OK"
            );
            true
        }
        Err(e) => {
            error!(consumer, total_extracted = ordinal, error = %e, "HASH MISMATCH");
            false
        }
    }
}
