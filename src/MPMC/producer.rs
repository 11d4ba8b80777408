// In src/MPMC/producer.rs
use super::pool::{Role, WorkerContext, WorkerReport};
use super::session::SessionContext;
use crate::MPMC::Policy::SlotAcquire;
use crate::MPMC::Structs::Message;

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Body of a producer thread: build a message, reserve a slot, enqueue,
/// publish, sleep a random while. Runs until the worker is retired.
pub(crate) fn run(ctx: Arc<SessionContext>, worker: WorkerContext) -> WorkerReport {
    let WorkerContext {
        id, liveness, seed, ..
    } = worker;
    let policy = &ctx.policy;
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut produced: u64 = 0;
    // A message that could not be placed yet is kept for the next attempt
    let mut staged: Option<Message> = None;

    info!(producer = id, discipline = %policy.discipline(), "producer started");

    while liveness.is_live() {
        let msg = match staged.take() {
            Some(msg) => msg,
            None => match Message::create(&mut rng) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(producer = id, error = %e, "failed to create message, skipping");
                    ctx.pause(&liveness, ctx.config.error_backoff);
                    continue;
                }
            },
        };

        let mut queue = match policy.acquire_produce_slot(&liveness) {
            SlotAcquire::Ready(queue) => queue,
            SlotAcquire::Retry => {
                staged = Some(msg);
                continue;
            }
            SlotAcquire::Stop => break,
        };

        let len = msg.len();
        let ordinal = queue.enqueue(msg);
        let (count, capacity) = (queue.len(), queue.capacity());
        policy.release_produce_slot(queue);

        produced += 1;
        debug!(producer = id, len, total_added = ordinal, count, capacity, "added message");

        ctx.pause(&liveness, ctx.work_delay(&mut rng));
    }

    liveness.retire();
    policy.worker_exited();
    info!(producer = id, produced, "producer exiting");

    WorkerReport {
        role: Role::Producer,
        id,
        processed: produced,
        integrity_failures: 0,
    }
}
