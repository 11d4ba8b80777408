//! Error types for the queue, the resize protocol and the worker pool

use crate::MPMC::pool::Role;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Allocation of {bytes} bytes failed")]
    AllocationFailure { bytes: usize },

    #[error("Invalid queue capacity: {requested}")]
    InvalidCapacity { requested: usize },

    #[error("Invalid payload length: {len}")]
    InvalidPayload { len: usize },

    #[error("Resize to {target} would truncate {count} live messages")]
    WouldTruncate { target: usize, count: usize },

    #[error("A resize to {target} is already pending")]
    ResizeAlreadyPending { target: usize },

    #[error("Integrity mismatch: stored hash {stored:#06x}, computed {computed:#06x}")]
    IntegrityMismatch { stored: u16, computed: u16 },
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Maximum number of {role}s reached ({max})")]
    WorkerLimit { role: Role, max: usize },

    #[error("There are no active {role}s to retire")]
    NoActiveWorker { role: Role },

    #[error("Session is shutting down")]
    ShuttingDown,

    #[error("Failed to spawn {role} thread: {source}")]
    Spawn {
        role: Role,
        #[source]
        source: std::io::Error,
    },
}

pub type QueueResult<T> = Result<T, QueueError>;
pub type PoolResult<T> = Result<T, PoolError>;
