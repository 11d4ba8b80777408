use super::session::Session;
use crate::error::QueueResult;
use crate::MPMC::Policy::Discipline;
use std::time::Duration;

/// Capacity a session starts with unless told otherwise.
pub const INITIAL_QUEUE_SIZE: usize = 10;

/// Upper bound on concurrently active workers of one role.
pub const MAX_WORKERS_PER_ROLE: usize = 100;

/// Slots added or removed by `Session::grow` / `Session::shrink`.
pub const DEFAULT_RESIZE_STEP: usize = 5;

/// Everything a session needs to know at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub capacity: usize,
    pub discipline: Discipline,
    pub max_workers_per_role: usize,
    /// Longest single wait on a permit or condition before liveness is re-polled.
    pub wait_timeout: Duration,
    /// Pause after backing off from a pending resize or a stale permit.
    pub retry_backoff: Duration,
    /// Pause after a failed message allocation.
    pub error_backoff: Duration,
    /// Range of the randomized delay between two operations of a worker.
    pub work_delay_min: Duration,
    pub work_delay_max: Duration,
    pub resize_step: usize,
    /// Seed for the per-worker seed generator; random when `None`.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: INITIAL_QUEUE_SIZE,
            discipline: Discipline::Monitor,
            max_workers_per_role: MAX_WORKERS_PER_ROLE,
            wait_timeout: Duration::from_secs(1),
            retry_backoff: Duration::from_millis(10),
            error_backoff: Duration::from_millis(100),
            work_delay_min: Duration::from_millis(500),
            work_delay_max: Duration::from_millis(1500),
            resize_step: DEFAULT_RESIZE_STEP,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn with_discipline(mut self, discipline: Discipline) -> Self {
        self.config.discipline = discipline;
        self
    }

    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.config.max_workers_per_role = max;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.config.error_backoff = backoff;
        self
    }

    /// Workers sleep a random duration in `[min, max)` after each operation.
    /// Pass `Duration::ZERO` twice to run flat out.
    pub fn with_work_delay(mut self, min: Duration, max: Duration) -> Self {
        self.config.work_delay_min = min;
        self.config.work_delay_max = max.max(min);
        self
    }

    pub fn with_resize_step(mut self, step: usize) -> Self {
        self.config.resize_step = step;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Allocates the queue and starts an empty session (no workers yet).
    pub fn build(self) -> QueueResult<Session> {
        Session::start(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_lab_settings() {
        let config = SessionBuilder::new().config().clone();
        assert_eq!(config.capacity, 10);
        assert_eq!(config.max_workers_per_role, 100);
        assert_eq!(config.resize_step, 5);
        assert_eq!(config.wait_timeout, Duration::from_secs(1));
    }

    #[test]
    fn work_delay_max_never_below_min() {
        let builder = SessionBuilder::new()
            .with_work_delay(Duration::from_millis(20), Duration::from_millis(5));
        assert_eq!(builder.config().work_delay_max, Duration::from_millis(20));
    }
}
