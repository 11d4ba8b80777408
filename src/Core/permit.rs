// Counting permit (semaphore) over a single futex word.

use crate::Core::futex::{futex_wait, futex_wake};
use crossbeam_utils::{Backoff, CachePadded};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Most permits a [`CountingPermit`] holds at once. Keeps the futex word well
/// clear of overflow.
pub const MAX_PERMITS: usize = u32::MAX as usize / 2;

/// A counting permit: `acquire` blocks while the count is zero, `release`
/// increments it and wakes sleepers.
///
/// The counter is cache padded because the two permits of a queue are hammered
/// from opposite sides (producers take `empty_slots`, consumers take
/// `filled_slots`).
pub struct CountingPermit {
    count: CachePadded<AtomicU32>,
}

impl CountingPermit {
    pub fn new(initial: usize) -> Self {
        Self {
            count: CachePadded::new(AtomicU32::new(clamp(initial))),
        }
    }

    /// Takes one permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let backoff = Backoff::new();
        let mut current = self.count.load(Ordering::Relaxed);
        while current > 0 {
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => {
                    current = actual;
                    backoff.spin();
                }
            }
        }
        false
    }

    /// Takes one permit, sleeping for at most `timeout`.
    /// Returns `false` if the timeout elapsed without a permit.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            futex_wait(&self.count, 0, deadline - now);
        }
    }

    /// Adds up to `n` permits, saturating at [`MAX_PERMITS`], and wakes as
    /// many sleepers. Returns how many permits were actually added.
    pub fn release(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let wanted = clamp(n);
        let previous = self
            .count
            .fetch_update(Ordering::Release, Ordering::Relaxed, |c| {
                Some(c.saturating_add(wanted).min(MAX_PERMITS as u32))
            })
            .unwrap_or_else(|c| c);
        let posted = previous
            .saturating_add(wanted)
            .min(MAX_PERMITS as u32)
            .saturating_sub(previous);
        if posted > 0 {
            futex_wake(&self.count, posted);
        }
        posted as usize
    }

    /// Current number of available permits. Racy by nature; for status only.
    pub fn available(&self) -> usize {
        self.count.load(Ordering::Acquire) as usize
    }
}

fn clamp(n: usize) -> u32 {
    n.min(MAX_PERMITS) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_drains_initial_permits() {
        let permit = CountingPermit::new(2);
        assert!(permit.try_acquire());
        assert!(permit.try_acquire());
        assert!(!permit.try_acquire());
        assert_eq!(permit.available(), 0);
    }

    #[test]
    fn acquire_timeout_expires_without_permits() {
        let permit = CountingPermit::new(0);
        let start = Instant::now();
        assert!(!permit.acquire_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn release_wakes_blocked_acquirer() {
        let permit = Arc::new(CountingPermit::new(0));
        let waiter = {
            let permit = permit.clone();
            thread::spawn(move || permit.acquire_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        permit.release(1);
        assert!(waiter.join().unwrap());
        assert_eq!(permit.available(), 0);
    }

    #[test]
    fn release_saturates_and_reports_posted() {
        let permit = CountingPermit::new(MAX_PERMITS - 2);
        assert_eq!(permit.release(5), 2);
        assert_eq!(permit.available(), MAX_PERMITS);
        assert_eq!(permit.release(1), 0);
        assert_eq!(CountingPermit::new(usize::MAX).available(), MAX_PERMITS);
    }

    #[test]
    fn release_zero_is_noop() {
        let permit = CountingPermit::new(3);
        assert_eq!(permit.release(0), 0);
        assert_eq!(permit.available(), 3);
    }
}
