//! Counting semaphore built on a mutex and condvar.
//!
//! The FIFO layer gates its write and read sides on two of these. The
//! surface is deliberately small: post, wait (blocking, try, timed) and
//! a drain-to-zero reset used by the flow-disable wake-up protocol.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A counting semaphore.
///
/// `post` and `wait` are total: they either succeed or block, never
/// spuriously fail. `try_wait` and `wait_timed` report "not acquired"
/// without surfacing any OS-level detail.
pub struct CountingSemaphore {
    count: Mutex<u32>,
    available: Condvar,
}

impl CountingSemaphore {
    /// Creates a semaphore holding `initial` permits.
    pub fn new(initial: u32) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Releases one permit and wakes a waiter.
    pub fn post(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.available.notify_one();
    }

    /// Blocks until a permit is available, then takes it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
    }

    /// Takes a permit if one is available right now.
    ///
    /// Returns true if a permit was taken.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Waits up to `timeout` for a permit.
    ///
    /// Returns true if a permit was taken, false on timeout. A zero
    /// timeout degrades to the untimed [`wait`](Self::wait), matching
    /// the FIFO layer's "non-positive means forever" convention.
    pub fn wait_timed(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            self.wait();
            return true;
        }

        let deadline = std::time::Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count == 0 {
            let remaining = match deadline.checked_duration_since(std::time::Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return false,
            };
            if self.available.wait_for(&mut count, remaining).timed_out() && *count == 0 {
                return false;
            }
        }
        *count -= 1;
        true
    }

    /// Drains all permits in one step.
    ///
    /// Holds the lock for the whole drain, so concurrent posts either
    /// land before the reset (and are drained) or after it.
    pub fn reset(&self) {
        let mut count = self.count.lock();
        *count = 0;
    }

    /// Current permit count. Diagnostic only; stale by the time the
    /// caller looks at it.
    pub fn count(&self) -> u32 {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_post_and_wait() {
        let sem = CountingSemaphore::new(0);
        sem.post();
        sem.post();
        assert_eq!(sem.count(), 2);
        sem.wait();
        sem.wait();
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_try_wait_empty() {
        let sem = CountingSemaphore::new(0);
        assert!(!sem.try_wait());
        sem.post();
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
    }

    #[test]
    fn test_wait_timed_expires() {
        let sem = CountingSemaphore::new(0);
        let start = std::time::Instant::now();
        assert!(!sem.wait_timed(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_wait_timed_acquires() {
        let sem = Arc::new(CountingSemaphore::new(0));
        let poster = Arc::clone(&sem);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post();
        });
        assert!(sem.wait_timed(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_reset_drains() {
        let sem = CountingSemaphore::new(5);
        sem.reset();
        assert_eq!(sem.count(), 0);
        assert!(!sem.try_wait());
    }

    #[test]
    fn test_wait_blocks_until_post() {
        let sem = Arc::new(CountingSemaphore::new(0));
        let waiter = Arc::clone(&sem);
        let handle = thread::spawn(move || {
            waiter.wait();
        });
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        sem.post();
        handle.join().unwrap();
    }
}
