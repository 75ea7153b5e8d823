//! Explicit reference counting for pooled records and their payloads.

use std::any::Any;
use std::sync::atomic::{fence, AtomicI32, Ordering};

/// Atomic reference counter.
///
/// `decrement` uses release ordering and issues an acquire fence when
/// the count reaches zero, so the thread performing the final teardown
/// observes every write made by threads that released earlier.
#[derive(Debug)]
pub struct RefCount {
    count: AtomicI32,
}

impl RefCount {
    /// Creates a counter holding `initial` references.
    pub const fn new(initial: i32) -> Self {
        Self {
            count: AtomicI32::new(initial),
        }
    }

    /// Adds a reference; returns the new count.
    ///
    /// Callers must already hold a reference (count > 0), so relaxed
    /// ordering suffices for the increment itself.
    #[inline]
    pub fn increment(&self) -> i32 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Drops a reference; returns the new count. A return of zero means
    /// the caller owns the teardown.
    #[inline]
    #[must_use]
    pub fn decrement(&self) -> i32 {
        let prev = self.count.fetch_sub(1, Ordering::Release);
        if prev == 1 {
            fence(Ordering::Acquire);
        }
        prev - 1
    }

    /// Current count. Relaxed; diagnostic only.
    #[inline]
    pub fn get(&self) -> i32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Re-arms a quiescent counter (pool re-acquisition path). Only
    /// valid while no other thread holds a reference.
    #[inline]
    pub(crate) fn rearm(&self, value: i32) {
        self.count.store(value, Ordering::Release);
    }
}

/// A payload a command can carry without knowing its concrete type.
///
/// Payloads are shared as `Arc<dyn CommandPayload>`: taking a reference
/// is an `Arc` clone, releasing one is a drop, and the backing object is
/// torn down exactly once when the last holder lets go. `as_any` lets a
/// consumer that recognizes the command type downcast to the concrete
/// payload.
pub trait CommandPayload: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_increment_decrement() {
        let refs = RefCount::new(1);
        assert_eq!(refs.increment(), 2);
        assert_eq!(refs.decrement(), 1);
        assert_eq!(refs.decrement(), 0);
    }

    #[test]
    fn test_concurrent_balance() {
        let refs = Arc::new(RefCount::new(1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let refs = Arc::clone(&refs);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        refs.increment();
                        let _ = refs.decrement();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(refs.get(), 1);
    }
}
