//! Free-list pool of command records.
//!
//! Producers acquire commands per event; the final release on each one
//! pushes its record back here. Acquire never blocks: a capped pool
//! that is fully checked out returns `None` and the caller decides
//! whether to drop the event or back off.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::{CommandRecord, CommandRef};

struct PoolInner {
    free: Vec<Arc<CommandRecord>>,
    total: u32,
}

/// Pool state shared with the records themselves, so a command's final
/// release can find its way home.
pub(crate) struct PoolShared {
    inner: Mutex<PoolInner>,
    max_size: u32,
}

impl PoolShared {
    pub(crate) fn return_record(&self, record: Arc<CommandRecord>) {
        let mut inner = self.inner.lock();
        inner.free.push(record);
    }
}

/// Pool of reusable command records.
///
/// `max_size == 0` means the pool grows without bound; otherwise
/// acquisition fails once `max_size` records are checked out.
pub struct CommandPool {
    shared: Arc<PoolShared>,
}

impl CommandPool {
    /// Creates a pool with `initial_size` records pre-allocated.
    pub fn new(initial_size: u32, max_size: u32) -> Self {
        let shared = Arc::new(PoolShared {
            inner: Mutex::new(PoolInner {
                free: Vec::with_capacity(initial_size as usize),
                total: 0,
            }),
            max_size,
        });
        {
            let mut inner = shared.inner.lock();
            for _ in 0..initial_size {
                inner.free.push(CommandRecord::new(Arc::downgrade(&shared)));
            }
            inner.total = initial_size;
        }
        Self { shared }
    }

    /// Takes a command out of the pool, growing it if allowed.
    ///
    /// The command comes back with refcount 1, type `None` and every
    /// field cleared. Returns `None` when the pool is capped and
    /// nothing is free.
    pub fn acquire(&self) -> Option<CommandRef> {
        let record = {
            let mut inner = self.shared.inner.lock();
            match inner.free.pop() {
                Some(record) => record,
                None => {
                    if self.shared.max_size != 0 && inner.total >= self.shared.max_size {
                        return None;
                    }
                    inner.total += 1;
                    tracing::debug!(total = inner.total, "command pool grew");
                    CommandRecord::new(Arc::downgrade(&self.shared))
                }
            }
        };
        record.arm();
        Some(CommandRef::from_record(record))
    }

    /// Records ever allocated by this pool.
    pub fn total_count(&self) -> u32 {
        self.shared.inner.lock().total
    }

    /// Records currently on the free list.
    pub fn free_count(&self) -> u32 {
        self.shared.inner.lock().free.len() as u32
    }

    /// Records currently checked out.
    pub fn in_use_count(&self) -> u32 {
        let inner = self.shared.inner.lock();
        inner.total - inner.free.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandType;

    #[test]
    fn test_preallocation() {
        let pool = CommandPool::new(4, 0);
        assert_eq!(pool.total_count(), 4);
        assert_eq!(pool.free_count(), 4);
        assert_eq!(pool.in_use_count(), 0);
    }

    #[test]
    fn test_capped_pool_returns_none() {
        let pool = CommandPool::new(2, 2);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_eq!(pool.total_count(), 2);

        drop(a);
        let c = pool.acquire().unwrap();
        assert_eq!(pool.total_count(), 2);
        drop(b);
        drop(c);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_uncapped_pool_grows() {
        let pool = CommandPool::new(1, 0);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.total_count(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_accounting_invariant() {
        let pool = CommandPool::new(3, 0);
        let held: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
        assert_eq!(
            pool.total_count(),
            pool.free_count() + pool.in_use_count()
        );
        assert_eq!(pool.in_use_count(), 3);
        drop(held);
        assert_eq!(
            pool.total_count(),
            pool.free_count() + pool.in_use_count()
        );
        assert_eq!(pool.in_use_count(), 0);
    }

    #[test]
    fn test_reacquired_command_is_clean() {
        let pool = CommandPool::new(1, 1);
        let cmd = pool.acquire().unwrap();
        cmd.init(CommandType::Frame);
        cmd.set_pts(500);
        drop(cmd);

        let again = pool.acquire().unwrap();
        assert_eq!(again.command_type(), CommandType::None);
        assert_eq!(again.pts(), 0);
        assert!(again.payload().is_none());
        assert_eq!(again.ref_count(), 1);
    }

    #[test]
    fn test_release_after_pool_drop_is_benign() {
        let pool = CommandPool::new(1, 0);
        let cmd = pool.acquire().unwrap();
        drop(pool);
        // The record has nowhere to return; it just dies.
        drop(cmd);
    }
}
