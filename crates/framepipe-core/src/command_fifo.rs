//! FIFO of pooled commands with ownership-transfer semantics.
//!
//! Writing moves the caller's [`CommandRef`] into the FIFO; reading
//! moves one out. Neither direction touches the reference count, so the
//! FIFO holds exactly one reference per queued command. Dropping the
//! FIFO disables flow and drains, which releases every remaining
//! command back to its pool.

use std::sync::Arc;
use std::time::Duration;

use crate::command::CommandRef;
use crate::fifo::{FifoConfig, FifoMetrics, FifoObserver, WaitableFifo};
use crate::ring::FifoMode;
use crate::status::{FifoStatus, RejectedWrite};

/// Bounded command queue between one pipeline stage and the next.
pub struct CommandFifo {
    fifo: WaitableFifo<CommandRef>,
}

impl CommandFifo {
    /// Creates a command FIFO. `mode` follows the thread layout of the
    /// two stages it connects.
    pub fn new(capacity: usize, mode: FifoMode) -> Self {
        Self {
            fifo: WaitableFifo::new(capacity, mode),
        }
    }

    /// Creates a command FIFO whose head events go to `observer`.
    pub fn with_observer(
        capacity: usize,
        mode: FifoMode,
        observer: Arc<dyn FifoObserver>,
        tag: u32,
    ) -> Self {
        Self {
            fifo: WaitableFifo::with_observer(
                FifoConfig::new(capacity, mode).tag(tag),
                observer,
            ),
        }
    }

    /// Enqueues a command, transferring the caller's reference in.
    ///
    /// On rejection the reference comes back in the error so the caller
    /// can release or retry it.
    pub fn write(&self, cmd: CommandRef) -> Result<(), RejectedWrite<CommandRef>> {
        self.fifo.write(cmd)
    }

    /// Enqueues a command at the front; the next read returns it.
    pub fn preempt(&self, cmd: CommandRef) -> Result<(), RejectedWrite<CommandRef>> {
        self.fifo.preempt(cmd)
    }

    /// Dequeues the next command, transferring its reference to the
    /// caller, who releases it by dropping.
    pub fn read(&self) -> Option<CommandRef> {
        self.fifo.read()
    }

    pub fn wait_write_space(&self) -> FifoStatus {
        self.fifo.wait_write_space()
    }

    pub fn wait_write_space_timed(&self, timeout: Duration) -> FifoStatus {
        self.fifo.wait_write_space_timed(timeout)
    }

    pub fn try_wait_write_space(&self) -> FifoStatus {
        self.fifo.try_wait_write_space()
    }

    pub fn wait_read_data(&self) -> FifoStatus {
        self.fifo.wait_read_data()
    }

    pub fn wait_read_data_timed(&self, timeout: Duration) -> FifoStatus {
        self.fifo.wait_read_data_timed(timeout)
    }

    pub fn try_wait_read_data(&self) -> FifoStatus {
        self.fifo.try_wait_read_data()
    }

    /// See [`WaitableFifo::set_flow_enabled`].
    pub fn set_flow_enabled(&self, enabled: bool) {
        self.fifo.set_flow_enabled(enabled);
    }

    pub fn flow_enabled(&self) -> bool {
        self.fifo.flow_enabled()
    }

    pub fn stored_count(&self) -> usize {
        self.fifo.stored_count()
    }

    pub fn capacity(&self) -> usize {
        self.fifo.capacity()
    }

    pub fn has_been_read(&self) -> bool {
        self.fifo.has_been_read()
    }

    pub fn metrics(&self) -> FifoMetrics {
        self.fifo.metrics()
    }
}

impl Drop for CommandFifo {
    fn drop(&mut self) {
        // Stop writers first, then release whatever is still queued so
        // payloads are freed and records go back to their pools.
        self.fifo.set_flow_enabled(false);
        let mut drained = 0usize;
        while self.fifo.read().is_some() {
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!(drained, "command fifo dropped with queued commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandType;
    use crate::pool::CommandPool;
    use crate::refcount::CommandPayload;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_write_read_transfers_ownership() {
        let pool = CommandPool::new(2, 0);
        let fifo = CommandFifo::new(4, FifoMode::Lockless);
        fifo.set_flow_enabled(true);

        let cmd = pool.acquire().unwrap();
        cmd.init(CommandType::Flush);
        fifo.write(cmd).unwrap();
        assert_eq!(pool.in_use_count(), 1);

        let out = fifo.read().unwrap();
        assert_eq!(out.command_type(), CommandType::Flush);
        assert_eq!(out.ref_count(), 1);
        drop(out);
        assert_eq!(pool.in_use_count(), 0);
    }

    #[test]
    fn test_rejected_write_returns_command() {
        let pool = CommandPool::new(2, 0);
        let fifo = CommandFifo::new(1, FifoMode::Lockless);
        fifo.set_flow_enabled(true);

        let first = pool.acquire().unwrap();
        fifo.write(first).unwrap();

        let second = pool.acquire().unwrap();
        second.init(CommandType::EndOfStream);
        let err = fifo.write(second).unwrap_err();
        assert_eq!(err.status, FifoStatus::FifoFull);
        assert_eq!(err.item.command_type(), CommandType::EndOfStream);

        drop(err.item);
        assert_eq!(pool.in_use_count(), 1);
    }

    struct DropCounter(Arc<AtomicUsize>);
    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }
    impl CommandPayload for DropCounter {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_drop_drains_and_releases() {
        let drops = Arc::new(AtomicUsize::new(0));
        let pool = CommandPool::new(3, 0);
        let fifo = CommandFifo::new(4, FifoMode::Blocking);
        fifo.set_flow_enabled(true);

        for _ in 0..3 {
            let cmd = pool.acquire().unwrap();
            cmd.init(CommandType::Frame);
            cmd.set_payload(Arc::new(DropCounter(Arc::clone(&drops))));
            fifo.write(cmd).unwrap();
        }
        assert_eq!(pool.in_use_count(), 3);

        drop(fifo);
        assert_eq!(drops.load(Ordering::Relaxed), 3);
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn test_preempted_command_read_first() {
        let pool = CommandPool::new(3, 0);
        let fifo = CommandFifo::new(4, FifoMode::Blocking);
        fifo.set_flow_enabled(true);

        let a = pool.acquire().unwrap();
        a.init(CommandType::Frame);
        fifo.write(a).unwrap();

        let flush = pool.acquire().unwrap();
        flush.init(CommandType::Flush);
        fifo.preempt(flush).unwrap();

        assert_eq!(fifo.read().unwrap().command_type(), CommandType::Flush);
        assert_eq!(fifo.read().unwrap().command_type(), CommandType::Frame);
    }
}
