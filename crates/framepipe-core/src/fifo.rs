//! Waitable FIFO: a circular buffer gated by counting semaphores.
//!
//! The write semaphore starts at the ring capacity and the optional read
//! semaphore at zero, so a producer that waits for write space before
//! each write and a consumer that waits for read data before each read
//! never race the ring itself. An atomic flow gate covers the whole
//! write side: turning flow off makes every write entry point fail fast
//! with [`FifoStatus::FlowDisabled`] and wakes a writer blocked on a
//! full ring. Reads are never gated, so a consumer can drain whatever
//! is pending after its producer has shut down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::ring::{CircularBuffer, FifoMode, HeadMonitor, WaterMarkHandler};
use crate::semaphore::CountingSemaphore;
use crate::status::{FifoStatus, RejectedWrite};

/// Observer notified when a FIFO has a new item at its front.
///
/// The `tag` identifies the FIFO when one observer watches several.
/// Callbacks run on the thread that pushed or popped; they must not call
/// back into the same FIFO.
pub trait FifoObserver: Send + Sync {
    fn on_new_head(&self, tag: u32);
}

/// Re-dispatches ring head events to the configured observer, stamping
/// in the FIFO's tag.
struct ObserverBridge {
    observer: Arc<dyn FifoObserver>,
    tag: u32,
}

impl HeadMonitor for ObserverBridge {
    fn on_new_head(&self) {
        self.observer.on_new_head(self.tag);
    }
}

/// Construction parameters for a [`WaitableFifo`].
#[derive(Debug, Clone, Copy)]
pub struct FifoConfig {
    /// Ring capacity in items.
    pub capacity: usize,
    /// Concurrency mode, fixed for the FIFO's lifetime.
    pub mode: FifoMode,
    /// Whether to create the read-data semaphore. FIFOs polled by their
    /// consumer can skip it.
    pub read_semaphore: bool,
    /// Opaque tag passed through to the observer.
    pub tag: u32,
}

impl FifoConfig {
    /// Config with a read semaphore and a zero tag.
    pub fn new(capacity: usize, mode: FifoMode) -> Self {
        Self {
            capacity,
            mode,
            read_semaphore: true,
            tag: 0,
        }
    }

    /// Sets the observer tag.
    pub fn tag(mut self, tag: u32) -> Self {
        self.tag = tag;
        self
    }

    /// Builds a poll-mode FIFO with no read semaphore.
    pub fn without_read_semaphore(mut self) -> Self {
        self.read_semaphore = false;
        self
    }
}

/// Snapshot of a FIFO's counters, in the spirit of a metrics readout:
/// values are already stale when the caller looks at them.
#[derive(Debug, Clone, Default)]
pub struct FifoMetrics {
    /// Items currently stored.
    pub occupancy: usize,
    /// Ring capacity.
    pub capacity: usize,
    /// Write-semaphore permit count.
    pub write_space: u32,
    /// Read-semaphore permit count (zero when the FIFO has none).
    pub read_ready: u32,
    /// Whether any read has ever succeeded.
    pub has_been_read: bool,
    /// Current flow gate state.
    pub flow_enabled: bool,
}

/// Bounded FIFO with semaphore-gated waits and a write-side flow gate.
///
/// Flow starts disabled; producers cannot write until someone calls
/// `set_flow_enabled(true)`.
pub struct WaitableFifo<T> {
    ring: CircularBuffer<T>,
    write_sem: CountingSemaphore,
    read_sem: Option<CountingSemaphore>,
    flow_enabled: AtomicBool,
    has_been_read: AtomicBool,
    tag: u32,
}

impl<T> WaitableFifo<T> {
    /// Creates a FIFO with a read semaphore and default config.
    pub fn new(capacity: usize, mode: FifoMode) -> Self {
        Self::with_config(FifoConfig::new(capacity, mode))
    }

    /// Creates a FIFO from an explicit config.
    pub fn with_config(config: FifoConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates a FIFO whose head events are dispatched to `observer`.
    pub fn with_observer(config: FifoConfig, observer: Arc<dyn FifoObserver>) -> Self {
        Self::build(config, Some(observer))
    }

    fn build(config: FifoConfig, observer: Option<Arc<dyn FifoObserver>>) -> Self {
        let mut ring = CircularBuffer::new(config.capacity, config.mode);
        if let Some(observer) = observer {
            ring.set_head_monitor(Arc::new(ObserverBridge {
                observer,
                tag: config.tag,
            }));
        }
        Self {
            ring,
            write_sem: CountingSemaphore::new(config.capacity as u32),
            read_sem: config
                .read_semaphore
                .then(|| CountingSemaphore::new(0)),
            flow_enabled: AtomicBool::new(false),
            has_been_read: AtomicBool::new(false),
            tag: config.tag,
        }
    }

    /// Installs water-mark handlers on the underlying ring. Must happen
    /// before the FIFO is shared between threads.
    pub fn set_water_marks(
        &mut self,
        high: usize,
        low: usize,
        on_high: WaterMarkHandler,
        on_low: WaterMarkHandler,
    ) {
        self.ring.set_water_marks(high, low, on_high, on_low);
    }

    /// Appends an item; the corresponding read permit is posted on
    /// success. Fails fast when flow is disabled or the ring is full.
    pub fn write(&self, item: T) -> Result<(), RejectedWrite<T>> {
        if !self.flow_enabled() {
            return Err(RejectedWrite::new(FifoStatus::FlowDisabled, item));
        }
        match self.ring.push(item) {
            Ok(()) => {
                self.signal_read();
                Ok(())
            }
            Err(item) => Err(RejectedWrite::new(FifoStatus::FifoFull, item)),
        }
    }

    /// Inserts an item at the front so the next read returns it.
    ///
    /// Respects the flow gate and reports `FifoFull` like a write. Only
    /// safe in blocking mode (see [`CircularBuffer::preempt`]).
    pub fn preempt(&self, item: T) -> Result<(), RejectedWrite<T>> {
        if !self.flow_enabled() {
            return Err(RejectedWrite::new(FifoStatus::FlowDisabled, item));
        }
        match self.ring.preempt(item) {
            Ok(()) => {
                self.signal_read();
                Ok(())
            }
            Err(item) => Err(RejectedWrite::new(FifoStatus::FifoFull, item)),
        }
    }

    /// Removes the front item, posting one write permit on success.
    ///
    /// Reads are not gated by flow: a consumer drains a disabled FIFO.
    pub fn read(&self) -> Option<T> {
        let item = self.ring.pop();
        if item.is_some() {
            self.write_sem.post();
            self.has_been_read.store(true, Ordering::Release);
        }
        item
    }

    /// Blocks until a write permit is available.
    ///
    /// Returns `FlowDisabled` if flow was off at entry or was turned off
    /// while waiting (the disabler posts a wake permit for this case).
    pub fn wait_write_space(&self) -> FifoStatus {
        if !self.flow_enabled() {
            return FifoStatus::FlowDisabled;
        }
        self.write_sem.wait();
        if self.flow_enabled() {
            FifoStatus::Ok
        } else {
            FifoStatus::FlowDisabled
        }
    }

    /// Bounded [`wait_write_space`](Self::wait_write_space); a zero
    /// timeout means wait forever.
    pub fn wait_write_space_timed(&self, timeout: Duration) -> FifoStatus {
        if timeout.is_zero() {
            return self.wait_write_space();
        }
        if !self.flow_enabled() {
            return FifoStatus::FlowDisabled;
        }
        let acquired = self.write_sem.wait_timed(timeout);
        if !self.flow_enabled() {
            return FifoStatus::FlowDisabled;
        }
        if acquired {
            FifoStatus::Ok
        } else {
            FifoStatus::Timeout
        }
    }

    /// Non-blocking probe for write space; `FifoFull` when none.
    pub fn try_wait_write_space(&self) -> FifoStatus {
        if !self.flow_enabled() {
            return FifoStatus::FlowDisabled;
        }
        let acquired = self.write_sem.try_wait();
        if !self.flow_enabled() {
            return FifoStatus::FlowDisabled;
        }
        if acquired {
            FifoStatus::Ok
        } else {
            FifoStatus::FifoFull
        }
    }

    /// Blocks until an item is readable.
    ///
    /// Returns `Ok` immediately on a FIFO built without a read
    /// semaphore (poll-mode consumers just call [`read`](Self::read)).
    /// Not gated by flow.
    pub fn wait_read_data(&self) -> FifoStatus {
        if let Some(sem) = &self.read_sem {
            sem.wait();
        }
        FifoStatus::Ok
    }

    /// Bounded [`wait_read_data`](Self::wait_read_data); a zero timeout
    /// means wait forever.
    pub fn wait_read_data_timed(&self, timeout: Duration) -> FifoStatus {
        let Some(sem) = &self.read_sem else {
            return FifoStatus::Ok;
        };
        if timeout.is_zero() {
            sem.wait();
            return FifoStatus::Ok;
        }
        if sem.wait_timed(timeout) {
            FifoStatus::Ok
        } else {
            FifoStatus::Timeout
        }
    }

    /// Non-blocking probe for read data; `Timeout` when none.
    pub fn try_wait_read_data(&self) -> FifoStatus {
        let Some(sem) = &self.read_sem else {
            return FifoStatus::Ok;
        };
        if sem.try_wait() {
            FifoStatus::Ok
        } else {
            FifoStatus::Timeout
        }
    }

    /// Opens or closes the write-side gate. Idempotent.
    ///
    /// Closing posts one wake permit to a writer blocked on a full ring
    /// (it re-checks flow and exits with `FlowDisabled`) and one to a
    /// reader blocked on an empty ring (it must be prepared to see no
    /// data). Nothing queued is dropped; the FIFO stays drainable.
    ///
    /// Opening resynchronizes both semaphores to the ring occupancy, so
    /// wake permits that nobody consumed while the gate was closed
    /// cannot skew the counts.
    pub fn set_flow_enabled(&self, enabled: bool) {
        let was = self.flow_enabled.swap(enabled, Ordering::AcqRel);
        if was == enabled {
            return;
        }

        if enabled {
            let stored = self.ring.stored_count();
            let capacity = self.ring.capacity();
            self.write_sem.reset();
            for _ in 0..capacity.saturating_sub(stored) {
                self.write_sem.post();
            }
            if let Some(sem) = &self.read_sem {
                sem.reset();
                for _ in 0..stored {
                    sem.post();
                }
            }
            tracing::debug!(tag = self.tag, stored, "fifo flow enabled");
            return;
        }

        tracing::debug!(tag = self.tag, "fifo flow disabled");
        let stored = self.ring.stored_count();
        if stored == self.ring.capacity() {
            // A producer may be parked waiting for space it will never
            // get; hand it a permit so it can observe the gate.
            self.write_sem.post();
        }
        if stored == 0 {
            if let Some(sem) = &self.read_sem {
                sem.post();
            }
        }
    }

    /// Current flow gate state.
    pub fn flow_enabled(&self) -> bool {
        self.flow_enabled.load(Ordering::Acquire)
    }

    /// Items currently stored.
    pub fn stored_count(&self) -> usize {
        self.ring.stored_count()
    }

    /// Ring capacity in items.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// True once any read has succeeded. One-way latch.
    pub fn has_been_read(&self) -> bool {
        self.has_been_read.load(Ordering::Acquire)
    }

    /// The observer tag this FIFO was built with.
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Counter snapshot for diagnostics.
    pub fn metrics(&self) -> FifoMetrics {
        FifoMetrics {
            occupancy: self.ring.stored_count(),
            capacity: self.ring.capacity(),
            write_space: self.write_sem.count(),
            read_ready: self.read_sem.as_ref().map(|s| s.count()).unwrap_or(0),
            has_been_read: self.has_been_read(),
            flow_enabled: self.flow_enabled(),
        }
    }

    fn signal_read(&self) {
        if let Some(sem) = &self.read_sem {
            sem.post();
        }
    }
}
