//! Fixed-capacity circular buffer with two concurrency modes.
//!
//! The lockless mode is a single-producer/single-consumer ring in the
//! classic acquire/release style: the producer owns `tail`, the consumer
//! owns `head`, and each reads the other side's index with acquire
//! ordering. The blocking mode guards every index transition with one
//! mutex and is safe for any number of producers and consumers.
//!
//! One slot beyond the requested capacity is reserved so a full ring and
//! an empty ring are distinguishable without extra state.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Concurrency contract for a ring or FIFO, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoMode {
    /// Lock-free, exactly one producer thread and one consumer thread.
    ///
    /// Using more than one thread on either side is undefined behavior;
    /// this is a mode contract, not a defect.
    Lockless,
    /// Mutex-guarded, any number of producers and consumers. The only
    /// mode in which preemption is safe.
    Blocking,
}

/// Observer notified when the ring's front changes.
///
/// Fires when a push takes the ring from empty to non-empty, and when a
/// pop leaves a non-empty ring (the consumer can see a new front). In
/// lockless mode the callback runs on the pushing or popping thread with
/// no lock held; in blocking mode it runs after the index lock is
/// released. Implementations must be idempotent and must not call back
/// into the same ring.
pub trait HeadMonitor: Send + Sync {
    fn on_new_head(&self);
}

/// Handler invoked on a water-mark crossing; context travels in the
/// closure's captures.
pub type WaterMarkHandler = Box<dyn Fn() + Send + Sync>;

struct WaterMarks {
    high: usize,
    low: usize,
    on_high: WaterMarkHandler,
    on_low: WaterMarkHandler,
}

/// Bounded ring buffer for `T`.
///
/// See [`FifoMode`] for the concurrency contract. Configuration
/// (`set_head_monitor`, `set_water_marks`) takes `&mut self` and so must
/// happen before the ring is shared between threads.
pub struct CircularBuffer<T> {
    /// `capacity + 1` slots; a slot holds a value iff it is in
    /// `[head, tail)` (mod slot count).
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    count: AtomicUsize,
    mode: FifoMode,
    /// Guards head/tail transitions in blocking mode only.
    index_lock: Mutex<()>,
    monitor: Option<Arc<dyn HeadMonitor>>,
    marks: Option<WaterMarks>,
}

// SAFETY: a slot is written by exactly one thread before the index store
// that publishes it, and read by exactly one thread after observing that
// store (lockless mode) or under the index mutex (blocking mode). An
// item therefore lives in exactly one place at a time.
unsafe impl<T: Send> Send for CircularBuffer<T> {}
unsafe impl<T: Send> Sync for CircularBuffer<T> {}

impl<T> CircularBuffer<T> {
    /// Creates a ring holding up to `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, mode: FifoMode) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        let slots = (0..capacity + 1)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            mode,
            index_lock: Mutex::new(()),
            monitor: None,
            marks: None,
        }
    }

    /// The concurrency mode fixed at construction.
    pub fn mode(&self) -> FifoMode {
        self.mode
    }

    /// Usable capacity in items (the sentinel slot is internal).
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Number of items currently stored. Relaxed read; diagnostic.
    pub fn stored_count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Installs the head monitor. Must happen before the ring is shared.
    pub fn set_head_monitor(&mut self, monitor: Arc<dyn HeadMonitor>) {
        self.monitor = Some(monitor);
    }

    /// Installs water-mark handlers.
    ///
    /// `on_high` fires when a push raises the occupancy to `high + 1`
    /// (crossed upward); `on_low` fires when a pop lowers it to
    /// `low - 1` (crossed downward). One call per crossing, each
    /// direction. Must happen before the ring is shared.
    pub fn set_water_marks(
        &mut self,
        high: usize,
        low: usize,
        on_high: WaterMarkHandler,
        on_low: WaterMarkHandler,
    ) {
        self.marks = Some(WaterMarks {
            high,
            low,
            on_high,
            on_low,
        });
    }

    /// Appends an item at the tail.
    ///
    /// Returns the item back when the ring is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        match self.mode {
            FifoMode::Lockless => self.push_lockless(item),
            FifoMode::Blocking => self.push_blocking(item),
        }
    }

    /// Inserts an item at the head, ahead of everything queued.
    ///
    /// The next pop returns this item. Only safe in blocking mode: the
    /// lockless preempt mutates the consumer-owned index from the
    /// producer side.
    pub fn preempt(&self, item: T) -> Result<(), T> {
        match self.mode {
            FifoMode::Lockless => self.preempt_lockless(item),
            FifoMode::Blocking => self.preempt_blocking(item),
        }
    }

    /// Removes and returns the item at the head.
    pub fn pop(&self) -> Option<T> {
        match self.mode {
            FifoMode::Lockless => self.pop_lockless(),
            FifoMode::Blocking => self.pop_blocking(),
        }
    }

    fn advance(&self, idx: usize) -> usize {
        (idx + 1) % self.slots.len()
    }

    fn retreat(&self, idx: usize) -> usize {
        if idx == 0 {
            self.slots.len() - 1
        } else {
            idx - 1
        }
    }

    fn push_lockless(&self, item: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let next = self.advance(tail);
        if next == self.head.load(Ordering::Acquire) {
            return Err(item);
        }

        // SAFETY: only the producer writes the slot at `tail`, and the
        // consumer will not read it until the release store below
        // publishes the new tail.
        unsafe {
            (*self.slots[tail].get()).write(item);
        }
        self.tail.store(next, Ordering::Release);

        let prev = self.count.fetch_add(1, Ordering::AcqRel);
        self.after_push(prev);
        Ok(())
    }

    fn push_blocking(&self, item: T) -> Result<(), T> {
        let prev = {
            let _guard = self.index_lock.lock();
            let tail = self.tail.load(Ordering::Relaxed);
            let next = self.advance(tail);
            if next == self.head.load(Ordering::Relaxed) {
                return Err(item);
            }

            // SAFETY: the index lock serializes all blocking-mode slot
            // accesses; this slot is empty because tail has not reached
            // head.
            unsafe {
                (*self.slots[tail].get()).write(item);
            }
            self.tail.store(next, Ordering::Relaxed);
            self.count.fetch_add(1, Ordering::Relaxed)
        };
        // Callbacks run outside the index lock.
        self.after_push(prev);
        Ok(())
    }

    fn preempt_lockless(&self, item: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let new_head = self.retreat(head);
        if new_head == self.tail.load(Ordering::Acquire) {
            return Err(item);
        }

        // SAFETY: the slot just behind head is outside [head, tail) and
        // therefore empty; it is published by the release store below.
        unsafe {
            (*self.slots[new_head].get()).write(item);
        }
        self.head.store(new_head, Ordering::Release);
        self.count.fetch_add(1, Ordering::AcqRel);

        // A preempt always installs a new front.
        if let Some(monitor) = &self.monitor {
            monitor.on_new_head();
        }
        Ok(())
    }

    fn preempt_blocking(&self, item: T) -> Result<(), T> {
        {
            let _guard = self.index_lock.lock();
            let head = self.head.load(Ordering::Relaxed);
            let new_head = self.retreat(head);
            if new_head == self.tail.load(Ordering::Relaxed) {
                return Err(item);
            }

            // SAFETY: serialized by the index lock; the slot behind head
            // is empty.
            unsafe {
                (*self.slots[new_head].get()).write(item);
            }
            self.head.store(new_head, Ordering::Relaxed);
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(monitor) = &self.monitor {
            monitor.on_new_head();
        }
        Ok(())
    }

    fn pop_lockless(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: the slot at `head` was initialized by the push that
        // published a tail past it; after this read the slot is
        // logically empty again.
        let item = unsafe { (*self.slots[head].get()).assume_init_read() };
        self.head.store(self.advance(head), Ordering::Release);

        let prev = self.count.fetch_sub(1, Ordering::AcqRel);
        self.after_pop(prev);
        Some(item)
    }

    fn pop_blocking(&self) -> Option<T> {
        let (item, prev) = {
            let _guard = self.index_lock.lock();
            let head = self.head.load(Ordering::Relaxed);
            if head == self.tail.load(Ordering::Relaxed) {
                return None;
            }

            // SAFETY: serialized by the index lock; the slot at head
            // holds an initialized item.
            let item = unsafe { (*self.slots[head].get()).assume_init_read() };
            self.head.store(self.advance(head), Ordering::Relaxed);
            (item, self.count.fetch_sub(1, Ordering::Relaxed))
        };
        self.after_pop(prev);
        Some(item)
    }

    fn after_push(&self, prev_count: usize) {
        if let Some(marks) = &self.marks {
            if prev_count == marks.high {
                (marks.on_high)();
            }
        }
        if prev_count == 0 {
            if let Some(monitor) = &self.monitor {
                monitor.on_new_head();
            }
        }
    }

    fn after_pop(&self, prev_count: usize) {
        if let Some(marks) = &self.marks {
            if prev_count == marks.low {
                (marks.on_low)();
            }
        }
        // The ring is still non-empty: the consumer has a new front.
        if prev_count != 1 {
            if let Some(monitor) = &self.monitor {
                monitor.on_new_head();
            }
        }
    }
}

impl<T> Drop for CircularBuffer<T> {
    fn drop(&mut self) {
        // Quiet the monitor, then drop whatever is still queued.
        self.monitor = None;
        let mut drained = 0usize;
        while self.pop().is_some() {
            drained += 1;
        }
        if drained > 0 {
            tracing::trace!("ring dropped with {drained} queued items");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_push_pop_order() {
        let ring = CircularBuffer::new(4, FifoMode::Lockless);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        ring.push(3).unwrap();
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_full_returns_item() {
        let ring = CircularBuffer::new(2, FifoMode::Lockless);
        ring.push('a').unwrap();
        ring.push('b').unwrap();
        assert_eq!(ring.push('c'), Err('c'));
        assert_eq!(ring.stored_count(), 2);
    }

    #[test]
    fn test_wraparound() {
        let ring = CircularBuffer::new(3, FifoMode::Lockless);
        for round in 0..50 {
            ring.push(round * 2).unwrap();
            ring.push(round * 2 + 1).unwrap();
            assert_eq!(ring.pop(), Some(round * 2));
            assert_eq!(ring.pop(), Some(round * 2 + 1));
        }
        assert_eq!(ring.stored_count(), 0);
    }

    #[test]
    fn test_preempt_goes_first() {
        let ring = CircularBuffer::new(5, FifoMode::Blocking);
        ring.push("a").unwrap();
        ring.push("b").unwrap();
        ring.preempt("z").unwrap();
        assert_eq!(ring.pop(), Some("z"));
        assert_eq!(ring.pop(), Some("a"));
        assert_eq!(ring.pop(), Some("b"));
    }

    #[test]
    fn test_preempt_full() {
        let ring = CircularBuffer::new(1, FifoMode::Blocking);
        ring.push(1).unwrap();
        assert_eq!(ring.preempt(2), Err(2));
    }

    struct CountingMonitor(AtomicUsize);

    impl HeadMonitor for CountingMonitor {
        fn on_new_head(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_head_monitor_fires_on_empty_to_nonempty() {
        let monitor = Arc::new(CountingMonitor(AtomicUsize::new(0)));
        let mut ring = CircularBuffer::new(4, FifoMode::Lockless);
        ring.set_head_monitor(monitor.clone());

        ring.push(1).unwrap();
        assert_eq!(monitor.0.load(Ordering::Relaxed), 1);
        // Second push into a non-empty ring is not a new head.
        ring.push(2).unwrap();
        assert_eq!(monitor.0.load(Ordering::Relaxed), 1);
        // Pop leaving one item behind announces the new front.
        ring.pop().unwrap();
        assert_eq!(monitor.0.load(Ordering::Relaxed), 2);
        // Pop that empties the ring does not.
        ring.pop().unwrap();
        assert_eq!(monitor.0.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_water_marks_fire_on_crossings() {
        let highs = Arc::new(AtomicUsize::new(0));
        let lows = Arc::new(AtomicUsize::new(0));
        let mut ring = CircularBuffer::new(8, FifoMode::Blocking);
        let h = Arc::clone(&highs);
        let l = Arc::clone(&lows);
        ring.set_water_marks(
            4,
            2,
            Box::new(move || {
                h.fetch_add(1, Ordering::Relaxed);
            }),
            Box::new(move || {
                l.fetch_add(1, Ordering::Relaxed);
            }),
        );

        for i in 0..6 {
            ring.push(i).unwrap();
        }
        // Crossing 4 -> 5 fired once.
        assert_eq!(highs.load(Ordering::Relaxed), 1);

        for _ in 0..6 {
            ring.pop().unwrap();
        }
        // Crossing 2 -> 1 fired once.
        assert_eq!(lows.load(Ordering::Relaxed), 1);

        // Cross again in both directions.
        for i in 0..6 {
            ring.push(i).unwrap();
        }
        for _ in 0..6 {
            ring.pop().unwrap();
        }
        assert_eq!(highs.load(Ordering::Relaxed), 2);
        assert_eq!(lows.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_drop_releases_remaining_items() {
        let drops = Arc::new(AtomicUsize::new(0));

        #[derive(Debug)]
        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let ring = CircularBuffer::new(4, FifoMode::Blocking);
        ring.push(Tracked(Arc::clone(&drops))).unwrap();
        ring.push(Tracked(Arc::clone(&drops))).unwrap();
        ring.push(Tracked(Arc::clone(&drops))).unwrap();
        drop(ring);
        assert_eq!(drops.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_spsc_threads_preserve_order() {
        let ring = Arc::new(CircularBuffer::new(8, FifoMode::Lockless));
        let total = 10_000u32;

        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 0..total {
                    let mut item = i;
                    loop {
                        match ring.push(item) {
                            Ok(()) => break,
                            Err(back) => {
                                item = back;
                                thread::yield_now();
                            }
                        }
                    }
                }
            })
        };

        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut expected = 0u32;
                while expected < total {
                    match ring.pop() {
                        Some(v) => {
                            assert_eq!(v, expected);
                            expected += 1;
                        }
                        None => thread::yield_now(),
                    }
                }
            })
        };

        producer.join().unwrap();
        consumer.join().unwrap();
        assert_eq!(ring.stored_count(), 0);
    }

    #[test]
    fn test_blocking_mode_many_producers() {
        let ring = Arc::new(CircularBuffer::new(64, FifoMode::Blocking));
        let per_thread = 1_000usize;
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        let mut item = 1usize;
                        loop {
                            match ring.push(item) {
                                Ok(()) => break,
                                Err(back) => {
                                    item = back;
                                    thread::yield_now();
                                }
                            }
                        }
                    }
                })
            })
            .collect();

        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut seen = 0usize;
                while seen < 4 * per_thread {
                    match ring.pop() {
                        Some(_) => seen += 1,
                        None => thread::yield_now(),
                    }
                }
                seen
            })
        };

        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(consumer.join().unwrap(), 4 * per_thread);
        assert_eq!(ring.stored_count(), 0);
    }
}
