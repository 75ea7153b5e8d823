//! Typed FIFOs for media payload handles.
//!
//! Unlike the command FIFO, these own a private clone of every queued
//! payload: `write` clones the caller's handle into the FIFO (the
//! caller keeps its own reference) and `read` surrenders that clone to
//! the consumer, who frees it by dropping. Because the handle types
//! share their backing data, the clone is a reference bump, not a pixel
//! copy.

use std::time::Duration;

use framepipe_core::fifo::FifoMetrics;
use framepipe_core::{FifoMode, FifoStatus, WaitableFifo};

use super::frame::MediaFrame;
use super::packet::MediaPacket;

/// Bounded FIFO of payload handles with clone-on-write semantics.
pub struct MediaFifo<T: Clone> {
    fifo: WaitableFifo<T>,
}

/// FIFO of decoded frame handles.
pub type FrameFifo = MediaFifo<MediaFrame>;

/// FIFO of compressed packet handles.
pub type PacketFifo = MediaFifo<MediaPacket>;

impl<T: Clone> MediaFifo<T> {
    pub fn new(capacity: usize, mode: FifoMode) -> Self {
        Self {
            fifo: WaitableFifo::new(capacity, mode),
        }
    }

    /// Clones the caller's handle into the FIFO.
    ///
    /// The caller retains its own reference regardless of the outcome;
    /// a rejected write just drops the clone.
    pub fn write(&self, item: &T) -> FifoStatus {
        match self.fifo.write(item.clone()) {
            Ok(()) => FifoStatus::Ok,
            Err(rejected) => rejected.status,
        }
    }

    /// Clones the caller's handle in at the front of the queue.
    pub fn preempt(&self, item: &T) -> FifoStatus {
        match self.fifo.preempt(item.clone()) {
            Ok(()) => FifoStatus::Ok,
            Err(rejected) => rejected.status,
        }
    }

    /// Hands the front handle to the caller, who owns it from here.
    pub fn read(&self) -> Option<T> {
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

impl<T: Clone> Drop for MediaFifo<T> {
    fn drop(&mut self) {
        // Stop writers, then free the queued clones.
        self.fifo.set_flow_enabled(false);
        while self.fifo.read().is_some() {}
    }
}
