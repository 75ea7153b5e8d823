//! framepipe-core: bounded media FIFOs and pooled pipeline commands.
//!
//! This crate is the egui-free, decoder-free concurrency core of the
//! framepipe pipeline. It contains:
//!
//! - Gating primitives: [`semaphore`]
//! - The two-mode ring buffer: [`ring`]
//! - Semaphore-gated FIFOs with flow control: [`fifo`]
//! - Explicit reference counting: [`refcount`]
//! - Pooled commands and their FIFO: [`command`], [`pool`], [`command_fifo`]
//!
//! Producer and consumer threads rendezvous only through these types;
//! the core assumes no event loop and no async runtime. The media
//! payload types and the pipeline graph live in the `framepipe` crate.

pub mod command;
pub mod command_fifo;
pub mod fifo;
pub mod pool;
pub mod refcount;
pub mod ring;
pub mod semaphore;
pub mod status;

pub use command::{CommandRef, CommandType, ConfigUpdate, SeekParams, USER_COMMAND_BASE};
pub use command_fifo::CommandFifo;
pub use fifo::{FifoConfig, FifoMetrics, FifoObserver, WaitableFifo};
pub use pool::CommandPool;
pub use refcount::{CommandPayload, RefCount};
pub use ring::{CircularBuffer, FifoMode, HeadMonitor, WaterMarkHandler};
pub use semaphore::CountingSemaphore;
pub use status::{FifoStatus, RejectedWrite};
