//! Media payload handles and typed media FIFOs.
//!
//! - [`MediaFrame`] / [`MediaPacket`] — cheap handles over shared,
//!   immutable decoded or compressed data; cloning shares the backing
//!   allocation.
//! - [`FrameFifo`] / [`PacketFifo`] — bounded FIFOs that clone a
//!   payload handle in on write and surrender it on read.

pub mod frame;
pub mod media_fifo;
pub mod packet;

pub use frame::{FramePlane, MediaFrame, PixelFormat};
pub use media_fifo::{FrameFifo, MediaFifo, PacketFifo};
pub use packet::{MediaPacket, NO_TIMESTAMP};
