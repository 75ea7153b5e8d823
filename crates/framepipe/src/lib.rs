//! framepipe: media payload transport and pipeline orchestration.
//!
//! This crate layers the media-facing surface over `framepipe-core`'s
//! concurrency machinery:
//!
//! - [`media`] — frame/packet payload handles and the typed FIFOs that
//!   transport them between decode, transform and render threads.
//! - [`pipeline`] — the component graph: typed ports, per-connection
//!   command FIFOs, topologically ordered lifecycle fan-out, and
//!   parameter addressing.
//!
//! The FFmpeg-facing decode wrappers and the platform render layers sit
//! above this crate and exchange data exclusively through these types.

pub mod media;
pub mod pipeline;

pub use media::{
    FrameFifo, FramePlane, MediaFifo, MediaFrame, MediaPacket, PacketFifo, PixelFormat,
    NO_TIMESTAMP,
};
pub use pipeline::{
    Component, ComponentRole, MediaKind, ParamValue, ParameterSet, Pipeline, PipelineError,
    PipelineEvent, PipelineState, PortDecl,
};

// Re-export the core types so downstream users need only one dependency.
pub use framepipe_core::{
    CommandFifo, CommandPayload, CommandPool, CommandRef, CommandType, FifoMode, FifoStatus,
    SeekParams, WaitableFifo,
};
