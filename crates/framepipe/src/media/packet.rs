//! Compressed media packet handles.

use std::any::Any;

use bytes::Bytes;
use framepipe_core::CommandPayload;

/// Timestamp value meaning "no timestamp known", in stream ticks.
pub const NO_TIMESTAMP: i64 = i64::MIN;

/// Handle to one compressed packet as produced by a demuxer.
///
/// Cloning shares the backing payload bytes; only the small metadata
/// header is copied. The payload is freed when the last handle drops.
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// Compressed payload; cloning shares the backing allocation.
    pub data: Bytes,
    /// Presentation timestamp in stream ticks, or [`NO_TIMESTAMP`].
    pub pts: i64,
    /// Decode timestamp in stream ticks, or [`NO_TIMESTAMP`].
    pub dts: i64,
    /// Index of the stream this packet belongs to.
    pub stream_index: u32,
    /// True when the packet starts a decodable unit.
    pub keyframe: bool,
    /// Container-defined flags word.
    pub flags: u32,
}

impl MediaPacket {
    /// Packet with payload and timestamps; remaining fields zeroed.
    pub fn new(data: Bytes, pts: i64, dts: i64) -> Self {
        Self {
            data,
            pts,
            dts,
            stream_index: 0,
            keyframe: false,
            flags: 0,
        }
    }
}

impl CommandPayload for MediaPacket {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
