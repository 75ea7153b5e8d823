//! Decoded video frame handles.
//!
//! A [`MediaFrame`] is a cheap handle over immutable decoded pixel
//! data. Cloning produces a new independent handle sharing the same
//! backing planes; the data is freed when the last handle drops. This
//! is the reference model the typed FIFOs and the command payload
//! machinery rely on.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use framepipe_core::CommandPayload;

/// Pixel format of decoded frame data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUV 4:2:0 planar (most common video format)
    Yuv420p,
    /// NV12 (Y plane + interleaved UV, common for hardware decoders)
    Nv12,
    /// RGB 24-bit
    Rgb24,
    /// RGBA 32-bit
    Rgba,
    /// BGRA 32-bit (common on some platforms)
    Bgra,
}

impl PixelFormat {
    /// Returns the number of planes for this format.
    pub fn num_planes(&self) -> usize {
        match self {
            PixelFormat::Yuv420p => 3,
            PixelFormat::Nv12 => 2,
            PixelFormat::Rgb24 | PixelFormat::Rgba | PixelFormat::Bgra => 1,
        }
    }

    /// Returns true if this is a YUV-based format requiring conversion.
    pub fn is_yuv(&self) -> bool {
        matches!(self, PixelFormat::Yuv420p | PixelFormat::Nv12)
    }
}

/// A single plane of pixel data.
#[derive(Debug, Clone)]
pub struct FramePlane {
    /// Raw pixel data; cloning shares the backing allocation.
    pub data: Bytes,
    /// Stride (bytes per row, may include padding)
    pub stride: usize,
}

struct FrameInner {
    pts: Duration,
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<FramePlane>,
    stream_index: u32,
}

/// Handle to a decoded frame.
///
/// `Clone` yields a new handle over the same backing data — the
/// decoded planes are never copied. The last handle to drop frees them.
#[derive(Clone)]
pub struct MediaFrame {
    inner: Arc<FrameInner>,
}

impl MediaFrame {
    /// Wraps decoded planes in a frame handle.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        pts: Duration,
        planes: Vec<FramePlane>,
    ) -> Self {
        debug_assert_eq!(planes.len(), format.num_planes());
        Self {
            inner: Arc::new(FrameInner {
                pts,
                width,
                height,
                format,
                planes,
                stream_index: 0,
            }),
        }
    }

    /// Frame handle tagged with the stream it was decoded from.
    pub fn with_stream_index(
        width: u32,
        height: u32,
        format: PixelFormat,
        pts: Duration,
        planes: Vec<FramePlane>,
        stream_index: u32,
    ) -> Self {
        debug_assert_eq!(planes.len(), format.num_planes());
        Self {
            inner: Arc::new(FrameInner {
                pts,
                width,
                height,
                format,
                planes,
                stream_index,
            }),
        }
    }

    /// Presentation timestamp.
    pub fn pts(&self) -> Duration {
        self.inner.pts
    }

    /// Returns (width, height) in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    pub fn planes(&self) -> &[FramePlane] {
        &self.inner.planes
    }

    pub fn stream_index(&self) -> u32 {
        self.inner.stream_index
    }

    /// Number of live handles over this frame's data. Diagnostic.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for MediaFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaFrame")
            .field("pts", &self.inner.pts)
            .field("dimensions", &(self.inner.width, self.inner.height))
            .field("format", &self.inner.format)
            .finish()
    }
}

impl CommandPayload for MediaFrame {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
