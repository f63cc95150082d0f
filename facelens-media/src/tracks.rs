//! Track abstractions and media sample types
//!
//! A source exposes a fixed list of [`SourceTrack`]s. Its demuxer produces
//! [`CompressedSample`]s for the selected track, a decode session turns them
//! into [`VideoFrame`]s and describes each pending frame with an
//! [`OutputDescriptor`] until it is released.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// MIME type of H.264 elementary streams
pub const MIME_VIDEO_AVC: &str = "video/avc";

/// MIME type of uncompressed RGBA frames
pub const MIME_VIDEO_RAW: &str = "video/raw";

/// Codec family of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecKind {
    /// Compressed or raw video
    Video,
    /// Audio of any kind
    Audio,
    /// Subtitles, metadata and everything else
    Other,
}

/// Format descriptor of a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFormat {
    /// MIME type, e.g. `video/avc`
    pub mime: String,
    /// Frame width in pixels, 0 when the container does not say
    pub width: u32,
    /// Frame height in pixels, 0 when the container does not say
    pub height: u32,
    /// Track duration in microseconds
    pub duration_us: Option<u64>,
    /// Nominal frame rate
    pub frame_rate: Option<f32>,
}

impl TrackFormat {
    /// Describe a video track
    pub fn video(mime: &str, width: u32, height: u32) -> Self {
        Self {
            mime: mime.to_string(),
            width,
            height,
            duration_us: None,
            frame_rate: None,
        }
    }

    /// Describe an audio track
    pub fn audio(mime: &str) -> Self {
        Self {
            mime: mime.to_string(),
            width: 0,
            height: 0,
            duration_us: None,
            frame_rate: None,
        }
    }

    /// Describe a subtitle, metadata or other non-media track
    pub fn other(mime: &str) -> Self {
        Self::audio(mime)
    }

    /// Set the track duration
    pub fn with_duration_us(mut self, duration_us: u64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    /// Set the nominal frame rate
    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    /// Codec family derived from the MIME type
    pub fn kind(&self) -> CodecKind {
        if self.mime.starts_with("video/") {
            CodecKind::Video
        } else if self.mime.starts_with("audio/") {
            CodecKind::Audio
        } else {
            CodecKind::Other
        }
    }

    /// Whether this is a video track
    pub fn is_video(&self) -> bool {
        self.kind() == CodecKind::Video
    }
}

/// A track of a source, identified by its index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTrack {
    /// Track index within the source
    pub index: usize,
    /// Track format
    pub format: TrackFormat,
}

/// Sample flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleFlags(u32);

impl SampleFlags {
    /// No flags set
    pub const NONE: SampleFlags = SampleFlags(0);
    /// Sample can be decoded without reference to earlier samples
    pub const KEY_FRAME: SampleFlags = SampleFlags(1);
    /// No more samples follow
    pub const END_OF_STREAM: SampleFlags = SampleFlags(1 << 2);

    /// Raw flag bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether all flags of `other` are set
    pub fn contains(&self, other: SampleFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// These flags with every flag of `other` cleared
    pub fn without(self, other: SampleFlags) -> SampleFlags {
        SampleFlags(self.0 & !other.0)
    }

    /// Whether the end-of-stream flag is set
    pub fn is_end_of_stream(&self) -> bool {
        self.contains(Self::END_OF_STREAM)
    }

    /// Whether the key-frame flag is set
    pub fn is_key_frame(&self) -> bool {
        self.contains(Self::KEY_FRAME)
    }
}

impl BitOr for SampleFlags {
    type Output = SampleFlags;

    fn bitor(self, rhs: SampleFlags) -> SampleFlags {
        SampleFlags(self.0 | rhs.0)
    }
}

/// A compressed sample produced by a demuxer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedSample {
    /// Encoded payload
    pub data: Bytes,
    /// Presentation timestamp in microseconds
    pub pts_us: u64,
    /// Sample flags
    pub flags: SampleFlags,
}

impl CompressedSample {
    /// Create a sample
    pub fn new(data: impl Into<Bytes>, pts_us: u64, flags: SampleFlags) -> Self {
        Self {
            data: data.into(),
            pts_us,
            flags,
        }
    }

    /// Create the empty end-of-stream marker
    pub fn end_of_stream(pts_us: u64) -> Self {
        Self {
            data: Bytes::new(),
            pts_us,
            flags: SampleFlags::END_OF_STREAM,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether this sample marks the end of the stream
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.is_end_of_stream()
    }
}

/// Describes a decoded frame waiting in a decode session
///
/// Only valid until the frame is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    /// Output slot index, unique within a session
    pub index: usize,
    /// Decoded payload size in bytes; zero for the end-of-stream marker
    pub size: usize,
    /// Presentation timestamp in microseconds
    pub pts_us: u64,
    /// Flags carried over from the input sample
    pub flags: SampleFlags,
}

impl OutputDescriptor {
    /// Presentation timestamp in whole milliseconds
    pub fn pts_ms(&self) -> u64 {
        self.pts_us / 1000
    }

    /// Whether the descriptor carries frame data
    pub fn has_data(&self) -> bool {
        self.size > 0
    }
}

/// Pixel layout of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel
    Rgba8,
    /// Planar YUV 4:2:0
    I420,
}

impl PixelFormat {
    /// Bytes needed for a frame of the given size
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgba8 => pixels * 4,
            PixelFormat::I420 => pixels + 2 * (pixels / 4),
        }
    }
}

/// Decoded video frame
#[derive(Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Frame data
    pub data: Bytes,
    /// Presentation timestamp in microseconds
    pub pts_us: u64,
    /// Whether this frame came from a keyframe
    pub is_keyframe: bool,
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .field("pts_us", &self.pts_us)
            .field("is_keyframe", &self.is_keyframe)
            .finish()
    }
}
