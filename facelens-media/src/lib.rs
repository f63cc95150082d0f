//! # FaceLens Media
//!
//! Video playback, face detection and camera control for FaceLens.
//! This crate handles everything between a media source and the pixels on
//! screen: container demuxing, track selection, decode sessions, the
//! clock-driven pump that presents frames on time, detection on rendered
//! frames and the overlay that shows the results.

#![warn(clippy::all)]

pub mod camera;
pub mod decoder;
pub mod demuxer;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod mp4;
pub mod overlay;
pub mod pipeline;
pub mod pump;
pub mod selector;
pub mod source;
pub mod surface;
pub mod tracks;

// Re-export main types
pub use camera::{
    choose_optimal_size, choose_video_size, CameraCharacteristics, CameraController,
    CameraControllerConfig, CameraDevice, CameraFacing, CameraManager, CaptureRequest,
    CaptureSession, ControlMode, OpenedCamera, StreamConfigurationMap,
};
#[cfg(feature = "h264")]
pub use decoder::H264FrameDecoder;
pub use decoder::{
    DecodeSession, DecodeStats, DecoderFactory, DefaultDecoderFactory, FrameDecoder,
    FrameListener, PassthroughFrameDecoder, QueuedDecodeSession, DEFAULT_MAX_PENDING_OUTPUTS,
};
pub use demuxer::{AnnexBDemuxer, Demuxer, MemoryDemuxer};
pub use detection::{
    DetectionFeed, DetectionProcessor, DetectionResult, DetectionStats, Face, FaceDetector,
    FaceLandmark, FrameMetadata, FrameSlot, LandmarkKind, SlotOffer, VisionImage,
};
pub use error::{CameraError, ErrorCategory, MediaError, MediaResult};
pub use geometry::{fit_width, fit_within, oriented, scale_to_max, PointF, RectF, Size};
pub use mp4::Mp4Demuxer;
pub use overlay::{FaceGraphic, Graphic, GraphicOverlay};
pub use pipeline::{PipelineEvent, PipelineState, PlaybackPipeline, StopReason};
pub use pump::{PlaybackPump, PumpStats, PumpStatus};
pub use selector::{Selection, TrackSelector};
pub use source::{
    AnnexBDemuxerFactory, ContentType, DemuxerFactory, DemuxerRegistry, MediaSource,
    MemoryDemuxerFactory, Mp4DemuxerFactory, SourceKind,
};
pub use surface::{FrameSinkSurface, NullSurface, Surface, SurfaceStats};
pub use tracks::{
    CodecKind, CompressedSample, OutputDescriptor, PixelFormat, SampleFlags, SourceTrack,
    TrackFormat, VideoFrame, MIME_VIDEO_AVC, MIME_VIDEO_RAW,
};
