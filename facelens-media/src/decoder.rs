//! Decode sessions and frame decoders
//!
//! A [`DecodeSession`] wraps a decoder bound to a [`Surface`]. Compressed
//! samples go in through [`DecodeSession::submit`]; decoded frames wait in a
//! bounded output queue until the pump releases them. The queue bound is the
//! backpressure: once it is full, `submit` refuses and the caller retries the
//! same sample on a later tick.
//!
//! Codec work is done by a synchronous [`FrameDecoder`]. The H.264 decoder is
//! backed by openh264 when the `h264` feature is enabled.

use crate::error::{MediaError, MediaResult};
use crate::surface::Surface;
use crate::tracks::{
    CompressedSample, OutputDescriptor, PixelFormat, SampleFlags, TrackFormat, VideoFrame,
    MIME_VIDEO_AVC, MIME_VIDEO_RAW,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(feature = "h264")]
use crate::demuxer::contains_slice;
#[cfg(feature = "h264")]
use openh264::{
    decoder::{DecodedYUV, Decoder as OpenH264Decoder},
    formats::YUVSource,
};
#[cfg(feature = "h264")]
use std::{cmp::Reverse, collections::BinaryHeap};

/// Default bound of the decoded output queue
pub const DEFAULT_MAX_PENDING_OUTPUTS: usize = 4;

/// Synchronous decoder turning samples into frames
pub trait FrameDecoder: Send {
    /// Codec name for logs and errors
    fn codec_name(&self) -> &'static str;

    /// Decode one sample. May yield zero frames while the decoder buffers.
    fn decode(&mut self, sample: &CompressedSample) -> MediaResult<Vec<VideoFrame>>;

    /// Drain frames still buffered inside the decoder
    fn flush(&mut self) -> MediaResult<Vec<VideoFrame>> {
        Ok(Vec::new())
    }
}

/// Decoder for samples that already hold raw RGBA frames
#[derive(Debug, Clone)]
pub struct PassthroughFrameDecoder {
    width: u32,
    height: u32,
}

impl PassthroughFrameDecoder {
    /// Create a decoder for frames of the given size
    pub fn new(width: u32, height: u32) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: format!("Raw video needs a frame size, got {}x{}", width, height),
            });
        }
        Ok(Self { width, height })
    }
}

impl FrameDecoder for PassthroughFrameDecoder {
    fn codec_name(&self) -> &'static str {
        "raw"
    }

    fn decode(&mut self, sample: &CompressedSample) -> MediaResult<Vec<VideoFrame>> {
        let expected = PixelFormat::Rgba8.frame_size(self.width, self.height);
        if sample.size() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: sample.size(),
            });
        }

        Ok(vec![VideoFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgba8,
            data: sample.data.clone(),
            pts_us: sample.pts_us,
            is_keyframe: true,
        }])
    }
}

/// H.264 decoder with real openh264 integration
///
/// openh264 may hold pictures back for reordering, so the picture a call
/// returns is not always the one just submitted. Timestamps of submitted
/// pictures wait in a min-heap and each output takes the smallest, which
/// matches display order.
#[cfg(feature = "h264")]
pub struct H264FrameDecoder {
    decoder: OpenH264Decoder,
    pending_pts: BinaryHeap<Reverse<(u64, bool)>>,
}

#[cfg(feature = "h264")]
impl std::fmt::Debug for H264FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H264FrameDecoder")
            .field("pending_pictures", &self.pending_pts.len())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "h264")]
impl H264FrameDecoder {
    /// Create a new decoder
    pub fn new() -> MediaResult<Self> {
        let decoder = OpenH264Decoder::new().map_err(|e| MediaError::CodecInitializationFailed {
            codec: "H.264".to_string(),
            reason: format!("Failed to create H.264 decoder: {}", e),
        })?;
        Ok(Self {
            decoder,
            pending_pts: BinaryHeap::new(),
        })
    }

    /// Pictures submitted but not yet returned
    pub fn pending_pictures(&self) -> usize {
        self.pending_pts.len()
    }
}

#[cfg(feature = "h264")]
fn h264_error(e: openh264::Error) -> MediaError {
    MediaError::DecodingFailed {
        codec: "H.264".to_string(),
        reason: format!("H.264 decoding failed: {}", e),
    }
}

#[cfg(feature = "h264")]
fn rgba_frame(yuv: &DecodedYUV<'_>, pts_us: u64, is_keyframe: bool) -> VideoFrame {
    let (width, height) = yuv.dimensions();
    let mut rgba = vec![0u8; width * height * 4];
    yuv.write_rgba8(&mut rgba);

    VideoFrame {
        width: width as u32,
        height: height as u32,
        format: PixelFormat::Rgba8,
        data: rgba.into(),
        pts_us,
        is_keyframe,
    }
}

#[cfg(feature = "h264")]
impl FrameDecoder for H264FrameDecoder {
    fn codec_name(&self) -> &'static str {
        "H.264"
    }

    fn decode(&mut self, sample: &CompressedSample) -> MediaResult<Vec<VideoFrame>> {
        let decoded = self.decoder.decode(&sample.data).map_err(h264_error)?;

        if contains_slice(&sample.data) {
            self.pending_pts
                .push(Reverse((sample.pts_us, sample.flags.is_key_frame())));
        }

        // Parameter sets alone produce no picture
        let Some(yuv) = decoded else {
            return Ok(Vec::new());
        };

        let (pts_us, is_keyframe) = match self.pending_pts.pop() {
            Some(Reverse(next)) => next,
            None => (sample.pts_us, sample.flags.is_key_frame()),
        };
        Ok(vec![rgba_frame(&yuv, pts_us, is_keyframe)])
    }

    fn flush(&mut self) -> MediaResult<Vec<VideoFrame>> {
        let remaining = self.decoder.flush_remaining().map_err(h264_error)?;

        let mut frames = Vec::with_capacity(remaining.len());
        for yuv in &remaining {
            let Some(Reverse((pts_us, is_keyframe))) = self.pending_pts.pop() else {
                warn!("H.264 decoder flushed a picture with no pending timestamp");
                break;
            };
            frames.push(rgba_frame(yuv, pts_us, is_keyframe));
        }

        if !self.pending_pts.is_empty() {
            debug!(
                "H.264 flush left {} pictures undecoded",
                self.pending_pts.len()
            );
            self.pending_pts.clear();
        }
        Ok(frames)
    }
}

/// Notified with every frame released to the surface
pub trait FrameListener: Send + Sync {
    /// Called after `frame` was rendered
    fn on_frame(&self, descriptor: &OutputDescriptor, frame: &VideoFrame);
}

/// Decode session statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeStats {
    /// Samples accepted by `submit`
    pub samples_submitted: u64,
    /// Submissions refused because the output queue was full
    pub samples_refused: u64,
    /// Samples the decoder failed on
    pub decode_errors: u64,
    /// Frames produced by the decoder
    pub frames_decoded: u64,
    /// Frames released with rendering
    pub frames_rendered: u64,
    /// Frames released without rendering
    pub frames_discarded: u64,
}

/// A decoder bound to a surface
pub trait DecodeSession: Send {
    /// Try to enqueue a sample. Returns whether it was accepted.
    fn submit(&mut self, sample: CompressedSample) -> bool;

    /// Look at the next decoded output without consuming it
    fn peek_next_output(&self) -> Option<OutputDescriptor>;

    /// Consume the head output, rendering it when `render` is true
    fn release_output(&mut self, render: bool) -> Option<OutputDescriptor>;

    /// Release decoder and surface. Terminal.
    fn stop_and_release(&mut self);

    /// Whether the session has been released
    fn is_released(&self) -> bool;

    /// Outputs waiting to be released
    fn pending_outputs(&self) -> usize;

    /// Codec name
    fn codec_name(&self) -> &str;

    /// Current statistics
    fn stats(&self) -> DecodeStats;
}

struct PendingOutput {
    descriptor: OutputDescriptor,
    frame: Option<VideoFrame>,
}

/// Decode session with a bounded output queue over a [`FrameDecoder`]
pub struct QueuedDecodeSession<D: FrameDecoder> {
    decoder: Option<D>,
    codec_name: &'static str,
    surface: Arc<dyn Surface>,
    listener: Option<Arc<dyn FrameListener>>,
    pending: VecDeque<PendingOutput>,
    max_pending_outputs: usize,
    next_index: usize,
    end_of_stream_queued: bool,
    stats: DecodeStats,
}

impl<D: FrameDecoder> std::fmt::Debug for QueuedDecodeSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedDecodeSession")
            .field("codec", &self.codec_name)
            .field("pending", &self.pending.len())
            .field("max_pending_outputs", &self.max_pending_outputs)
            .field("released", &self.decoder.is_none())
            .finish()
    }
}

impl<D: FrameDecoder> QueuedDecodeSession<D> {
    /// Bind `decoder` to `surface`
    pub fn new(decoder: D, surface: Arc<dyn Surface>) -> Self {
        let codec_name = decoder.codec_name();
        Self {
            decoder: Some(decoder),
            codec_name,
            surface,
            listener: None,
            pending: VecDeque::new(),
            max_pending_outputs: DEFAULT_MAX_PENDING_OUTPUTS,
            next_index: 0,
            end_of_stream_queued: false,
            stats: DecodeStats::default(),
        }
    }

    /// Set the output queue bound (at least 1)
    pub fn with_max_pending_outputs(mut self, max_pending_outputs: usize) -> Self {
        self.max_pending_outputs = max_pending_outputs.max(1);
        self
    }

    /// Notify `listener` with every rendered frame
    pub fn with_listener(mut self, listener: Arc<dyn FrameListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    fn push_frame(&mut self, frame: VideoFrame, flags: SampleFlags) {
        let descriptor = OutputDescriptor {
            index: self.next_index,
            size: frame.data.len(),
            pts_us: frame.pts_us,
            flags,
        };
        self.next_index += 1;
        self.stats.frames_decoded += 1;
        self.pending.push_back(PendingOutput {
            descriptor,
            frame: Some(frame),
        });
    }

    fn push_end_of_stream(&mut self, pts_us: u64) {
        let descriptor = OutputDescriptor {
            index: self.next_index,
            size: 0,
            pts_us,
            flags: SampleFlags::END_OF_STREAM,
        };
        self.next_index += 1;
        self.pending.push_back(PendingOutput {
            descriptor,
            frame: None,
        });
        self.end_of_stream_queued = true;
    }
}

impl<D: FrameDecoder> DecodeSession for QueuedDecodeSession<D> {
    fn submit(&mut self, sample: CompressedSample) -> bool {
        let Some(decoder) = self.decoder.as_mut() else {
            return false;
        };

        if self.end_of_stream_queued {
            debug!("{} session refused sample after end of stream", self.codec_name);
            self.stats.samples_refused += 1;
            return false;
        }

        if self.pending.len() >= self.max_pending_outputs {
            debug!(
                "{} output queue full ({}), refusing sample at {} us",
                self.codec_name,
                self.pending.len(),
                sample.pts_us
            );
            self.stats.samples_refused += 1;
            return false;
        }

        let flags = sample.flags;
        let result = if sample.is_end_of_stream() {
            decoder.flush()
        } else {
            decoder.decode(&sample)
        };
        self.stats.samples_submitted += 1;

        match result {
            Ok(frames) => {
                for frame in frames {
                    self.push_frame(frame, flags.without(SampleFlags::END_OF_STREAM));
                }
            }
            Err(e) => {
                // The sample is consumed either way; the frame is lost
                warn!("{} dropped sample at {} us: {}", self.codec_name, sample.pts_us, e);
                self.stats.decode_errors += 1;
            }
        }

        if sample.is_end_of_stream() {
            self.push_end_of_stream(sample.pts_us);
        }
        true
    }

    fn peek_next_output(&self) -> Option<OutputDescriptor> {
        self.decoder.as_ref()?;
        self.pending.front().map(|output| output.descriptor)
    }

    fn release_output(&mut self, render: bool) -> Option<OutputDescriptor> {
        self.decoder.as_ref()?;
        let output = self.pending.pop_front()?;

        match output.frame {
            Some(frame) if render => {
                if let Err(e) = self.surface.render(&frame) {
                    warn!("Failed to render frame at {} us: {}", frame.pts_us, e);
                }
                self.stats.frames_rendered += 1;
                if let Some(listener) = &self.listener {
                    listener.on_frame(&output.descriptor, &frame);
                }
            }
            Some(_) => self.stats.frames_discarded += 1,
            None => {}
        }

        Some(output.descriptor)
    }

    fn stop_and_release(&mut self) {
        if self.decoder.take().is_none() {
            return;
        }
        self.pending.clear();
        self.surface.release();
        info!(
            "{} session released: {} decoded, {} rendered, {} refused",
            self.codec_name,
            self.stats.frames_decoded,
            self.stats.frames_rendered,
            self.stats.samples_refused
        );
    }

    fn is_released(&self) -> bool {
        self.decoder.is_none()
    }

    fn pending_outputs(&self) -> usize {
        self.pending.len()
    }

    fn codec_name(&self) -> &str {
        self.codec_name
    }

    fn stats(&self) -> DecodeStats {
        self.stats.clone()
    }
}

/// Builds decode sessions for track formats
pub trait DecoderFactory: Send + Sync {
    /// Build a session for `format` bound to `surface`
    ///
    /// Returns `None` for formats the factory cannot decode so the caller
    /// can try another track.
    fn from_video_format(
        &self,
        format: &TrackFormat,
        surface: Arc<dyn Surface>,
    ) -> Option<Box<dyn DecodeSession>>;
}

/// Picks a decoder by MIME type: `video/avc` and `video/raw`
#[derive(Clone, Default)]
pub struct DefaultDecoderFactory {
    max_pending_outputs: Option<usize>,
    listener: Option<Arc<dyn FrameListener>>,
}

impl std::fmt::Debug for DefaultDecoderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultDecoderFactory")
            .field("max_pending_outputs", &self.max_pending_outputs)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl DefaultDecoderFactory {
    /// Create a factory with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output queue bound of every session
    pub fn with_max_pending_outputs(mut self, max_pending_outputs: usize) -> Self {
        self.max_pending_outputs = Some(max_pending_outputs);
        self
    }

    /// Attach a frame listener to every session
    pub fn with_listener(mut self, listener: Arc<dyn FrameListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    fn wrap<D: FrameDecoder + 'static>(
        &self,
        decoder: D,
        surface: Arc<dyn Surface>,
    ) -> Box<dyn DecodeSession> {
        let mut session = QueuedDecodeSession::new(decoder, surface).with_max_pending_outputs(
            self.max_pending_outputs
                .unwrap_or(DEFAULT_MAX_PENDING_OUTPUTS),
        );
        if let Some(listener) = &self.listener {
            session = session.with_listener(listener.clone());
        }
        Box::new(session)
    }

    #[cfg(feature = "h264")]
    fn avc_session(&self, surface: Arc<dyn Surface>) -> Option<Box<dyn DecodeSession>> {
        match H264FrameDecoder::new() {
            Ok(decoder) => Some(self.wrap(decoder, surface)),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "h264"))]
    fn avc_session(&self, _surface: Arc<dyn Surface>) -> Option<Box<dyn DecodeSession>> {
        debug!("H.264 support not compiled in");
        None
    }
}

impl DecoderFactory for DefaultDecoderFactory {
    fn from_video_format(
        &self,
        format: &TrackFormat,
        surface: Arc<dyn Surface>,
    ) -> Option<Box<dyn DecodeSession>> {
        if !format.is_video() {
            return None;
        }

        match format.mime.as_str() {
            MIME_VIDEO_AVC => self.avc_session(surface),
            MIME_VIDEO_RAW => match PassthroughFrameDecoder::new(format.width, format.height) {
                Ok(decoder) => Some(self.wrap(decoder, surface)),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            },
            other => {
                debug!("No decoder for {}", other);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::FrameSinkSurface;
    use parking_lot::Mutex;

    fn raw_sample(pts_ms: u64) -> CompressedSample {
        CompressedSample::new(vec![7u8; 16], pts_ms * 1000, SampleFlags::KEY_FRAME)
    }

    fn session(surface: Arc<FrameSinkSurface>) -> QueuedDecodeSession<PassthroughFrameDecoder> {
        QueuedDecodeSession::new(PassthroughFrameDecoder::new(2, 2).unwrap(), surface)
    }

    #[derive(Default)]
    struct RecordingListener {
        seen: Mutex<Vec<u64>>,
    }

    impl FrameListener for RecordingListener {
        fn on_frame(&self, descriptor: &OutputDescriptor, _frame: &VideoFrame) {
            self.seen.lock().push(descriptor.pts_us);
        }
    }

    #[test]
    fn test_submit_peek_release() {
        let surface = Arc::new(FrameSinkSurface::new());
        let mut session = session(surface.clone());

        assert!(session.peek_next_output().is_none());
        assert!(session.submit(raw_sample(0)));

        let peeked = session.peek_next_output().unwrap();
        assert_eq!(peeked.size, 16);
        assert_eq!(session.peek_next_output(), Some(peeked), "peek is non-destructive");

        assert_eq!(session.release_output(true), Some(peeked));
        assert!(session.release_output(true).is_none());
        assert_eq!(surface.rendered_pts_us(), vec![0]);
    }

    #[test]
    fn test_full_queue_refuses() {
        let surface = Arc::new(FrameSinkSurface::new());
        let mut session = session(surface).with_max_pending_outputs(2);

        assert!(session.submit(raw_sample(0)));
        assert!(session.submit(raw_sample(33)));
        assert!(!session.submit(raw_sample(66)));
        assert_eq!(session.stats().samples_refused, 1);

        session.release_output(false);
        assert!(session.submit(raw_sample(66)));
        assert_eq!(session.stats().frames_discarded, 1);
    }

    #[test]
    fn test_end_of_stream_marker() {
        let surface = Arc::new(FrameSinkSurface::new());
        let mut session = session(surface);

        assert!(session.submit(CompressedSample::end_of_stream(0)));
        let marker = session.peek_next_output().unwrap();
        assert_eq!(marker.size, 0);
        assert!(marker.flags.is_end_of_stream());
        assert!(!session.submit(raw_sample(0)), "no input after end of stream");
    }

    #[test]
    fn test_decode_error_consumes_sample() {
        let surface = Arc::new(FrameSinkSurface::new());
        let mut session = session(surface);

        let bad = CompressedSample::new(vec![0u8; 3], 0, SampleFlags::NONE);
        assert!(session.submit(bad));
        assert!(session.peek_next_output().is_none());
        assert_eq!(session.stats().decode_errors, 1);
    }

    #[test]
    fn test_stop_and_release_is_terminal() {
        let surface = Arc::new(FrameSinkSurface::new());
        let mut session = session(surface.clone());
        session.submit(raw_sample(0));

        session.stop_and_release();
        assert!(session.is_released());
        assert!(surface.is_released());
        assert!(!session.submit(raw_sample(33)));
        assert!(session.peek_next_output().is_none());
        assert!(session.release_output(true).is_none());

        // Second call is a no-op
        session.stop_and_release();
    }

    #[test]
    fn test_listener_sees_rendered_frames_only() {
        let surface = Arc::new(FrameSinkSurface::new());
        let listener = Arc::new(RecordingListener::default());
        let mut session = session(surface).with_listener(listener.clone());

        session.submit(raw_sample(0));
        session.submit(raw_sample(33));
        session.release_output(false);
        session.release_output(true);

        assert_eq!(*listener.seen.lock(), vec![33_000]);
    }

    #[test]
    fn test_factory_by_mime() {
        let factory = DefaultDecoderFactory::new();
        let surface: Arc<dyn Surface> = Arc::new(FrameSinkSurface::new());

        let raw = TrackFormat::video(MIME_VIDEO_RAW, 2, 2);
        let session = factory.from_video_format(&raw, surface.clone()).unwrap();
        assert_eq!(session.codec_name(), "raw");

        assert!(factory
            .from_video_format(&TrackFormat::audio("audio/mp4a-latm"), surface.clone())
            .is_none());
        assert!(factory
            .from_video_format(&TrackFormat::video("video/x-vnd.on2.vp8", 640, 480), surface.clone())
            .is_none());
        assert!(factory
            .from_video_format(&TrackFormat::video(MIME_VIDEO_RAW, 0, 0), surface)
            .is_none());
    }

    #[cfg(feature = "h264")]
    #[test]
    fn test_factory_builds_h264_session() {
        let factory = DefaultDecoderFactory::new();
        let surface: Arc<dyn Surface> = Arc::new(FrameSinkSurface::new());
        let session = factory
            .from_video_format(&TrackFormat::video(MIME_VIDEO_AVC, 0, 0), surface)
            .unwrap();
        assert_eq!(session.codec_name(), "H.264");
    }

    #[cfg(feature = "h264")]
    fn encoded_clip(frames: usize, width: usize, height: usize) -> Vec<Vec<u8>> {
        use openh264::encoder::{Encoder, EncoderConfig};
        use openh264::formats::YUVBuffer;
        use openh264::OpenH264API;

        let config = EncoderConfig::new().skip_frames(false);
        let mut encoder = Encoder::with_api_config(OpenH264API::from_source(), config).unwrap();

        (0..frames)
            .map(|i| {
                // Vertical bars drifting right by 8 pixels per frame
                let mut yuv = vec![128u8; width * height * 3 / 2];
                for (p, luma) in yuv[..width * height].iter_mut().enumerate() {
                    *luma = ((p % width + i * 8) % 256) as u8;
                }
                let buffer = YUVBuffer::from_vec(yuv, width, height);
                encoder.encode(&buffer).unwrap().to_vec()
            })
            .collect()
    }

    #[cfg(feature = "h264")]
    #[test]
    fn test_h264_session_outputs_every_encoded_frame() {
        let access_units = encoded_clip(8, 64, 64);
        assert!(access_units.iter().all(|unit| contains_slice(unit)));

        let surface = Arc::new(FrameSinkSurface::new());
        let mut session =
            QueuedDecodeSession::new(H264FrameDecoder::new().unwrap(), surface.clone())
                .with_max_pending_outputs(16);

        let expected: Vec<u64> = (0..access_units.len() as u64).map(|i| i * 33_333).collect();
        for (unit, &pts_us) in access_units.iter().zip(&expected) {
            let flags = if pts_us == 0 {
                SampleFlags::KEY_FRAME
            } else {
                SampleFlags::NONE
            };
            assert!(session.submit(CompressedSample::new(unit.clone(), pts_us, flags)));
        }
        assert!(session.submit(CompressedSample::end_of_stream(8 * 33_333)));

        let mut outputs = Vec::new();
        while let Some(output) = session.release_output(true) {
            outputs.push(output);
        }

        assert!(outputs.last().unwrap().flags.is_end_of_stream());
        assert_eq!(session.stats().decode_errors, 0);
        assert_eq!(session.stats().frames_decoded, 8);
        assert_eq!(surface.rendered_pts_us(), expected);
    }

    #[cfg(feature = "h264")]
    #[test]
    fn test_h264_flush_drains_pending_timestamps() {
        let mut decoder = H264FrameDecoder::new().unwrap();
        let clip = encoded_clip(3, 64, 64);

        let mut frames = Vec::new();
        for (i, unit) in clip.iter().enumerate() {
            let sample = CompressedSample::new(unit.clone(), i as u64 * 40_000, SampleFlags::NONE);
            frames.extend(decoder.decode(&sample).unwrap());
        }
        frames.extend(decoder.flush().unwrap());

        let pts: Vec<u64> = frames.iter().map(|frame| frame.pts_us).collect();
        assert_eq!(pts, vec![0, 40_000, 80_000]);
        assert_eq!(frames[0].width, 64);
        assert_eq!(decoder.pending_pictures(), 0);
        assert!(decoder.flush().unwrap().is_empty());
    }
}
