//! Face detection on rendered frames
//!
//! The detector itself is external and consumed through [`FaceDetector`].
//! [`DetectionProcessor`] feeds it from a single-slot buffer: while one frame
//! is being detected, newer frames overwrite each other in the slot and only
//! the most recent one is detected next. Results go out on an `mpsc` channel
//! to whoever owns the overlay.

use crate::camera::CameraFacing;
use crate::decoder::FrameListener;
use crate::error::{MediaError, MediaResult};
use crate::geometry::{PointF, RectF, Size};
use crate::tracks::{OutputDescriptor, PixelFormat, VideoFrame};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Capacity of the detection result channel
const RESULT_CHANNEL_CAPACITY: usize = 16;

/// Image handed to a detector
#[derive(Clone, PartialEq, Eq)]
pub struct VisionImage {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: PixelFormat,
    /// Pixel data
    pub data: Bytes,
}

impl std::fmt::Debug for VisionImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl VisionImage {
    /// Wrap RGBA pixel data
    pub fn from_rgba(width: u32, height: u32, data: impl Into<Bytes>) -> MediaResult<Self> {
        let data = data.into();
        let expected = PixelFormat::Rgba8.frame_size(width, height);
        if data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            data,
        })
    }

    /// Borrow the pixels of a decoded frame
    ///
    /// Fails when the buffer does not hold exactly one frame of the declared
    /// size and format.
    pub fn from_frame(frame: &VideoFrame) -> MediaResult<Self> {
        let expected = frame.format.frame_size(frame.width, frame.height);
        if frame.data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: frame.data.len(),
            });
        }
        Ok(Self {
            width: frame.width,
            height: frame.height,
            format: frame.format,
            data: frame.data.clone(),
        })
    }

    /// Image size
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Nearest-neighbour rescale of an RGBA image
    pub fn resized(&self, target: Size) -> MediaResult<Self> {
        if self.format != PixelFormat::Rgba8 {
            return Err(MediaError::UnsupportedFormat {
                format: format!("cannot resize {:?} images", self.format),
            });
        }
        if target == self.size() {
            return Ok(self.clone());
        }
        if target.is_empty() || self.size().is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: format!("cannot resize {} to {}", self.size(), target),
            });
        }

        let (src_w, src_h) = (self.width as usize, self.height as usize);
        let (dst_w, dst_h) = (target.width as usize, target.height as usize);
        let mut out = vec![0u8; dst_w * dst_h * 4];

        for y in 0..dst_h {
            let src_y = y * src_h / dst_h;
            for x in 0..dst_w {
                let src_x = x * src_w / dst_w;
                let src = (src_y * src_w + src_x) * 4;
                let dst = (y * dst_w + x) * 4;
                out[dst..dst + 4].copy_from_slice(&self.data[src..src + 4]);
            }
        }

        Ok(Self {
            width: target.width,
            height: target.height,
            format: PixelFormat::Rgba8,
            data: out.into(),
        })
    }
}

/// Describes where a detected image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Clockwise rotation in degrees (0, 90, 180, 270)
    pub rotation: u16,
    /// Camera the image came from
    pub camera_facing: CameraFacing,
    /// Presentation timestamp of the source frame
    pub timestamp_us: Option<u64>,
}

impl FrameMetadata {
    /// Metadata for an upright image from a back camera
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rotation: 0,
            camera_facing: CameraFacing::Back,
            timestamp_us: None,
        }
    }

    /// Set the camera facing
    pub fn with_facing(mut self, camera_facing: CameraFacing) -> Self {
        self.camera_facing = camera_facing;
        self
    }

    /// Set the source timestamp
    pub fn with_timestamp_us(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = Some(timestamp_us);
        self
    }
}

/// Facial landmark types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LandmarkKind {
    /// Bottom of the left ear
    LeftEar,
    /// Bottom of the right ear
    RightEar,
    /// Center of the left eye
    LeftEye,
    /// Center of the right eye
    RightEye,
    /// Left cheek
    LeftCheek,
    /// Right cheek
    RightCheek,
    /// Midpoint between the nostrils
    NoseBase,
    /// Left corner of the mouth
    MouthLeft,
    /// Right corner of the mouth
    MouthRight,
    /// Center of the bottom lip
    MouthBottom,
}

/// A landmark position in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmark {
    /// Landmark type
    pub kind: LandmarkKind,
    /// Position in image coordinates
    pub position: PointF,
}

/// A detected face in image coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    /// Bounding box
    pub bounding_box: RectF,
    /// Identifier stable across frames, when tracking is enabled
    pub tracking_id: Option<i32>,
    /// Detected landmarks
    pub landmarks: Vec<FaceLandmark>,
    /// Probability that the face is smiling
    pub smiling_probability: Option<f32>,
    /// Probability that the left eye is open
    pub left_eye_open_probability: Option<f32>,
    /// Probability that the right eye is open
    pub right_eye_open_probability: Option<f32>,
    /// Head rotation around the vertical axis, degrees
    pub head_euler_angle_y: f32,
    /// Head rotation around the viewing axis, degrees
    pub head_euler_angle_z: f32,
}

impl Face {
    /// Face with only a bounding box
    pub fn new(bounding_box: RectF) -> Self {
        Self {
            bounding_box,
            tracking_id: None,
            landmarks: Vec::new(),
            smiling_probability: None,
            left_eye_open_probability: None,
            right_eye_open_probability: None,
            head_euler_angle_y: 0.0,
            head_euler_angle_z: 0.0,
        }
    }

    /// Add a landmark
    pub fn with_landmark(mut self, kind: LandmarkKind, position: PointF) -> Self {
        self.landmarks.push(FaceLandmark { kind, position });
        self
    }

    /// Position of a landmark, if detected
    pub fn landmark(&self, kind: LandmarkKind) -> Option<PointF> {
        self.landmarks
            .iter()
            .find(|landmark| landmark.kind == kind)
            .map(|landmark| landmark.position)
    }
}

/// External face detection capability
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect faces in `image`
    async fn detect(&self, image: &VisionImage) -> MediaResult<Vec<Face>>;

    /// Release detector resources
    async fn close(&self) -> MediaResult<()> {
        Ok(())
    }
}

/// Faces found in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Detected faces in image coordinates
    pub faces: Vec<Face>,
    /// Where the image came from
    pub metadata: FrameMetadata,
    /// Position of the frame in submission order
    pub sequence: u64,
}

/// What happened to a frame offered to a [`FrameSlot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOffer {
    /// Nothing was in flight; the caller must start processing
    Started,
    /// Stored behind the frame in flight
    Queued,
    /// Stored behind the frame in flight, replacing an older pending frame
    Replaced,
    /// Discarded because the processor has stopped
    Rejected,
}

/// Single-slot buffer holding the latest frame and an in-flight flag
///
/// Depth is one: offering a frame while another is pending drops the older
/// pending one.
#[derive(Debug)]
pub struct FrameSlot<T> {
    latest: Mutex<Option<T>>,
    in_flight: AtomicBool,
    offered: AtomicU64,
    dropped: AtomicU64,
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameSlot<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            offered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Store `item` as the latest frame
    pub fn offer(&self, item: T) -> SlotOffer {
        self.offered.fetch_add(1, Ordering::Relaxed);
        let replaced = self.latest.lock().replace(item).is_some();
        if replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            SlotOffer::Started
        } else if replaced {
            SlotOffer::Replaced
        } else {
            SlotOffer::Queued
        }
    }

    /// Take the latest frame for processing
    pub fn take(&self) -> Option<T> {
        self.latest.lock().take()
    }

    /// Called by the processor once the slot looked empty
    ///
    /// Returns `true` when a frame arrived in the meantime and the caller
    /// still owns processing.
    pub fn finish(&self) -> bool {
        self.in_flight.store(false, Ordering::Release);
        self.latest.lock().is_some()
            && self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Whether a frame is being processed
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether a frame is waiting
    pub fn has_pending(&self) -> bool {
        self.latest.lock().is_some()
    }

    /// Frames offered so far
    pub fn offered(&self) -> u64 {
        self.offered.load(Ordering::Relaxed)
    }

    /// Pending frames replaced before they were processed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Detection counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    /// Frames handed to `process`
    pub frames_offered: u64,
    /// Frames replaced in the slot before detection
    pub frames_dropped: u64,
    /// Frames the detector ran on
    pub frames_processed: u64,
    /// Detector calls that failed
    pub detection_failures: u64,
}

struct ProcessorInner {
    detector: Arc<dyn FaceDetector>,
    slot: FrameSlot<(VisionImage, FrameMetadata)>,
    results: mpsc::Sender<DetectionResult>,
    sequence: AtomicU64,
    processed: AtomicU64,
    failures: AtomicU64,
    stopped: AtomicBool,
}

impl ProcessorInner {
    async fn drain(self: Arc<Self>) {
        loop {
            while let Some((image, metadata)) = self.slot.take() {
                if self.stopped.load(Ordering::Acquire) {
                    break;
                }
                self.detect_one(image, metadata).await;
            }
            if self.stopped.load(Ordering::Acquire) || !self.slot.finish() {
                break;
            }
        }
    }

    async fn detect_one(&self, image: VisionImage, metadata: FrameMetadata) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        match self.detector.detect(&image).await {
            Ok(faces) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                debug!("Frame {}: {} faces", sequence, faces.len());
                let result = DetectionResult {
                    faces,
                    metadata,
                    sequence,
                };
                if self.results.send(result).await.is_err() {
                    debug!("Detection result receiver dropped");
                }
            }
            Err(e) => {
                // Overlay keeps its previous contents for this frame
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Face detection failed {}", e);
            }
        }
    }
}

/// Runs a [`FaceDetector`] on the latest offered frame
#[derive(Clone)]
pub struct DetectionProcessor {
    inner: Arc<ProcessorInner>,
    runtime: Handle,
}

impl std::fmt::Debug for DetectionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionProcessor")
            .field("stats", &self.stats())
            .finish()
    }
}

impl DetectionProcessor {
    /// Create a processor and the receiver its results arrive on
    ///
    /// Must be called from within a tokio runtime; detection tasks are
    /// spawned onto it.
    pub fn new(
        detector: Arc<dyn FaceDetector>,
    ) -> MediaResult<(Self, mpsc::Receiver<DetectionResult>)> {
        let runtime = Handle::try_current().map_err(|_| MediaError::ResourceNotAvailable {
            resource: "tokio runtime for face detection".to_string(),
        })?;
        let (results, receiver) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        let processor = Self {
            inner: Arc::new(ProcessorInner {
                detector,
                slot: FrameSlot::new(),
                results,
                sequence: AtomicU64::new(0),
                processed: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
            runtime,
        };
        Ok((processor, receiver))
    }

    /// Offer a frame for detection
    ///
    /// Safe to call from any thread. If a frame is in flight, `image`
    /// replaces whatever frame was waiting behind it.
    pub fn process(&self, image: VisionImage, metadata: FrameMetadata) -> SlotOffer {
        if self.inner.stopped.load(Ordering::Acquire) {
            return SlotOffer::Rejected;
        }

        let offer = self.inner.slot.offer((image, metadata));
        if offer == SlotOffer::Started {
            self.runtime.spawn(self.inner.clone().drain());
        }
        offer
    }

    /// Stop accepting frames and close the detector
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.inner.detector.close().await {
            warn!("Exception thrown while trying to close Face Detector: {}", e);
        }
        info!("Detection processor stopped: {:?}", self.stats());
    }

    /// Whether `stop` has been called
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Whether a frame is being detected
    pub fn is_busy(&self) -> bool {
        self.inner.slot.is_in_flight()
    }

    /// Current counters
    pub fn stats(&self) -> DetectionStats {
        DetectionStats {
            frames_offered: self.inner.slot.offered(),
            frames_dropped: self.inner.slot.dropped(),
            frames_processed: self.inner.processed.load(Ordering::Relaxed),
            detection_failures: self.inner.failures.load(Ordering::Relaxed),
        }
    }
}

/// Feeds rendered frames into a [`DetectionProcessor`]
///
/// Each frame is scaled to the detection size before it is offered, the way
/// a player screen snapshots its texture at a fixed small resolution.
#[derive(Debug, Clone)]
pub struct DetectionFeed {
    processor: DetectionProcessor,
    target: Size,
    facing: CameraFacing,
}

impl DetectionFeed {
    /// Feed `processor` with frames scaled to `target`
    pub fn new(processor: DetectionProcessor, target: Size) -> Self {
        Self {
            processor,
            target,
            facing: CameraFacing::Back,
        }
    }

    /// Set the camera facing reported with every frame
    pub fn with_facing(mut self, facing: CameraFacing) -> Self {
        self.facing = facing;
        self
    }

    /// Scale `frame` and offer it for detection
    pub fn offer(&self, frame: &VideoFrame) -> Option<SlotOffer> {
        let resized = VisionImage::from_frame(frame).and_then(|image| image.resized(self.target));
        let image = match resized {
            Ok(image) => image,
            Err(e) => {
                debug!("Skipping frame at {} us for detection: {}", frame.pts_us, e);
                return None;
            }
        };
        let metadata = FrameMetadata::new(image.width, image.height)
            .with_facing(self.facing)
            .with_timestamp_us(frame.pts_us);
        Some(self.processor.process(image, metadata))
    }
}

impl FrameListener for DetectionFeed {
    fn on_frame(&self, _descriptor: &OutputDescriptor, frame: &VideoFrame) {
        self.offer(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Detector that blocks until released and reports one face per frame
    struct GatedDetector {
        gate: Notify,
        seen: Mutex<Vec<u8>>,
        fail: bool,
    }

    impl GatedDetector {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                gate: Notify::new(),
                seen: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl FaceDetector for GatedDetector {
        async fn detect(&self, image: &VisionImage) -> MediaResult<Vec<Face>> {
            self.gate.notified().await;
            self.seen.lock().push(image.data[0]);
            if self.fail {
                return Err(MediaError::DetectionFailed {
                    reason: "model not loaded".to_string(),
                });
            }
            Ok(vec![Face::new(RectF::new(0.0, 0.0, 1.0, 1.0))])
        }
    }

    fn image(marker: u8) -> (VisionImage, FrameMetadata) {
        (
            VisionImage::from_rgba(1, 1, vec![marker, 0, 0, 255]).unwrap(),
            FrameMetadata::new(1, 1),
        )
    }

    #[test]
    fn test_slot_replaces_pending() {
        let slot = FrameSlot::new();
        assert_eq!(slot.offer(1), SlotOffer::Started);
        assert_eq!(slot.take(), Some(1));

        assert_eq!(slot.offer(2), SlotOffer::Queued);
        assert_eq!(slot.offer(3), SlotOffer::Replaced);
        assert_eq!(slot.dropped(), 1);

        // Processor finds the newest frame and keeps ownership
        assert!(slot.finish());
        assert_eq!(slot.take(), Some(3));
        assert!(!slot.finish());
        assert!(!slot.is_in_flight());
        assert_eq!(slot.offered(), 3);
    }

    #[test]
    fn test_resize_nearest() {
        let data: Vec<u8> = (0..4u8).flat_map(|i| [i, i, i, 255]).collect();
        let image = VisionImage::from_rgba(2, 2, data).unwrap();

        let up = image.resized(Size::new(4, 4)).unwrap();
        assert_eq!(up.data.len(), 64);
        assert_eq!(up.data[0], 0);
        assert_eq!(up.data[(3 * 4 + 3) * 4], 3);

        assert!(VisionImage::from_rgba(2, 2, vec![0u8; 3]).is_err());
        assert!(image.resized(Size::new(0, 4)).is_err());
    }

    #[test]
    fn test_short_frame_is_rejected() {
        let frame = VideoFrame {
            width: 640,
            height: 480,
            format: PixelFormat::Rgba8,
            data: vec![0u8; 16].into(),
            pts_us: 0,
            is_keyframe: true,
        };
        match VisionImage::from_frame(&frame) {
            Err(MediaError::InvalidFrameData { expected, actual }) => {
                assert_eq!(expected, 640 * 480 * 4);
                assert_eq!(actual, 16);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_processor_detects_latest_frame() {
        let detector = GatedDetector::new(false);
        let (processor, mut results) = DetectionProcessor::new(detector.clone()).unwrap();

        assert_eq!(processor.process(image(1).0, image(1).1), SlotOffer::Started);
        tokio::task::yield_now().await;

        // Frame 1 is in flight; 2 is replaced by 3
        assert_ne!(processor.process(image(2).0, image(2).1), SlotOffer::Started);
        assert_eq!(processor.process(image(3).0, image(3).1), SlotOffer::Replaced);

        detector.gate.notify_one();
        let first = results.recv().await.unwrap();
        assert_eq!(first.sequence, 0);

        detector.gate.notify_one();
        let second = results.recv().await.unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.faces.len(), 1);

        assert_eq!(*detector.seen.lock(), vec![1, 3]);
        let stats = processor.stats();
        assert_eq!(stats.frames_offered, 3);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.frames_processed, 2);
    }

    #[tokio::test]
    async fn test_detector_failures_are_swallowed() {
        let detector = GatedDetector::new(true);
        let (processor, mut results) = DetectionProcessor::new(detector.clone()).unwrap();

        processor.process(image(1).0, image(1).1);
        detector.gate.notify_one();

        let outcome = tokio::time::timeout(Duration::from_millis(50), results.recv()).await;
        assert!(outcome.is_err(), "failed detections publish nothing");
        assert_eq!(processor.stats().detection_failures, 1);

        processor.stop().await;
        assert!(processor.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_processor_rejects_frames() {
        let detector = GatedDetector::new(false);
        let (processor, _results) = DetectionProcessor::new(detector).unwrap();

        processor.stop().await;
        assert_eq!(processor.process(image(1).0, image(1).1), SlotOffer::Rejected);
        assert_eq!(processor.stats().frames_offered, 0);
        assert!(!processor.is_busy());
    }

    #[test]
    fn test_processor_requires_runtime() {
        let detector = GatedDetector::new(false);
        assert!(DetectionProcessor::new(detector).is_err());
    }
}
