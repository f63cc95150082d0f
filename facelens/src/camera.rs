//! Camera sessions
//!
//! Wraps a [`CameraController`] so it can be driven from async code. The
//! controller blocks while it waits for the camera gate, so every open and
//! close runs on the tokio blocking pool. State queries never wait for them.

use crate::playback::forward_detections;
use crate::session::{SessionKind, SessionRegistry};
use crate::{Event, EventStream, FaceLens, FaceLensError};
use facelens_core::CameraGate;
use facelens_media::{
    scale_to_max, CameraController, CameraControllerConfig, CameraFacing, CameraManager,
    DetectionProcessor, DetectionStats, FaceDetector, FrameMetadata, GraphicOverlay, MediaError,
    OpenedCamera, Size, SlotOffer, VideoFrame, VisionImage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fluent builder for a camera session
pub struct CameraBuilder {
    facelens: FaceLens,
    manager: Arc<dyn CameraManager>,
    detector: Option<Arc<dyn FaceDetector>>,
    gate: Option<Arc<CameraGate>>,
    camera_index: Option<usize>,
    lock_timeout: Option<Duration>,
    facing: Option<CameraFacing>,
    view_size: Option<Size>,
}

impl std::fmt::Debug for CameraBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraBuilder")
            .field("detector", &self.detector.is_some())
            .field("camera_index", &self.camera_index)
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

impl CameraBuilder {
    pub(crate) fn new(facelens: &FaceLens, manager: Arc<dyn CameraManager>) -> Self {
        Self {
            facelens: facelens.clone(),
            manager,
            detector: None,
            gate: None,
            camera_index: None,
            lock_timeout: None,
            facing: None,
            view_size: None,
        }
    }

    /// Run face detection on offered camera frames
    pub fn detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Share a gate with other sessions using the same device
    pub fn gate(mut self, gate: Arc<CameraGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Position in the camera id list
    pub fn camera_index(mut self, index: usize) -> Self {
        self.camera_index = Some(index);
        self
    }

    /// How long opening waits for the camera gate
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Override the facing reported with detection frames
    pub fn facing(mut self, facing: CameraFacing) -> Self {
        self.facing = Some(facing);
        self
    }

    /// Size of the view the overlay covers
    pub fn view_size(mut self, view_size: Size) -> Self {
        self.view_size = Some(view_size);
        self
    }

    /// Register the session. The camera stays closed until [`CameraSession::open`].
    pub fn build(self) -> Result<CameraSession, FaceLensError> {
        let config = self.facelens.config().clone();
        let camera_index = self.camera_index.unwrap_or(config.camera.camera_index);
        let registry = self.facelens.sessions().clone();
        let info = registry.register(SessionKind::Camera, &format!("camera {}", camera_index))?;
        let id = info.id;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let overlay = Arc::new(
            GraphicOverlay::new(self.view_size.unwrap_or(config.detection.player_frame))
                .with_show_only_contour(config.detection.show_only_contour),
        );

        let detection = match self.detector {
            Some(detector) => {
                let (processor, results) = match DetectionProcessor::new(detector) {
                    Ok(started) => started,
                    Err(e) => {
                        registry.unregister(id);
                        return Err(e.into());
                    }
                };
                tokio::spawn(forward_detections(
                    results,
                    overlay.clone(),
                    event_tx.clone(),
                    id,
                ));
                Some(processor)
            }
            None => None,
        };

        let mut controller = CameraController::new(self.manager).with_config(CameraControllerConfig {
            camera_index,
            lock_timeout: self.lock_timeout.unwrap_or_else(|| config.camera.lock_timeout()),
        });
        if let Some(gate) = self.gate {
            controller = controller.with_gate(gate);
        }

        debug!("Built camera session {} for index {}", id, camera_index);
        Ok(CameraSession {
            id,
            registry,
            controller: Arc::new(controller),
            overlay,
            detection,
            facing: self.facing.unwrap_or(config.camera.facing),
            camera_image_max: config.detection.camera_image_max,
            event_tx,
            events: Some(EventStream::new(event_rx)),
        })
    }
}

/// A camera preview with optional face detection
#[derive(Debug)]
pub struct CameraSession {
    id: Uuid,
    registry: SessionRegistry,
    controller: Arc<CameraController>,
    overlay: Arc<GraphicOverlay>,
    detection: Option<DetectionProcessor>,
    facing: CameraFacing,
    camera_image_max: u32,
    event_tx: mpsc::UnboundedSender<Event>,
    events: Option<EventStream>,
}

impl CameraSession {
    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Take the session's event stream. Only the first call returns it.
    pub fn events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    /// Overlay showing the latest detected faces
    pub fn overlay(&self) -> Arc<GraphicOverlay> {
        self.overlay.clone()
    }

    /// Detection counters, when a detector is attached
    pub fn detection_stats(&self) -> Option<DetectionStats> {
        self.detection.as_ref().map(DetectionProcessor::stats)
    }

    /// Whether the camera is open
    pub fn is_open(&self) -> bool {
        self.controller.is_open()
    }

    /// Open the camera for a view of `width`x`height` pixels
    ///
    /// Failures are also reported as [`Event::SessionError`] carrying a
    /// message for the user.
    pub async fn open(&self, width: u32, height: u32) -> Result<OpenedCamera, FaceLensError> {
        let controller = self.controller.clone();
        let opened = tokio::task::spawn_blocking(move || controller.open(width, height))
            .await
            .map_err(|e| FaceLensError::WorkerStopped {
                name: format!("camera open: {}", e),
            })?;

        match opened {
            Ok(camera) => {
                self.overlay.set_camera_info(camera.preview_size, camera.facing);
                info!(
                    "Camera session {} opened {} at {}x{}",
                    self.id, camera.camera_id, camera.preview_size.width, camera.preview_size.height
                );
                let _ = self.event_tx.send(Event::CameraOpened {
                    session_id: self.id,
                    camera_id: camera.camera_id.clone(),
                    preview_size: camera.preview_size,
                });
                Ok(camera)
            }
            Err(e) => {
                let (user_message, recoverable) = match &e {
                    MediaError::Camera { source } => {
                        (Some(source.user_message().to_string()), source.is_recoverable())
                    }
                    other => (None, other.is_recoverable()),
                };
                warn!("Camera session {} failed to open: {}", self.id, e);
                let _ = self.event_tx.send(Event::SessionError {
                    session_id: self.id,
                    error: e.to_string(),
                    user_message,
                    recoverable,
                });
                Err(e.into())
            }
        }
    }

    /// Stop the preview and close the camera
    pub async fn close(&self) -> Result<(), FaceLensError> {
        self.shutdown(false).await
    }

    /// Close the camera and stop its background worker
    pub async fn pause(&self) -> Result<(), FaceLensError> {
        self.shutdown(true).await
    }

    /// Offer a camera frame for detection
    ///
    /// The frame is scaled so its longer side matches the configured
    /// detection size. Returns `None` without a detector.
    pub fn detect(&self, frame: &VideoFrame) -> Option<SlotOffer> {
        let processor = self.detection.as_ref()?;
        let resized = VisionImage::from_frame(frame).and_then(|image| {
            let target = scale_to_max(image.size(), self.camera_image_max);
            image.resized(target)
        });
        let image = match resized {
            Ok(image) => image,
            Err(e) => {
                debug!("Skipping camera frame for detection: {}", e);
                return None;
            }
        };
        let metadata = FrameMetadata::new(image.width, image.height)
            .with_facing(self.facing)
            .with_timestamp_us(frame.pts_us);
        Some(processor.process(image, metadata))
    }

    async fn shutdown(&self, stop_worker: bool) -> Result<(), FaceLensError> {
        let controller = self.controller.clone();
        let was_open = tokio::task::spawn_blocking(move || {
            if stop_worker {
                controller.pause()
            } else {
                controller.close()
            }
        })
        .await
        .map_err(|e| FaceLensError::WorkerStopped {
            name: format!("camera close: {}", e),
        })?;

        if was_open {
            self.overlay.clear();
            let _ = self.event_tx.send(Event::CameraClosed { session_id: self.id });
        }
        Ok(())
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        // The controller closes the camera when its last handle goes away
        self.registry.unregister(self.id);
    }
}
