//! Camera device control
//!
//! The platform camera stack is reached through three traits:
//! [`CameraManager`] enumerates and opens devices, [`CameraDevice`] creates
//! capture sessions, [`CaptureSession`] runs the repeating preview request.
//! [`CameraController`] drives them: it picks the video and preview sizes,
//! serializes open and close through a [`CameraGate`], and configures the
//! capture session on the `CameraBackground` worker thread.

use crate::error::{CameraError, MediaError, MediaResult};
use crate::geometry::{CompareSizesByArea, Size};
use facelens_core::{BackgroundWorker, CameraGate, DEFAULT_GATE_TIMEOUT};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the worker thread that configures capture sessions
pub const CAMERA_WORKER_NAME: &str = "CameraBackground";

/// Position of the camera used when none is configured
pub const DEFAULT_CAMERA_INDEX: usize = 1;

/// Largest video width considered by [`choose_video_size`]
pub const MAX_VIDEO_WIDTH: u32 = 1080;

/// Which way a camera faces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// Facing away from the user
    #[default]
    Back,
    /// Facing the user; preview is mirrored
    Front,
}

/// Sizes a camera can stream at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConfigurationMap {
    /// Sizes usable for a media recorder
    pub recorder_sizes: Vec<Size>,
    /// Sizes usable for a preview surface
    pub preview_sizes: Vec<Size>,
}

/// Static properties of a camera
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraCharacteristics {
    /// Which way the camera faces
    pub facing: CameraFacing,
    /// Sensor orientation in degrees
    pub sensor_orientation: u16,
    /// Stream sizes, absent on devices that do not report them
    pub stream_configuration: Option<StreamConfigurationMap>,
}

/// 3A control mode of a capture request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlMode {
    /// Auto-exposure, auto-focus and auto-white-balance managed by the device
    #[default]
    Auto,
    /// All controls set manually
    Off,
}

/// Request repeated for every preview frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Output target size
    pub target: Size,
    /// Control mode
    pub control_mode: ControlMode,
}

impl CaptureRequest {
    /// Preview request targeting a surface of `target` pixels
    pub fn preview(target: Size) -> Self {
        Self {
            target,
            control_mode: ControlMode::Auto,
        }
    }
}

/// Entry point to the platform's cameras
pub trait CameraManager: Send + Sync {
    /// Identifiers of the available cameras
    fn camera_ids(&self) -> Result<Vec<String>, CameraError>;

    /// Static properties of a camera
    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError>;

    /// Open a camera
    fn open(&self, camera_id: &str) -> Result<Box<dyn CameraDevice>, CameraError>;
}

/// An opened camera
pub trait CameraDevice: Send + Sync {
    /// Camera identifier
    fn id(&self) -> &str;

    /// Create a capture session streaming to the given targets
    fn create_capture_session(
        &self,
        targets: &[Size],
    ) -> Result<Box<dyn CaptureSession>, CameraError>;

    /// Close the camera
    fn close(&self);
}

/// A configured capture session
pub trait CaptureSession: Send {
    /// Repeat `request` for every frame until closed
    fn set_repeating_request(&mut self, request: CaptureRequest) -> Result<(), CameraError>;

    /// Stop capturing
    fn close(&mut self);
}

/// Pick the video size: the first 4:3 size no wider than 1080 pixels, else
/// the last choice
pub fn choose_video_size(choices: &[Size]) -> Option<Size> {
    choices
        .iter()
        .find(|size| size.width == size.height * 4 / 3 && size.width <= MAX_VIDEO_WIDTH)
        .or_else(|| choices.last())
        .copied()
}

/// Pick the smallest size with the aspect ratio of `aspect` that is at least
/// `width`x`height`, else the first choice
pub fn choose_optimal_size(choices: &[Size], width: u32, height: u32, aspect: Size) -> Option<Size> {
    if aspect.width == 0 {
        return choices.first().copied();
    }

    let big_enough = choices.iter().filter(|option| {
        option.height as u64 == option.width as u64 * aspect.height as u64 / aspect.width as u64
            && option.width >= width
            && option.height >= height
    });

    match big_enough.min_by(|lhs, rhs| CompareSizesByArea.compare(lhs, rhs)) {
        Some(size) => Some(*size),
        None => {
            debug!("Couldn't find any suitable preview size");
            choices.first().copied()
        }
    }
}

/// Camera controller settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraControllerConfig {
    /// Position in the camera id list
    pub camera_index: usize,
    /// How long `open` waits for the gate
    pub lock_timeout: Duration,
}

impl Default for CameraControllerConfig {
    fn default() -> Self {
        Self {
            camera_index: DEFAULT_CAMERA_INDEX,
            lock_timeout: DEFAULT_GATE_TIMEOUT,
        }
    }
}

/// What an open camera streams at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedCamera {
    /// Camera identifier
    pub camera_id: String,
    /// Which way the camera faces
    pub facing: CameraFacing,
    /// Size chosen for recording
    pub video_size: Size,
    /// Size chosen for the preview surface
    pub preview_size: Size,
}

/// Device and capture session of an open camera
struct ActiveCamera {
    device: Arc<dyn CameraDevice>,
    session: Box<dyn CaptureSession>,
    opened: OpenedCamera,
}

/// Opens, previews and closes one camera
///
/// Every method takes `&self`. Open, close and pause are serialized by the
/// [`CameraGate`]; the open/closed state sits behind its own short-held lock
/// so queries never wait for a sequence in progress.
pub struct CameraController {
    manager: Arc<dyn CameraManager>,
    gate: Arc<CameraGate>,
    config: CameraControllerConfig,
    worker: Mutex<Option<BackgroundWorker>>,
    active: Mutex<Option<ActiveCamera>>,
}

impl std::fmt::Debug for CameraController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraController")
            .field("config", &self.config)
            .field("opened", &self.opened())
            .field("worker_running", &self.is_worker_running())
            .finish()
    }
}

impl CameraController {
    /// Create a controller with its own gate
    pub fn new(manager: Arc<dyn CameraManager>) -> Self {
        Self {
            manager,
            gate: Arc::new(CameraGate::new()),
            config: CameraControllerConfig::default(),
            worker: Mutex::new(None),
            active: Mutex::new(None),
        }
    }

    /// Use these settings
    pub fn with_config(mut self, config: CameraControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a gate with other controllers of the same device
    pub fn with_gate(mut self, gate: Arc<CameraGate>) -> Self {
        self.gate = gate;
        self
    }

    /// The gate serializing open and close
    pub fn gate(&self) -> &Arc<CameraGate> {
        &self.gate
    }

    /// Details of the open camera
    pub fn opened(&self) -> Option<OpenedCamera> {
        self.active.lock().as_ref().map(|active| active.opened.clone())
    }

    /// Whether a camera is open
    ///
    /// An open still in progress reports `false` until it completes.
    pub fn is_open(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Whether the background worker is running
    pub fn is_worker_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(BackgroundWorker::is_running)
    }

    /// Open the configured camera and start a preview for a view of
    /// `width`x`height` pixels
    ///
    /// Blocks the calling thread while waiting for the gate and while the
    /// worker configures the session. Do not call from an async task.
    pub fn open(&self, width: u32, height: u32) -> MediaResult<OpenedCamera> {
        if self.is_open() {
            return Err(already_open());
        }

        let _guard = self
            .gate
            .try_acquire_for("open", self.config.lock_timeout)
            .map_err(|_| CameraError::LockTimeout {
                timeout: self.config.lock_timeout,
            })?;
        // Another open may have finished while we waited
        if self.is_open() {
            return Err(already_open());
        }

        self.ensure_worker()?;

        let ids = self.manager.camera_ids()?;
        let camera_id = ids
            .get(self.config.camera_index)
            .cloned()
            .ok_or(CameraError::DeviceNotFound {
                index: self.config.camera_index,
                available: ids.len(),
            })?;

        let characteristics = self.manager.characteristics(&camera_id)?;
        let map = characteristics.stream_configuration.ok_or_else(|| {
            CameraError::MissingStreamConfiguration {
                camera_id: camera_id.clone(),
            }
        })?;

        let missing = || CameraError::MissingStreamConfiguration {
            camera_id: camera_id.clone(),
        };
        let video_size = choose_video_size(&map.recorder_sizes).ok_or_else(missing)?;
        let preview_size = choose_optimal_size(&map.preview_sizes, width, height, video_size)
            .ok_or_else(missing)?;
        debug!(
            "Camera {}: video {} preview {} for view {}x{}",
            camera_id, video_size, preview_size, width, height
        );

        let device: Arc<dyn CameraDevice> = Arc::from(self.manager.open(&camera_id)?);
        let session = match self.start_preview(device.clone(), preview_size) {
            Ok(session) => session,
            Err(e) => {
                device.close();
                return Err(e);
            }
        };

        let opened = OpenedCamera {
            camera_id,
            facing: characteristics.facing,
            video_size,
            preview_size,
        };
        info!(
            "Opened camera {} ({:?}) with preview {}",
            opened.camera_id, opened.facing, opened.preview_size
        );

        *self.active.lock() = Some(ActiveCamera {
            device,
            session,
            opened: opened.clone(),
        });
        Ok(opened)
    }

    fn ensure_worker(&self) -> MediaResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_none() {
            let started = BackgroundWorker::start(CAMERA_WORKER_NAME).map_err(|e| {
                MediaError::ResourceNotAvailable {
                    resource: format!("camera worker: {}", e),
                }
            })?;
            *worker = Some(started);
        }
        Ok(())
    }

    fn start_preview(
        &self,
        device: Arc<dyn CameraDevice>,
        preview_size: Size,
    ) -> MediaResult<Box<dyn CaptureSession>> {
        let submitted = {
            let worker = self.worker.lock();
            let worker = worker
                .as_ref()
                .ok_or_else(|| MediaError::ResourceNotAvailable {
                    resource: CAMERA_WORKER_NAME.to_string(),
                })?;
            worker.submit(move || -> Result<Box<dyn CaptureSession>, CameraError> {
                let mut session = device.create_capture_session(&[preview_size])?;
                if let Err(e) = session.set_repeating_request(CaptureRequest::preview(preview_size))
                {
                    session.close();
                    return Err(e);
                }
                Ok(session)
            })
        };

        let configured = submitted
            .map_err(|e| CameraError::SessionConfigurationFailed {
                reason: e.to_string(),
            })?
            .blocking_recv()
            .map_err(|e| CameraError::SessionConfigurationFailed {
                reason: format!("{} stopped: {}", CAMERA_WORKER_NAME, e),
            })?;

        Ok(configured?)
    }

    /// Stop the preview and close the camera
    ///
    /// Waits for any open in progress to finish first. Returns whether a
    /// camera was open.
    pub fn close(&self) -> bool {
        let _guard = self.gate.acquire("close");
        self.release()
    }

    /// Close the camera and stop the background worker
    ///
    /// Returns whether a camera was open.
    pub fn pause(&self) -> bool {
        let _guard = self.gate.acquire("pause");
        let was_open = self.release();

        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            if let Err(e) = worker.quit_safely() {
                warn!("Camera worker did not stop cleanly: {}", e);
            }
        }
        was_open
    }

    fn release(&self) -> bool {
        let active = self.active.lock().take();
        match active {
            Some(mut active) => {
                active.session.close();
                active.device.close();
                info!("Closed camera {}", active.device.id());
                true
            }
            None => false,
        }
    }
}

fn already_open() -> MediaError {
    MediaError::InvalidState {
        message: "camera already open".to_string(),
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        if self.active.get_mut().is_some() || self.worker.get_mut().is_some() {
            self.pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_video_size() {
        let choices = [
            Size::new(1920, 1080),
            Size::new(1440, 1080),
            Size::new(960, 720),
            Size::new(640, 480),
        ];
        assert_eq!(choose_video_size(&choices), Some(Size::new(960, 720)));

        let wide = [Size::new(1920, 1080), Size::new(1280, 720)];
        assert_eq!(choose_video_size(&wide), Some(Size::new(1280, 720)));
        assert_eq!(choose_video_size(&[]), None);
    }

    #[test]
    fn test_choose_optimal_size() {
        let choices = [
            Size::new(1920, 1080),
            Size::new(1280, 960),
            Size::new(960, 720),
            Size::new(640, 480),
        ];
        let aspect = Size::new(960, 720);

        assert_eq!(
            choose_optimal_size(&choices, 800, 600, aspect),
            Some(Size::new(960, 720))
        );
        assert_eq!(
            choose_optimal_size(&choices, 320, 240, aspect),
            Some(Size::new(640, 480))
        );
        // Nothing large enough falls back to the first choice
        assert_eq!(
            choose_optimal_size(&choices, 4000, 3000, aspect),
            Some(Size::new(1920, 1080))
        );
    }

    #[test]
    fn test_default_config() {
        let config = CameraControllerConfig::default();
        assert_eq!(config.camera_index, 1);
        assert_eq!(config.lock_timeout, Duration::from_millis(2500));
        assert_eq!(CaptureRequest::preview(Size::new(4, 3)).control_mode, ControlMode::Auto);
    }
}
