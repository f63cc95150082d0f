//! # FaceLens - Face Detection on Video and Camera Frames
//!
//! FaceLens plays local or remote video in step with a display clock, runs a
//! face detector on the frames it presents and keeps an overlay of the
//! detected faces. The same detection path also serves a live camera preview.
//!
//! ## Key Features
//!
//! - **Clock-driven playback**: frames are released on the display tick they are due, never earlier
//! - **Bounded decoding**: a decode session refuses input instead of buffering without limit
//! - **Latest-frame detection**: a single slot keeps the detector on the newest frame
//! - **Serialized camera access**: opening and closing the camera never overlap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use facelens::FaceLens;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let facelens = FaceLens::init()?;
//!
//!     let mut session = facelens.playback("/sdcard/clip.h264").start().await?;
//!
//!     let mut events = session.events().ok_or("events already taken")?;
//!     tokio::spawn(async move {
//!         while let Some(event) = events.next().await {
//!             println!("Playback event: {:?}", event);
//!         }
//!     });
//!
//!     let report = session.wait().await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use facelens_core::{
    CameraGate, CameraGateGuard, FaceLensError, IntervalTicker, ManualTicker, Tick, Ticker,
};

pub use facelens_media::{
    CameraFacing, CameraManager, DecoderFactory, DemuxerFactory, Face, FaceDetector,
    FaceGraphic, FrameMetadata, GraphicOverlay, MediaError, MediaSource, MemoryDemuxer,
    MemoryDemuxerFactory, Mp4Demuxer, Mp4DemuxerFactory, OpenedCamera, PipelineState, Size,
    StopReason, Surface, VideoFrame, VisionImage,
};

pub use facelens_diagnostics::{init_logging, PipelineReport, PlaybackProfile};

// Public API modules
pub mod camera;
pub mod config;
pub mod event;
pub mod playback;
pub mod session;

// Re-export main API types
pub use camera::{CameraBuilder, CameraSession};
pub use config::GlobalConfig;
pub use event::{Event, EventFilter, EventStream, FilteredEventStream};
pub use playback::{PlaybackBuilder, PlaybackSession};
pub use session::{SessionInfo, SessionKind, SessionRegistry};

use std::sync::Arc;

/// Main entry point for FaceLens
#[derive(Debug, Clone)]
pub struct FaceLens {
    inner: Arc<FaceLensInner>,
}

#[derive(Debug)]
struct FaceLensInner {
    config: GlobalConfig,
    sessions: SessionRegistry,
}

impl FaceLens {
    /// Initialize FaceLens with default settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use facelens::FaceLens;
    ///
    /// let facelens = FaceLens::init()?;
    /// # Ok::<(), facelens::FaceLensError>(())
    /// ```
    pub fn init() -> Result<Self, FaceLensError> {
        Self::init_with(GlobalConfig::default())
    }

    /// Initialize with custom global configuration
    ///
    /// Installs the global tracing subscriber unless one is already set.
    pub fn init_with(config: GlobalConfig) -> Result<Self, FaceLensError> {
        config.validate()?;
        init_logging(config.debug_logging);

        let sessions = SessionRegistry::new(config.max_sessions);
        Ok(Self {
            inner: Arc::new(FaceLensInner { config, sessions }),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &GlobalConfig {
        &self.inner.config
    }

    /// Sessions currently running
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Create a playback builder for a file path or URI
    ///
    /// # Example
    /// ```rust,no_run
    /// use facelens::FaceLens;
    ///
    /// # async fn example() -> Result<(), facelens::FaceLensError> {
    /// let facelens = FaceLens::init()?;
    /// let session = facelens.playback("/sdcard/clip.h264").start().await?;
    /// let report = session.wait().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn playback(&self, uri: &str) -> PlaybackBuilder {
        PlaybackBuilder::new(self, uri)
    }

    /// Create a playback builder for the configured web page video
    ///
    /// Ticks at the web snapshot rate. Remote sources need a demuxer factory
    /// that can open them.
    pub fn web_playback(&self) -> PlaybackBuilder {
        let web = &self.inner.config.web;
        PlaybackBuilder::new(self, &web.url).tick_rate_hz(web.frame_rate)
    }

    /// Create a camera session builder over `manager`
    pub fn camera(&self, manager: Arc<dyn CameraManager>) -> CameraBuilder {
        CameraBuilder::new(self, manager)
    }
}
