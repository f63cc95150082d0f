//! Render targets for decoded frames
//!
//! A decode session is bound to one [`Surface`] for its whole life and
//! releases it in `stop_and_release`.

use crate::error::{MediaError, MediaResult};
use crate::geometry::Size;
use crate::tracks::VideoFrame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Something decoded frames can be rendered to
pub trait Surface: Send + Sync + std::fmt::Debug {
    /// Render one frame
    fn render(&self, frame: &VideoFrame) -> MediaResult<()>;

    /// Release the surface. Later renders fail.
    fn release(&self);

    /// Whether the surface has been released
    fn is_released(&self) -> bool;

    /// Surface size, when known
    fn size(&self) -> Option<Size> {
        None
    }
}

/// Surface that discards every frame
#[derive(Debug, Default)]
pub struct NullSurface {
    released: AtomicBool,
}

impl NullSurface {
    /// Create a new null surface
    pub fn new() -> Self {
        Self::default()
    }
}

impl Surface for NullSurface {
    fn render(&self, _frame: &VideoFrame) -> MediaResult<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(released_error());
        }
        Ok(())
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// Surface rendering statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    /// Total frames rendered
    pub frames_rendered: u64,
    /// Frames whose timestamp went backwards
    pub out_of_order_frames: u64,
    /// Timestamp of the last rendered frame
    pub last_pts_us: Option<u64>,
}

/// Surface that keeps the most recent frame and a render log
///
/// Stands in for a texture view: the latest frame is what a screenshot of
/// the view would show.
#[derive(Debug)]
pub struct FrameSinkSurface {
    size: Option<Size>,
    latest: Mutex<Option<VideoFrame>>,
    rendered_pts_us: Mutex<Vec<u64>>,
    frames_rendered: AtomicU64,
    out_of_order_frames: AtomicU64,
    released: AtomicBool,
}

impl FrameSinkSurface {
    /// Create a new sink
    pub fn new() -> Self {
        Self {
            size: None,
            latest: Mutex::new(None),
            rendered_pts_us: Mutex::new(Vec::new()),
            frames_rendered: AtomicU64::new(0),
            out_of_order_frames: AtomicU64::new(0),
            released: AtomicBool::new(false),
        }
    }

    /// Create a sink of a known view size
    pub fn with_size(size: Size) -> Self {
        Self {
            size: Some(size),
            ..Self::new()
        }
    }

    /// Most recently rendered frame
    pub fn latest_frame(&self) -> Option<VideoFrame> {
        self.latest.lock().clone()
    }

    /// Timestamps of every rendered frame, in render order
    pub fn rendered_pts_us(&self) -> Vec<u64> {
        self.rendered_pts_us.lock().clone()
    }

    /// Current statistics
    pub fn stats(&self) -> SurfaceStats {
        SurfaceStats {
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            out_of_order_frames: self.out_of_order_frames.load(Ordering::Relaxed),
            last_pts_us: self.rendered_pts_us.lock().last().copied(),
        }
    }
}

impl Default for FrameSinkSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for FrameSinkSurface {
    fn render(&self, frame: &VideoFrame) -> MediaResult<()> {
        if self.is_released() {
            return Err(released_error());
        }

        let mut log = self.rendered_pts_us.lock();
        if log.last().is_some_and(|last| *last > frame.pts_us) {
            self.out_of_order_frames.fetch_add(1, Ordering::Relaxed);
        }
        log.push(frame.pts_us);
        drop(log);

        *self.latest.lock() = Some(frame.clone());
        self.frames_rendered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!(
                "Released frame sink after {} frames",
                self.frames_rendered.load(Ordering::Relaxed)
            );
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn size(&self) -> Option<Size> {
        self.size
    }
}

fn released_error() -> MediaError {
    MediaError::ResourceNotAvailable {
        resource: "surface (released)".to_string(),
    }
}
