//! Presentation timing analysis
//!
//! [`PlaybackProfiler`] consumes [`PipelineEvent`]s and keeps track of how
//! late frames reached the surface relative to their timestamps.

use facelens_media::{PipelineEvent, PumpStats, StopReason};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lateness above which a frame counts as late (one frame at 60 Hz)
pub const DEFAULT_LATE_THRESHOLD_MS: u64 = 17;

/// Timing summary for one playback
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackProfile {
    /// Frames released to the surface
    pub frames_released: u64,
    /// Frames released more than the threshold after their timestamp
    pub late_frames: u64,
    /// Mean gap between timestamp and release
    pub mean_lateness_ms: f64,
    /// Largest gap between timestamp and release
    pub max_lateness_ms: u64,
    /// Ticks processed
    pub ticks: u64,
    /// Mean wall-clock time spent per tick
    pub mean_tick_work_us: f64,
    /// Longest wall-clock time spent in one tick
    pub max_tick_work_us: u64,
    /// Why playback stopped, once it has
    pub stop_reason: Option<StopReason>,
}

/// Collects presentation timing from pipeline events
#[derive(Debug, Clone)]
pub struct PlaybackProfiler {
    late_threshold_ms: u64,
    frames_released: u64,
    late_frames: u64,
    total_lateness_ms: u64,
    max_lateness_ms: u64,
    final_stats: Option<PumpStats>,
    stop_reason: Option<StopReason>,
}

impl Default for PlaybackProfiler {
    fn default() -> Self {
        Self::new(DEFAULT_LATE_THRESHOLD_MS)
    }
}

impl PlaybackProfiler {
    /// Create a profiler counting frames later than `late_threshold_ms`
    pub fn new(late_threshold_ms: u64) -> Self {
        Self {
            late_threshold_ms,
            frames_released: 0,
            late_frames: 0,
            total_lateness_ms: 0,
            max_lateness_ms: 0,
            final_stats: None,
            stop_reason: None,
        }
    }

    /// Record a frame with timestamp `pts_ms` released on tick `tick_ms`
    pub fn record_release(&mut self, pts_ms: u64, tick_ms: u64) {
        let lateness = tick_ms.saturating_sub(pts_ms);
        self.frames_released += 1;
        self.total_lateness_ms += lateness;
        self.max_lateness_ms = self.max_lateness_ms.max(lateness);
        if lateness > self.late_threshold_ms {
            self.late_frames += 1;
            debug!("Frame due at {} ms shown {} ms late", pts_ms, lateness);
        }
    }

    /// Update from a pipeline event
    pub fn observe(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::FrameReleased { output, tick_ms } => {
                self.record_release(output.pts_ms(), *tick_ms)
            }
            PipelineEvent::Stopped { reason, stats } => {
                self.stop_reason = Some(*reason);
                self.final_stats = Some(stats.clone());
            }
            _ => {}
        }
    }

    /// Whether the pipeline reported that it stopped
    pub fn is_complete(&self) -> bool {
        self.stop_reason.is_some()
    }

    /// Current summary
    pub fn profile(&self) -> PlaybackProfile {
        let mean_lateness_ms = if self.frames_released == 0 {
            0.0
        } else {
            self.total_lateness_ms as f64 / self.frames_released as f64
        };

        let (ticks, mean_tick_work_us, max_tick_work_us) = match &self.final_stats {
            Some(stats) if stats.ticks > 0 => (
                stats.ticks,
                stats.tick_work_us as f64 / stats.ticks as f64,
                stats.max_tick_work_us,
            ),
            _ => (0, 0.0, 0),
        };

        PlaybackProfile {
            frames_released: self.frames_released,
            late_frames: self.late_frames,
            mean_lateness_ms,
            max_lateness_ms: self.max_lateness_ms,
            ticks,
            mean_tick_work_us,
            max_tick_work_us,
            stop_reason: self.stop_reason,
        }
    }
}
