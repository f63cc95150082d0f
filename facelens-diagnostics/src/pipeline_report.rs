//! Point-in-time pipeline snapshots

use crate::playback_profiler::PlaybackProfile;
use chrono::{DateTime, Utc};
use facelens_core::FaceLensError;
use facelens_media::{
    DecodeStats, DetectionStats, PipelineState, PlaybackPipeline, PumpStats, SourceTrack,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serializable snapshot of a playback pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Report identifier
    pub id: Uuid,
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
    /// Source being played
    pub source: String,
    /// Pipeline state at snapshot time
    pub state: PipelineState,
    /// Selected track
    pub track: Option<SourceTrack>,
    /// Pump counters
    pub pump: PumpStats,
    /// Decode session counters
    pub decode: DecodeStats,
    /// Detection counters, when detection is attached
    pub detection: Option<DetectionStats>,
    /// Presentation timing, when profiled
    pub profile: Option<PlaybackProfile>,
}

impl PipelineReport {
    /// Snapshot `pipeline`
    pub fn from_pipeline(pipeline: &PlaybackPipeline) -> Self {
        Self {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            source: pipeline.source().to_string(),
            state: pipeline.state(),
            track: pipeline.track().cloned(),
            pump: pipeline.stats(),
            decode: pipeline.session_stats(),
            detection: None,
            profile: None,
        }
    }

    /// Attach detection counters
    pub fn with_detection(mut self, detection: DetectionStats) -> Self {
        self.detection = Some(detection);
        self
    }

    /// Attach a timing profile
    pub fn with_profile(mut self, profile: PlaybackProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, FaceLensError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a report written by [`PipelineReport::to_json`]
    pub fn from_json(json: &str) -> Result<Self, FaceLensError> {
        Ok(serde_json::from_str(json)?)
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} [{}] {} ticks, {} frames released, max lateness {} ms",
            self.source,
            self.state,
            self.pump.ticks,
            self.pump.frames_released,
            self.pump.max_lateness_ms
        );
        if let Some(detection) = &self.detection {
            line.push_str(&format!(
                ", {} detections ({} frames dropped)",
                detection.frames_processed, detection.frames_dropped
            ));
        }
        line
    }
}
