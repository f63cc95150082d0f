//! # FaceLens Diagnostics
//!
//! Debugging and diagnostic tools for FaceLens.
//! Provides logging setup, presentation timing profiles and pipeline reports.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod pipeline_report;
pub mod playback_profiler;

// Re-export main types
pub use debug_logger::{init_logging, DebugLogger};
pub use pipeline_report::PipelineReport;
pub use playback_profiler::{PlaybackProfile, PlaybackProfiler, DEFAULT_LATE_THRESHOLD_MS};
