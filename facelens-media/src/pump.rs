//! Clock-driven playback pump
//!
//! Every clock tick the pump does three things, in order:
//!
//! 1. **Feed**: submit the demuxer's current sample and advance the demuxer
//!    only if the session accepted it. Once the demuxer runs dry, submit a
//!    single end-of-stream marker.
//! 2. **Drain check**: peek the next output. With no sized output pending and
//!    the end of stream signalled, tear everything down.
//! 3. **Present**: release the peeked output to the surface once its
//!    timestamp (µs truncated to ms) is at or before the tick time.
//!
//! At most one output is released per tick.

use crate::decoder::{DecodeSession, DecodeStats};
use crate::demuxer::Demuxer;
use crate::tracks::{CompressedSample, OutputDescriptor};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Pump state after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PumpStatus {
    /// Samples are still being fed
    Running,
    /// End of stream signalled, pending outputs are being presented
    Draining,
    /// Session and demuxer released
    Stopped,
}

/// Pump counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpStats {
    /// Ticks processed while not stopped
    pub ticks: u64,
    /// Samples the session accepted
    pub samples_submitted: u64,
    /// Submissions the session refused
    pub submissions_refused: u64,
    /// Outputs released to the surface
    pub frames_released: u64,
    /// Largest gap between a frame's timestamp and the tick that released it
    pub max_lateness_ms: u64,
    /// Time of the most recent tick
    pub last_tick_ms: u64,
    /// Wall-clock time spent inside ticks
    pub tick_work_us: u64,
    /// Longest wall-clock time spent inside one tick
    pub max_tick_work_us: u64,
}

/// Feeds a decode session from a demuxer on every clock tick
pub struct PlaybackPump {
    demuxer: Box<dyn Demuxer>,
    session: Box<dyn DecodeSession>,
    last_sample_pts_us: u64,
    end_of_stream_signalled: bool,
    last_released: Option<OutputDescriptor>,
    stopped: bool,
    stats: PumpStats,
}

impl std::fmt::Debug for PlaybackPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackPump")
            .field("codec", &self.session.codec_name())
            .field("end_of_stream_signalled", &self.end_of_stream_signalled)
            .field("stopped", &self.stopped)
            .field("stats", &self.stats)
            .finish()
    }
}

impl PlaybackPump {
    /// Create a pump over a demuxer with a selected track and its session
    pub fn new(demuxer: Box<dyn Demuxer>, session: Box<dyn DecodeSession>) -> Self {
        Self {
            demuxer,
            session,
            last_sample_pts_us: 0,
            end_of_stream_signalled: false,
            last_released: None,
            stopped: false,
            stats: PumpStats::default(),
        }
    }

    /// Run one tick at `total_time_ms` since the clock started
    pub fn tick(&mut self, total_time_ms: u64) -> PumpStatus {
        self.last_released = None;
        if self.stopped {
            return PumpStatus::Stopped;
        }

        self.stats.ticks += 1;
        self.stats.last_tick_ms = total_time_ms;

        let started = Instant::now();
        let status = self.step(total_time_ms);
        let work_us = started.elapsed().as_micros() as u64;
        self.stats.tick_work_us += work_us;
        self.stats.max_tick_work_us = self.stats.max_tick_work_us.max(work_us);
        status
    }

    fn step(&mut self, total_time_ms: u64) -> PumpStatus {
        self.feed();

        let next = self.session.peek_next_output();
        let has_sized_output = next.as_ref().is_some_and(OutputDescriptor::has_data);

        if !has_sized_output {
            if self.end_of_stream_signalled {
                info!(
                    "End of stream at {} ms after {} frames",
                    total_time_ms, self.stats.frames_released
                );
                self.stop();
                return PumpStatus::Stopped;
            }
        } else if let Some(output) = next {
            if output.pts_ms() <= total_time_ms {
                if let Some(released) = self.session.release_output(true) {
                    let lateness = total_time_ms - released.pts_ms();
                    self.stats.frames_released += 1;
                    self.stats.max_lateness_ms = self.stats.max_lateness_ms.max(lateness);
                    self.last_released = Some(released);
                    debug!(
                        "Released frame {} at {} ms (due {} ms)",
                        released.index,
                        total_time_ms,
                        released.pts_ms()
                    );
                }
            }
        }

        self.status()
    }

    fn feed(&mut self) {
        if !self.demuxer.is_end_of_stream() {
            let Some(sample) = self.demuxer.read_sample() else {
                return;
            };
            let pts_us = sample.pts_us;
            if self.session.submit(sample) {
                self.stats.samples_submitted += 1;
                self.last_sample_pts_us = pts_us;
                self.demuxer.advance();
            } else {
                self.stats.submissions_refused += 1;
            }
        } else if !self.end_of_stream_signalled {
            let marker = CompressedSample::end_of_stream(self.last_sample_pts_us);
            if self.session.submit(marker) {
                debug!("Signalled end of stream to {}", self.session.codec_name());
                self.end_of_stream_signalled = true;
            } else {
                self.stats.submissions_refused += 1;
            }
        }
    }

    /// Release the session and the demuxer. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.session.stop_and_release();
        self.demuxer.release();
    }

    /// Current status without ticking
    pub fn status(&self) -> PumpStatus {
        if self.stopped {
            PumpStatus::Stopped
        } else if self.end_of_stream_signalled {
            PumpStatus::Draining
        } else {
            PumpStatus::Running
        }
    }

    /// Whether the pump has stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Output released by the most recent tick
    pub fn last_released(&self) -> Option<OutputDescriptor> {
        self.last_released
    }

    /// Pump counters
    pub fn stats(&self) -> PumpStats {
        self.stats.clone()
    }

    /// Decode session counters
    pub fn session_stats(&self) -> DecodeStats {
        self.session.stats()
    }

    /// The demuxer being drained
    pub fn demuxer(&self) -> &dyn Demuxer {
        self.demuxer.as_ref()
    }
}
