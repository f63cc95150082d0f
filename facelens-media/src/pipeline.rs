//! Playback pipeline: source → track selection → decode session → surface
//!
//! One [`PlaybackPipeline`] plays one source into one surface, paced by a
//! [`Ticker`]. The state machine is
//!
//! ```text
//! Idle → Selecting → Running → Draining → Stopped
//!          │                                 ▲
//!          └── no decodable track → Idle     │ stop() from any state
//! ```
//!
//! A pipeline is single-use: once stopped it cannot be played again, and
//! `play()` while already selecting, running or draining is rejected.

use crate::decoder::{DecodeStats, DecoderFactory};
use crate::error::{MediaError, MediaResult};
use crate::pump::{PlaybackPump, PumpStats, PumpStatus};
use crate::selector::TrackSelector;
use crate::source::{DemuxerFactory, MediaSource};
use crate::surface::Surface;
use crate::tracks::{OutputDescriptor, SourceTrack};
use facelens_core::Ticker;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the pipeline event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle state of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// Created, not started
    Idle,
    /// Probing tracks for a decoder
    Selecting,
    /// Feeding samples and presenting frames
    Running,
    /// End of stream signalled, presenting the remaining frames
    Draining,
    /// Released; terminal
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "Idle",
            PipelineState::Selecting => "Selecting",
            PipelineState::Running => "Running",
            PipelineState::Draining => "Draining",
            PipelineState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// Why a pipeline stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Every frame was presented
    EndOfStream,
    /// `stop()` was called
    Requested,
    /// The clock ended before the stream did
    ClockEnded,
}

/// Events emitted by a pipeline
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A track was selected and playback began
    Started {
        /// Source being played
        source: String,
        /// Selected track
        track: SourceTrack,
    },
    /// A frame was released to the surface
    FrameReleased {
        /// The released output
        output: OutputDescriptor,
        /// Tick time that released it
        tick_ms: u64,
    },
    /// End of stream was signalled to the decoder
    Draining {
        /// Tick time
        tick_ms: u64,
    },
    /// No track of the source could be decoded
    NoVideoTrack {
        /// Source URI
        source: String,
    },
    /// The pipeline released its resources
    Stopped {
        /// Why it stopped
        reason: StopReason,
        /// Pump counters at the time of stopping
        stats: PumpStats,
    },
}

/// Plays one source into one surface
pub struct PlaybackPipeline {
    source: MediaSource,
    demuxer_factory: Arc<dyn DemuxerFactory>,
    decoder_factory: Arc<dyn DecoderFactory>,
    surface: Arc<dyn Surface>,
    state: PipelineState,
    track: Option<SourceTrack>,
    pump: Option<PlaybackPump>,
    final_stats: Option<PumpStats>,
    event_tx: broadcast::Sender<PipelineEvent>,
}

impl fmt::Debug for PlaybackPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackPipeline")
            .field("source", &self.source.as_str())
            .field("state", &self.state)
            .field("track", &self.track)
            .finish()
    }
}

impl PlaybackPipeline {
    /// Create an idle pipeline
    pub fn new(
        source: MediaSource,
        demuxer_factory: Arc<dyn DemuxerFactory>,
        decoder_factory: Arc<dyn DecoderFactory>,
        surface: Arc<dyn Surface>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            source,
            demuxer_factory,
            decoder_factory,
            surface,
            state: PipelineState::Idle,
            track: None,
            pump: None,
            final_stats: None,
            event_tx,
        }
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Source being played
    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    /// Selected track, once playing
    pub fn track(&self) -> Option<&SourceTrack> {
        self.track.as_ref()
    }

    /// Pump counters
    pub fn stats(&self) -> PumpStats {
        match (&self.pump, &self.final_stats) {
            (Some(pump), _) => pump.stats(),
            (None, Some(stats)) => stats.clone(),
            (None, None) => PumpStats::default(),
        }
    }

    /// Decode session counters
    pub fn session_stats(&self) -> DecodeStats {
        self.pump
            .as_ref()
            .map(PlaybackPump::session_stats)
            .unwrap_or_default()
    }

    /// Open the source and select a track
    ///
    /// Fails with [`MediaError::NoVideoTrack`] when no track can be decoded,
    /// leaving the pipeline idle.
    pub fn play(&mut self) -> MediaResult<()> {
        if self.state != PipelineState::Idle {
            return Err(MediaError::InvalidState {
                message: format!("play() while {}", self.state),
            });
        }

        self.state = PipelineState::Selecting;
        debug!("Selecting track of {}", self.source);

        let mut demuxer = match self.demuxer_factory.open(&self.source) {
            Ok(demuxer) => demuxer,
            Err(e) => {
                self.state = PipelineState::Idle;
                return Err(e);
            }
        };

        let selection = TrackSelector::select(
            demuxer.as_mut(),
            self.decoder_factory.as_ref(),
            self.surface.clone(),
        );

        let Some(selection) = selection else {
            demuxer.release();
            self.state = PipelineState::Idle;
            warn!("No decodable video track in {}", self.source);
            self.emit(PipelineEvent::NoVideoTrack {
                source: self.source.to_string(),
            });
            return Err(MediaError::NoVideoTrack {
                source_uri: self.source.to_string(),
            });
        };

        info!("Playing {} from track {}", self.source, selection.track.index);
        self.emit(PipelineEvent::Started {
            source: self.source.to_string(),
            track: selection.track.clone(),
        });
        self.track = Some(selection.track);
        self.pump = Some(PlaybackPump::new(demuxer, selection.session));
        self.state = PipelineState::Running;
        Ok(())
    }

    /// Advance playback to `total_time_ms`
    ///
    /// Ticks outside `Running`/`Draining` have no effect.
    pub fn tick(&mut self, total_time_ms: u64) -> PipelineState {
        let Some(pump) = self.pump.as_mut() else {
            return self.state;
        };

        let status = pump.tick(total_time_ms);
        let released = pump.last_released();

        if let Some(output) = released {
            self.emit(PipelineEvent::FrameReleased {
                output,
                tick_ms: total_time_ms,
            });
        }

        match status {
            PumpStatus::Running => {}
            PumpStatus::Draining => {
                if self.state == PipelineState::Running {
                    self.state = PipelineState::Draining;
                    self.emit(PipelineEvent::Draining {
                        tick_ms: total_time_ms,
                    });
                }
            }
            PumpStatus::Stopped => self.finish(StopReason::EndOfStream),
        }

        self.state
    }

    /// Drive the pipeline from `ticker` until it stops or the ticker ends
    ///
    /// Starts playback first when the pipeline is idle. Ends the ticker once
    /// the stream is done, and stops the pipeline if the ticker ends first.
    pub async fn run(&mut self, ticker: &mut dyn Ticker) -> MediaResult<PumpStats> {
        if self.state == PipelineState::Idle {
            self.play()?;
        }

        while !self.is_finished() {
            let Some(tick) = ticker.next_tick().await else {
                break;
            };
            if self.tick(tick.total_ms) == PipelineState::Stopped {
                ticker.end();
            }
        }

        if !self.is_finished() {
            info!("Clock ended before end of stream for {}", self.source);
            self.teardown(StopReason::ClockEnded);
        }

        Ok(self.stats())
    }

    /// Release everything. Valid from any state; a stopped pipeline stays stopped.
    pub fn stop(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.teardown(StopReason::Requested);
    }

    /// Whether the pipeline reached `Stopped`
    pub fn is_finished(&self) -> bool {
        self.state == PipelineState::Stopped
    }

    fn teardown(&mut self, reason: StopReason) {
        if let Some(pump) = self.pump.as_mut() {
            pump.stop();
        }
        self.finish(reason);
    }

    fn finish(&mut self, reason: StopReason) {
        let stats = self.stats();
        self.final_stats = Some(stats.clone());
        self.pump = None;
        self.state = PipelineState::Stopped;
        info!(
            "Pipeline for {} stopped ({:?}): {} frames released, max lateness {} ms",
            self.source, reason, stats.frames_released, stats.max_lateness_ms
        );
        self.emit(PipelineEvent::Stopped { reason, stats });
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
