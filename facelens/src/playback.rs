//! Playback sessions
//!
//! A playback session owns one [`PlaybackPipeline`] and drives it from a
//! [`Ticker`] on the tokio blocking pool, so a slow demuxer read never
//! stalls the async workers. Pipeline events and detection results are
//! forwarded to the session's [`EventStream`].

use crate::session::{SessionKind, SessionRegistry};
use crate::{Event, EventStream, FaceLens, FaceLensError};
use facelens_core::{IntervalTicker, Ticker};
use facelens_diagnostics::{PipelineReport, PlaybackProfiler};
use facelens_media::{
    AnnexBDemuxerFactory, CameraFacing, DecoderFactory, DefaultDecoderFactory, DemuxerFactory,
    DemuxerRegistry, DetectionFeed, DetectionProcessor, DetectionResult, DetectionStats,
    FaceDetector, GraphicOverlay, MediaError, MediaResult, MediaSource, Mp4DemuxerFactory,
    NullSurface, PipelineEvent, PlaybackPipeline, Size, Surface, VideoFrame,
};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Surface that offers every rendered frame for detection
#[derive(Debug)]
struct DetectingSurface {
    inner: Arc<dyn Surface>,
    feed: DetectionFeed,
}

impl Surface for DetectingSurface {
    fn render(&self, frame: &VideoFrame) -> MediaResult<()> {
        self.inner.render(frame)?;
        self.feed.offer(frame);
        Ok(())
    }

    fn release(&self) {
        self.inner.release();
    }

    fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    fn size(&self) -> Option<Size> {
        self.inner.size()
    }
}

/// Fluent builder for a playback session
pub struct PlaybackBuilder {
    facelens: FaceLens,
    uri: String,
    surface: Option<Arc<dyn Surface>>,
    detector: Option<Arc<dyn FaceDetector>>,
    ticker: Option<Box<dyn Ticker>>,
    demuxer_factory: Option<Arc<dyn DemuxerFactory>>,
    decoder_factory: Option<Arc<dyn DecoderFactory>>,
    view_size: Option<Size>,
    tick_rate_hz: Option<u32>,
    max_pending_outputs: Option<usize>,
}

impl std::fmt::Debug for PlaybackBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackBuilder")
            .field("uri", &self.uri)
            .field("detector", &self.detector.is_some())
            .field("view_size", &self.view_size)
            .finish()
    }
}

impl PlaybackBuilder {
    pub(crate) fn new(facelens: &FaceLens, uri: &str) -> Self {
        Self {
            facelens: facelens.clone(),
            uri: uri.to_string(),
            surface: None,
            detector: None,
            ticker: None,
            demuxer_factory: None,
            decoder_factory: None,
            view_size: None,
            tick_rate_hz: None,
            max_pending_outputs: None,
        }
    }

    /// Render into `surface` instead of discarding frames
    pub fn surface(mut self, surface: Arc<dyn Surface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Run face detection on rendered frames
    pub fn detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Drive playback from `ticker` instead of the display-rate interval
    pub fn ticker(mut self, ticker: Box<dyn Ticker>) -> Self {
        self.ticker = Some(ticker);
        self
    }

    /// Open sources with `factory`
    pub fn demuxer_factory(mut self, factory: Arc<dyn DemuxerFactory>) -> Self {
        self.demuxer_factory = Some(factory);
        self
    }

    /// Build decode sessions with `factory`
    pub fn decoder_factory(mut self, factory: Arc<dyn DecoderFactory>) -> Self {
        self.decoder_factory = Some(factory);
        self
    }

    /// Size of the view the overlay covers
    pub fn view_size(mut self, view_size: Size) -> Self {
        self.view_size = Some(view_size);
        self
    }

    /// Override the configured tick rate
    pub fn tick_rate_hz(mut self, rate_hz: u32) -> Self {
        self.tick_rate_hz = Some(rate_hz);
        self
    }

    /// Override the configured output queue bound
    pub fn max_pending_outputs(mut self, max_pending_outputs: usize) -> Self {
        self.max_pending_outputs = Some(max_pending_outputs);
        self
    }

    /// Start playback in the background
    ///
    /// Track selection happens on the playback task; a source without a
    /// decodable video track shows up as [`Event::NoVideoTrack`] and as the
    /// error returned by [`PlaybackSession::wait`].
    pub async fn start(self) -> Result<PlaybackSession, FaceLensError> {
        let config = self.facelens.config().clone();
        let source = MediaSource::parse(&self.uri)?;
        let runtime = Handle::try_current().map_err(|_| FaceLensError::Initialization {
            reason: "playback must be started inside a tokio runtime".to_string(),
        })?;

        let registry = self.facelens.sessions().clone();
        let info = registry.register(SessionKind::Playback, source.as_str())?;
        let session_id = info.id;

        let player_frame = config.detection.player_frame;
        let overlay = Arc::new(
            GraphicOverlay::new(self.view_size.unwrap_or(player_frame))
                .with_show_only_contour(config.detection.show_only_contour),
        );
        overlay.set_camera_info(player_frame, CameraFacing::Back);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let base_surface: Arc<dyn Surface> = self
            .surface
            .unwrap_or_else(|| Arc::new(NullSurface::new()));

        let (surface, detection): (Arc<dyn Surface>, Option<DetectionProcessor>) =
            match self.detector {
                Some(detector) => {
                    let (processor, results) = match DetectionProcessor::new(detector) {
                        Ok(started) => started,
                        Err(e) => {
                            registry.unregister(session_id);
                            return Err(e.into());
                        }
                    };
                    runtime.spawn(forward_detections(
                        results,
                        overlay.clone(),
                        event_tx.clone(),
                        session_id,
                    ));
                    let feed = DetectionFeed::new(processor.clone(), player_frame);
                    let surface: Arc<dyn Surface> = Arc::new(DetectingSurface {
                        inner: base_surface,
                        feed,
                    });
                    (surface, Some(processor))
                }
                None => (base_surface, None),
            };

        let frame_rate = config.decoder.frame_rate;
        let demuxers = self.demuxer_factory.unwrap_or_else(|| {
            Arc::new(
                DemuxerRegistry::new()
                    .with_factory(Arc::new(Mp4DemuxerFactory::new()))
                    .with_factory(Arc::new(AnnexBDemuxerFactory::new(frame_rate))),
            )
        });
        let max_pending = self
            .max_pending_outputs
            .unwrap_or(config.decoder.max_pending_outputs);
        let decoders = self.decoder_factory.unwrap_or_else(|| {
            Arc::new(DefaultDecoderFactory::new().with_max_pending_outputs(max_pending))
        });
        let rate_hz = self.tick_rate_hz.unwrap_or(config.tick_rate_hz);
        let ticker = self
            .ticker
            .unwrap_or_else(|| Box::new(IntervalTicker::from_rate_hz(rate_hz)));

        let pipeline = PlaybackPipeline::new(source.clone(), demuxers, decoders, surface);
        let forwarder = runtime.spawn(forward_pipeline_events(
            pipeline.subscribe(),
            event_tx.clone(),
            session_id,
        ));

        let stop_signal = Arc::new(Notify::new());
        let playback = PlaybackTask {
            session_id,
            pipeline,
            ticker,
            stop_signal: stop_signal.clone(),
            detection: detection.clone(),
            forwarder,
            event_tx,
            registry,
        };

        let task = tokio::task::spawn_blocking({
            let runtime = runtime.clone();
            move || runtime.block_on(playback.run())
        });

        info!("Started playback session {} for {}", session_id, source);
        Ok(PlaybackSession {
            id: session_id,
            source: source.to_string(),
            events: Some(EventStream::new(event_rx)),
            overlay,
            detection,
            stop_signal,
            task: Some(task),
        })
    }
}

struct PlaybackTask {
    session_id: Uuid,
    pipeline: PlaybackPipeline,
    ticker: Box<dyn Ticker>,
    stop_signal: Arc<Notify>,
    detection: Option<DetectionProcessor>,
    forwarder: JoinHandle<PlaybackProfiler>,
    event_tx: mpsc::UnboundedSender<Event>,
    registry: SessionRegistry,
}

impl PlaybackTask {
    async fn run(self) -> Result<PipelineReport, FaceLensError> {
        let PlaybackTask {
            session_id,
            mut pipeline,
            mut ticker,
            stop_signal,
            detection,
            forwarder,
            event_tx,
            registry,
        } = self;

        let outcome = match pipeline.play() {
            Ok(()) => {
                tokio::select! {
                    result = pipeline.run(ticker.as_mut()) => result.map(|_| ()),
                    _ = stop_signal.notified() => {
                        debug!("Stop requested for session {}", session_id);
                        Ok(())
                    }
                }
            }
            Err(e) => Err(e),
        };

        if outcome.is_ok() {
            // No-op when the stream already ended
            pipeline.stop();
        }

        if let Some(processor) = &detection {
            processor.stop().await;
        }

        let mut report = PipelineReport::from_pipeline(&pipeline);
        drop(pipeline);

        // The forwarder ends once the pipeline's event sender is gone
        match forwarder.await {
            Ok(profiler) => report = report.with_profile(profiler.profile()),
            Err(e) => warn!("Event forwarder for session {} failed: {}", session_id, e),
        }
        if let Some(processor) = &detection {
            report = report.with_detection(processor.stats());
        }

        registry.unregister(session_id);

        match outcome {
            Ok(()) => {
                info!("Session {} finished: {}", session_id, report.summary());
                Ok(report)
            }
            Err(e) => {
                if !matches!(e, MediaError::NoVideoTrack { .. }) {
                    let _ = event_tx.send(Event::SessionError {
                        session_id,
                        error: e.to_string(),
                        user_message: None,
                        recoverable: false,
                    });
                }
                Err(e.into())
            }
        }
    }
}

async fn forward_pipeline_events(
    mut events: broadcast::Receiver<PipelineEvent>,
    event_tx: mpsc::UnboundedSender<Event>,
    session_id: Uuid,
) -> PlaybackProfiler {
    let mut profiler = PlaybackProfiler::default();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Session {} dropped {} pipeline events", session_id, missed);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        profiler.observe(&event);

        let forwarded = match event {
            PipelineEvent::Started { source, track } => Some(Event::PlaybackStarted {
                session_id,
                source,
                track_index: track.index,
            }),
            PipelineEvent::FrameReleased { output, tick_ms } => Some(Event::FrameRendered {
                session_id,
                pts_us: output.pts_us,
                tick_ms,
            }),
            PipelineEvent::NoVideoTrack { source } => {
                Some(Event::NoVideoTrack { session_id, source })
            }
            PipelineEvent::Stopped { reason, stats } => Some(Event::PlaybackFinished {
                session_id,
                reason,
                stats,
            }),
            PipelineEvent::Draining { .. } => None,
        };

        if let Some(event) = forwarded {
            // Nobody listening is fine
            let _ = event_tx.send(event);
        }
    }

    profiler
}

/// Apply detection results to `overlay` and report them as events
pub(crate) async fn forward_detections(
    mut results: mpsc::Receiver<DetectionResult>,
    overlay: Arc<GraphicOverlay>,
    event_tx: mpsc::UnboundedSender<Event>,
    session_id: Uuid,
) {
    while let Some(result) = results.recv().await {
        overlay.apply(&result);
        let _ = event_tx.send(Event::FacesDetected {
            session_id,
            faces: result.faces.len(),
            sequence: result.sequence,
        });
    }
    debug!("Detection results for session {} closed", session_id);
}

/// A running playback
#[derive(Debug)]
pub struct PlaybackSession {
    id: Uuid,
    source: String,
    events: Option<EventStream>,
    overlay: Arc<GraphicOverlay>,
    detection: Option<DetectionProcessor>,
    stop_signal: Arc<Notify>,
    task: Option<JoinHandle<Result<PipelineReport, FaceLensError>>>,
}

impl PlaybackSession {
    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Source being played
    pub fn source(&self) -> &str {
        &self.source
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

    /// Ask playback to stop early. Idempotent.
    pub fn stop(&self) {
        self.stop_signal.notify_one();
    }

    /// Whether the playback task has ended
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for playback to end and get its report
    pub async fn wait(mut self) -> Result<PipelineReport, FaceLensError> {
        let task = self.task.take().ok_or_else(|| FaceLensError::InvalidState {
            expected: "running".to_string(),
            actual: "already awaited".to_string(),
        })?;

        task.await.map_err(|e| FaceLensError::MediaProcessing {
            reason: format!("playback task failed: {}", e),
        })?
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            self.stop();
        }
    }
}
