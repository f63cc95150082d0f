//! Event system for playback and camera sessions

use facelens_media::{PumpStats, Size, StopReason};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Events that can occur during a session
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A track was selected and playback began
    PlaybackStarted {
        /// Session that started
        session_id: Uuid,
        /// Source being played
        source: String,
        /// Index of the selected track
        track_index: usize,
    },
    /// A frame reached the surface
    FrameRendered {
        /// Session that rendered
        session_id: Uuid,
        /// Frame timestamp
        pts_us: u64,
        /// Clock time of the tick that released it
        tick_ms: u64,
    },
    /// Playback ended and resources were released
    PlaybackFinished {
        /// Session that finished
        session_id: Uuid,
        /// Why playback stopped
        reason: StopReason,
        /// Pump counters at the end
        stats: PumpStats,
    },
    /// The source has no track that can be decoded
    NoVideoTrack {
        /// Session that failed
        session_id: Uuid,
        /// Source that was opened
        source: String,
    },
    /// Detection finished on a frame
    FacesDetected {
        /// Session the frame belongs to
        session_id: Uuid,
        /// Number of faces found
        faces: usize,
        /// Position of the frame in detection order
        sequence: u64,
    },
    /// A camera was opened and its preview started
    CameraOpened {
        /// Camera session
        session_id: Uuid,
        /// Camera identifier
        camera_id: String,
        /// Preview size chosen
        preview_size: Size,
    },
    /// The camera was closed
    CameraClosed {
        /// Camera session
        session_id: Uuid,
    },
    /// An error ended or disrupted a session
    SessionError {
        /// Session that failed
        session_id: Uuid,
        /// Error description
        error: String,
        /// Message suitable for the user
        user_message: Option<String>,
        /// Whether the session can continue
        recoverable: bool,
    },
}

impl Event {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::PlaybackStarted { .. } => "playback_started",
            Event::FrameRendered { .. } => "frame_rendered",
            Event::PlaybackFinished { .. } => "playback_finished",
            Event::NoVideoTrack { .. } => "no_video_track",
            Event::FacesDetected { .. } => "faces_detected",
            Event::CameraOpened { .. } => "camera_opened",
            Event::CameraClosed { .. } => "camera_closed",
            Event::SessionError { .. } => "session_error",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            Event::PlaybackStarted { session_id, .. }
            | Event::FrameRendered { session_id, .. }
            | Event::PlaybackFinished { session_id, .. }
            | Event::NoVideoTrack { session_id, .. }
            | Event::FacesDetected { session_id, .. }
            | Event::CameraOpened { session_id, .. }
            | Event::CameraClosed { session_id }
            | Event::SessionError { session_id, .. } => *session_id,
        }
    }

    /// Check if this is a playback-related event
    pub fn is_playback_event(&self) -> bool {
        matches!(
            self,
            Event::PlaybackStarted { .. }
                | Event::FrameRendered { .. }
                | Event::PlaybackFinished { .. }
                | Event::NoVideoTrack { .. }
        )
    }

    /// Check if this is a detection event
    pub fn is_detection_event(&self) -> bool {
        matches!(self, Event::FacesDetected { .. })
    }

    /// Check if this is a camera event
    pub fn is_camera_event(&self) -> bool {
        matches!(self, Event::CameraOpened { .. } | Event::CameraClosed { .. })
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, Event::SessionError { .. } | Event::NoVideoTrack { .. })
    }

    /// Whether no further events follow for the session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::PlaybackFinished { .. }
                | Event::NoVideoTrack { .. }
                | Event::SessionError {
                    recoverable: false,
                    ..
                }
        )
    }
}

/// Stream of session events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<Event>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Event filter for selective event processing
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Whether to include playback events
    pub include_playback_events: bool,
    /// Whether to include detection events
    pub include_detection_events: bool,
    /// Whether to include camera events
    pub include_camera_events: bool,
    /// Whether to include error events
    pub include_error_events: bool,
    /// Specific event types to include (if specified, overrides other filters)
    pub specific_event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a filter that includes all events
    pub fn all() -> Self {
        Self {
            include_playback_events: true,
            include_detection_events: true,
            include_camera_events: true,
            include_error_events: true,
            specific_event_types: None,
        }
    }

    /// Create a filter that drops per-frame events
    pub fn lifecycle_only() -> Self {
        Self::specific(vec![
            "playback_started".to_string(),
            "playback_finished".to_string(),
            "no_video_track".to_string(),
            "camera_opened".to_string(),
            "camera_closed".to_string(),
            "session_error".to_string(),
        ])
    }

    /// Create a filter that includes only detection events
    pub fn detection_only() -> Self {
        Self {
            include_playback_events: false,
            include_detection_events: true,
            include_camera_events: false,
            include_error_events: false,
            specific_event_types: None,
        }
    }

    /// Create a filter for specific event types
    pub fn specific(event_types: Vec<String>) -> Self {
        Self {
            include_playback_events: false,
            include_detection_events: false,
            include_camera_events: false,
            include_error_events: false,
            specific_event_types: Some(event_types),
        }
    }

    /// Check if an event should be included based on this filter
    pub fn should_include(&self, event: &Event) -> bool {
        if let Some(ref specific_types) = self.specific_event_types {
            return specific_types.iter().any(|t| t == event.event_type());
        }

        (self.include_playback_events && event.is_playback_event())
            || (self.include_detection_events && event.is_detection_event())
            || (self.include_camera_events && event.is_camera_event())
            || (self.include_error_events && event.is_error_event())
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Event stream that only yields events matching a filter
#[derive(Debug)]
pub struct FilteredEventStream {
    stream: EventStream,
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Create a new filtered event stream
    pub fn new(stream: EventStream, filter: EventFilter) -> Self {
        Self { stream, filter }
    }

    /// Get the next event that matches the filter
    pub async fn next(&mut self) -> Option<Event> {
        while let Some(event) = self.stream.next().await {
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Update the filter
    pub fn set_filter(&mut self, filter: EventFilter) {
        self.filter = filter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(session_id: Uuid) -> Event {
        Event::FrameRendered {
            session_id,
            pts_us: 33_000,
            tick_ms: 40,
        }
    }

    #[test]
    fn test_event_classification() {
        let id = Uuid::new_v4();
        assert!(frame(id).is_playback_event());
        assert!(!frame(id).is_terminal());
        assert_eq!(frame(id).session_id(), id);

        let missing = Event::NoVideoTrack {
            session_id: id,
            source: "memory://clip".to_string(),
        };
        assert!(missing.is_error_event());
        assert!(missing.is_terminal());

        let camera_error = Event::SessionError {
            session_id: id,
            error: "Cannot access the camera 1".to_string(),
            user_message: Some("Cannot access the camera.".to_string()),
            recoverable: false,
        };
        assert!(camera_error.is_terminal());
        assert!(Event::CameraClosed { session_id: id }.is_camera_event());
    }

    #[test]
    fn test_event_filter() {
        let id = Uuid::new_v4();
        let detected = Event::FacesDetected {
            session_id: id,
            faces: 2,
            sequence: 0,
        };

        assert!(EventFilter::all().should_include(&frame(id)));
        assert!(EventFilter::detection_only().should_include(&detected));
        assert!(!EventFilter::detection_only().should_include(&frame(id)));
        assert!(!EventFilter::lifecycle_only().should_include(&frame(id)));
        assert!(EventFilter::lifecycle_only().should_include(&Event::CameraClosed { session_id: id }));
    }

    #[tokio::test]
    async fn test_filtered_event_stream() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = FilteredEventStream::new(EventStream::new(rx), EventFilter::lifecycle_only());
        let id = Uuid::new_v4();

        tx.send(frame(id)).unwrap();
        tx.send(Event::CameraClosed { session_id: id }).unwrap();
        drop(tx);

        assert_eq!(
            stream.next().await.map(|e| e.event_type()),
            Some("camera_closed")
        );
        assert!(stream.next().await.is_none());
    }
}
