//! Picks the track a pipeline will play

use crate::decoder::{DecodeSession, DecoderFactory};
use crate::demuxer::Demuxer;
use crate::surface::Surface;
use crate::tracks::SourceTrack;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The track chosen for playback and the session that decodes it
pub struct Selection {
    /// Selected track
    pub track: SourceTrack,
    /// Session bound to the target surface
    pub session: Box<dyn DecodeSession>,
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("track", &self.track)
            .field("codec", &self.session.codec_name())
            .finish()
    }
}

/// Selects the first track a decoder can be built for
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackSelector;

impl TrackSelector {
    /// Deselect every track, then select the first one in index order for
    /// which `factory` yields a session bound to `surface`
    ///
    /// Returns `None` when no track is decodable; the demuxer is left with
    /// nothing selected.
    pub fn select(
        demuxer: &mut dyn Demuxer,
        factory: &dyn DecoderFactory,
        surface: Arc<dyn Surface>,
    ) -> Option<Selection> {
        let track_count = demuxer.track_count();
        for index in 0..track_count {
            demuxer.unselect_track(index);
        }

        for track in demuxer.tracks() {
            let Some(session) = factory.from_video_format(&track.format, surface.clone()) else {
                debug!("Track {} ({}) is not decodable", track.index, track.format.mime);
                continue;
            };

            if let Err(e) = demuxer.select_track(track.index) {
                // Dropped without stop_and_release: the surface stays usable
                warn!("Failed to select track {}: {}", track.index, e);
                drop(session);
                continue;
            }

            info!(
                "Selected track {} ({}, {}x{}) with {} decoder",
                track.index,
                track.format.mime,
                track.format.width,
                track.format.height,
                session.codec_name()
            );
            return Some(Selection { track, session });
        }

        info!("No decodable video track among {} tracks", track_count);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DefaultDecoderFactory;
    use crate::demuxer::MemoryDemuxer;
    use crate::surface::FrameSinkSurface;
    use crate::tracks::{CompressedSample, SampleFlags, TrackFormat};

    #[test]
    fn test_selects_first_decodable_track() {
        let mut demuxer = MemoryDemuxer::new()
            .with_track(
                TrackFormat::audio("audio/mp4a-latm"),
                vec![CompressedSample::new(vec![1u8], 0, SampleFlags::NONE)],
            )
            .with_raw_video(2, 2, &[0, 33])
            .with_raw_video(4, 4, &[0]);

        let selection = TrackSelector::select(
            &mut demuxer,
            &DefaultDecoderFactory::new(),
            Arc::new(FrameSinkSurface::new()),
        )
        .unwrap();

        assert_eq!(selection.track.index, 1);
        assert_eq!(demuxer.selected_track(), Some(1));
    }

    #[test]
    fn test_no_video_track_yields_none() {
        let mut demuxer = MemoryDemuxer::new().with_track(
            TrackFormat::audio("audio/opus"),
            vec![CompressedSample::new(vec![1u8], 0, SampleFlags::NONE)],
        );

        let selection = TrackSelector::select(
            &mut demuxer,
            &DefaultDecoderFactory::new(),
            Arc::new(FrameSinkSurface::new()),
        );

        assert!(selection.is_none());
        assert_eq!(demuxer.selected_track(), None);
    }

    #[test]
    fn test_empty_source_yields_none() {
        let mut demuxer = MemoryDemuxer::new();
        assert!(TrackSelector::select(
            &mut demuxer,
            &DefaultDecoderFactory::new(),
            Arc::new(FrameSinkSurface::new()),
        )
        .is_none());
    }
}
