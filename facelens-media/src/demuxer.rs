//! Demuxers split a source into per-track compressed samples
//!
//! The demuxer keeps a cursor on the current sample of the selected track.
//! [`Demuxer::read_sample`] never moves the cursor; only
//! [`Demuxer::advance`] does, so a sample the decoder refused can be read
//! again on the next tick.

use crate::error::{MediaError, MediaResult};
use crate::tracks::{
    CompressedSample, SampleFlags, SourceTrack, TrackFormat, MIME_VIDEO_AVC, MIME_VIDEO_RAW,
};
use bytes::Bytes;
use std::path::Path;
use tracing::{debug, info};

/// Splits a container into compressed samples
pub trait Demuxer: Send {
    /// Number of tracks in the source
    fn track_count(&self) -> usize;

    /// Format of the track at `index`
    fn track_format(&self, index: usize) -> Option<TrackFormat>;

    /// All tracks in index order
    fn tracks(&self) -> Vec<SourceTrack> {
        (0..self.track_count())
            .filter_map(|index| {
                self.track_format(index)
                    .map(|format| SourceTrack { index, format })
            })
            .collect()
    }

    /// Make `index` the track samples are read from
    fn select_track(&mut self, index: usize) -> MediaResult<()>;

    /// Stop reading from `index`
    fn unselect_track(&mut self, index: usize);

    /// Currently selected track
    fn selected_track(&self) -> Option<usize>;

    /// Flags of the current sample; `END_OF_STREAM` once no sample is left
    fn sample_flags(&self) -> SampleFlags;

    /// Presentation timestamp of the current sample
    fn sample_time_us(&self) -> Option<u64>;

    /// Read the current sample without moving the cursor
    fn read_sample(&mut self) -> Option<CompressedSample>;

    /// Move to the next sample. Returns `false` when there is none.
    fn advance(&mut self) -> bool;

    /// Release underlying resources. Further reads return nothing.
    fn release(&mut self);

    /// Whether [`Demuxer::release`] has been called
    fn is_released(&self) -> bool;

    /// Whether the cursor is past the last sample
    fn is_end_of_stream(&self) -> bool {
        self.sample_flags().is_end_of_stream()
    }
}

#[derive(Debug, Clone)]
struct MemoryTrack {
    format: TrackFormat,
    samples: Vec<CompressedSample>,
}

/// Demuxer over samples held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDemuxer {
    tracks: Vec<MemoryTrack>,
    selected: Option<usize>,
    position: usize,
    released: bool,
}

impl MemoryDemuxer {
    /// Create a demuxer without tracks
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track with its samples
    pub fn with_track(mut self, format: TrackFormat, samples: Vec<CompressedSample>) -> Self {
        self.tracks.push(MemoryTrack { format, samples });
        self
    }

    /// Add a raw video track with one frame per timestamp
    ///
    /// Each frame is a solid RGBA image whose bytes encode the frame index.
    pub fn with_raw_video(self, width: u32, height: u32, timestamps_ms: &[u64]) -> Self {
        let frame_size = width as usize * height as usize * 4;
        let samples = timestamps_ms
            .iter()
            .enumerate()
            .map(|(i, ms)| {
                CompressedSample::new(
                    vec![(i % 256) as u8; frame_size],
                    ms * 1000,
                    SampleFlags::KEY_FRAME,
                )
            })
            .collect();
        self.with_track(
            TrackFormat::video(MIME_VIDEO_RAW, width, height),
            samples,
        )
    }

    /// Index of the current sample within the selected track
    pub fn position(&self) -> usize {
        self.position
    }

    fn current(&self) -> Option<&CompressedSample> {
        if self.released {
            return None;
        }
        let track = self.tracks.get(self.selected?)?;
        track.samples.get(self.position)
    }
}

impl Demuxer for MemoryDemuxer {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Option<TrackFormat> {
        self.tracks.get(index).map(|track| track.format.clone())
    }

    fn select_track(&mut self, index: usize) -> MediaResult<()> {
        if index >= self.tracks.len() {
            return Err(MediaError::InvalidState {
                message: format!(
                    "Track {} out of range ({} tracks)",
                    index,
                    self.tracks.len()
                ),
            });
        }
        self.selected = Some(index);
        self.position = 0;
        Ok(())
    }

    fn unselect_track(&mut self, index: usize) {
        if self.selected == Some(index) {
            self.selected = None;
        }
    }

    fn selected_track(&self) -> Option<usize> {
        self.selected
    }

    fn sample_flags(&self) -> SampleFlags {
        match self.current() {
            Some(sample) => sample.flags,
            None => SampleFlags::END_OF_STREAM,
        }
    }

    fn sample_time_us(&self) -> Option<u64> {
        self.current().map(|sample| sample.pts_us)
    }

    fn read_sample(&mut self) -> Option<CompressedSample> {
        self.current().cloned()
    }

    fn advance(&mut self) -> bool {
        if self.current().is_none() {
            return false;
        }
        self.position += 1;
        self.current().is_some()
    }

    fn release(&mut self) {
        if !self.released {
            debug!("Released memory demuxer at sample {}", self.position);
        }
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

/// Demuxer for raw H.264 Annex-B elementary streams (`.h264`, `.264`)
///
/// The stream is split into access units at start codes. A stream carries no
/// timing, so timestamps are derived from the configured frame rate.
#[derive(Debug, Clone)]
pub struct AnnexBDemuxer {
    format: TrackFormat,
    access_units: Vec<CompressedSample>,
    selected: bool,
    position: usize,
    released: bool,
}

const NAL_SLICE: u8 = 1;
const NAL_IDR_SLICE: u8 = 5;
const NAL_SEI: u8 = 6;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;
const NAL_AUD: u8 = 9;

impl AnnexBDemuxer {
    /// Read and split a file
    pub fn open(path: &Path, frame_rate: f32) -> MediaResult<Self> {
        let data = std::fs::read(path)?;
        info!(
            "Opened Annex-B stream {} ({} bytes)",
            path.display(),
            data.len()
        );
        Self::from_bytes(Bytes::from(data), frame_rate)
    }

    /// Split an in-memory stream
    pub fn from_bytes(data: Bytes, frame_rate: f32) -> MediaResult<Self> {
        if frame_rate.is_nan() || frame_rate <= 0.0 {
            return Err(MediaError::InvalidConfiguration {
                message: format!("Frame rate must be positive, got {}", frame_rate),
            });
        }

        let frame_duration_us = (1_000_000.0 / frame_rate as f64) as u64;
        let access_units: Vec<CompressedSample> = split_access_units(&data)
            .into_iter()
            .enumerate()
            .map(|(i, (range, is_idr))| {
                let flags = if is_idr {
                    SampleFlags::KEY_FRAME
                } else {
                    SampleFlags::NONE
                };
                CompressedSample::new(data.slice(range), i as u64 * frame_duration_us, flags)
            })
            .collect();

        if access_units.is_empty() {
            return Err(MediaError::UnsupportedFormat {
                format: "no H.264 access units found".to_string(),
            });
        }

        let format = TrackFormat::video(MIME_VIDEO_AVC, 0, 0)
            .with_frame_rate(frame_rate)
            .with_duration_us(access_units.len() as u64 * frame_duration_us);

        debug!("Split Annex-B stream into {} access units", access_units.len());

        Ok(Self {
            format,
            access_units,
            selected: false,
            position: 0,
            released: false,
        })
    }

    /// Number of access units in the stream
    pub fn access_unit_count(&self) -> usize {
        self.access_units.len()
    }

    fn current(&self) -> Option<&CompressedSample> {
        if self.released || !self.selected {
            return None;
        }
        self.access_units.get(self.position)
    }
}

impl Demuxer for AnnexBDemuxer {
    fn track_count(&self) -> usize {
        1
    }

    fn track_format(&self, index: usize) -> Option<TrackFormat> {
        (index == 0).then(|| self.format.clone())
    }

    fn select_track(&mut self, index: usize) -> MediaResult<()> {
        if index != 0 {
            return Err(MediaError::InvalidState {
                message: format!("Track {} out of range (1 track)", index),
            });
        }
        self.selected = true;
        self.position = 0;
        Ok(())
    }

    fn unselect_track(&mut self, index: usize) {
        if index == 0 {
            self.selected = false;
        }
    }

    fn selected_track(&self) -> Option<usize> {
        self.selected.then_some(0)
    }

    fn sample_flags(&self) -> SampleFlags {
        match self.current() {
            Some(sample) => sample.flags,
            None => SampleFlags::END_OF_STREAM,
        }
    }

    fn sample_time_us(&self) -> Option<u64> {
        self.current().map(|sample| sample.pts_us)
    }

    fn read_sample(&mut self) -> Option<CompressedSample> {
        self.current().cloned()
    }

    fn advance(&mut self) -> bool {
        if self.current().is_none() {
            return false;
        }
        self.position += 1;
        self.current().is_some()
    }

    fn release(&mut self) {
        self.released = true;
        self.access_units.clear();
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

/// Find NAL unit start offsets (position of the first byte after the start code)
/// together with the offset of the start code itself
fn find_nal_units(data: &[u8]) -> Vec<(usize, usize)> {
    let mut units = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let code_start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            units.push((code_start, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }
    units
}

/// Whether an Annex-B buffer carries at least one coded slice
pub(crate) fn contains_slice(data: &[u8]) -> bool {
    find_nal_units(data).into_iter().any(|(_, payload_start)| {
        data.get(payload_start)
            .is_some_and(|header| (NAL_SLICE..=NAL_IDR_SLICE).contains(&(header & 0x1f)))
    })
}

/// Group NAL units into access units. Returns byte ranges and whether each
/// unit contains an IDR slice.
fn split_access_units(data: &[u8]) -> Vec<(std::ops::Range<usize>, bool)> {
    let nals = find_nal_units(data);
    let mut units = Vec::new();

    let mut au_start: Option<usize> = None;
    let mut au_has_slice = false;
    let mut au_is_idr = false;

    for (n, &(code_start, payload_start)) in nals.iter().enumerate() {
        let Some(&header) = data.get(payload_start) else {
            continue;
        };
        let nal_type = header & 0x1f;
        let is_slice = nal_type == NAL_SLICE || nal_type == NAL_IDR_SLICE;

        // first_mb_in_slice == 0 is coded as a single '1' bit
        let first_slice_of_picture =
            is_slice && data.get(payload_start + 1).is_some_and(|b| b & 0x80 != 0);
        let starts_new_unit = matches!(nal_type, NAL_AUD | NAL_SPS | NAL_PPS | NAL_SEI)
            || first_slice_of_picture;

        if au_has_slice && starts_new_unit {
            if let Some(start) = au_start.take() {
                units.push((start..code_start, au_is_idr));
            }
            au_has_slice = false;
            au_is_idr = false;
        }

        if au_start.is_none() {
            au_start = Some(code_start);
        }
        au_has_slice |= is_slice;
        au_is_idr |= nal_type == NAL_IDR_SLICE;

        if n + 1 == nals.len() && au_has_slice {
            if let Some(start) = au_start.take() {
                units.push((start..data.len(), au_is_idr));
            }
        }
    }

    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nal(nal_type: u8, first_slice: bool) -> Vec<u8> {
        let mut unit = vec![0, 0, 0, 1, 0x60 | nal_type];
        unit.push(if first_slice { 0x88 } else { 0x08 });
        unit.extend_from_slice(&[0xAB, 0xCD]);
        unit
    }

    fn stream() -> Bytes {
        let mut data = Vec::new();
        data.extend(nal(NAL_SPS, false));
        data.extend(nal(NAL_PPS, false));
        data.extend(nal(NAL_IDR_SLICE, true));
        data.extend(nal(NAL_SLICE, true));
        data.extend(nal(NAL_SLICE, false));
        data.extend(nal(NAL_SLICE, true));
        Bytes::from(data)
    }

    #[test]
    fn test_memory_demuxer_cursor() {
        let mut demuxer = MemoryDemuxer::new().with_raw_video(2, 2, &[0, 33, 66]);
        assert_eq!(demuxer.track_count(), 1);
        assert!(demuxer.is_end_of_stream(), "nothing selected yet");

        demuxer.select_track(0).unwrap();
        assert_eq!(demuxer.sample_time_us(), Some(0));

        // Reading does not move the cursor
        let first = demuxer.read_sample().unwrap();
        assert_eq!(demuxer.read_sample().unwrap(), first);

        assert!(demuxer.advance());
        assert_eq!(demuxer.sample_time_us(), Some(33_000));
        assert!(demuxer.advance());
        assert!(!demuxer.advance());
        assert!(demuxer.is_end_of_stream());
        assert_eq!(demuxer.position(), 3);
    }

    #[test]
    fn test_memory_demuxer_release() {
        let mut demuxer = MemoryDemuxer::new().with_raw_video(2, 2, &[0]);
        demuxer.select_track(0).unwrap();
        demuxer.release();
        assert!(demuxer.is_released());
        assert!(demuxer.read_sample().is_none());
        assert!(demuxer.select_track(3).is_err());
    }

    #[test]
    fn test_annexb_access_units() {
        let demuxer = AnnexBDemuxer::from_bytes(stream(), 25.0).unwrap();
        // SPS+PPS+IDR, slice+slice (same picture), slice
        assert_eq!(demuxer.access_unit_count(), 3);

        let format = demuxer.track_format(0).unwrap();
        assert_eq!(format.mime, MIME_VIDEO_AVC);
        assert_eq!(format.duration_us, Some(120_000));
    }

    #[test]
    fn test_annexb_timestamps_and_flags() {
        let mut demuxer = AnnexBDemuxer::from_bytes(stream(), 25.0).unwrap();
        demuxer.select_track(0).unwrap();

        let first = demuxer.read_sample().unwrap();
        assert!(first.flags.is_key_frame());
        assert_eq!(first.pts_us, 0);
        assert_eq!(&first.data[..4], &[0, 0, 0, 1]);

        demuxer.advance();
        let second = demuxer.read_sample().unwrap();
        assert!(!second.flags.is_key_frame());
        assert_eq!(second.pts_us, 40_000);
    }

    #[test]
    fn test_contains_slice() {
        assert!(contains_slice(&stream()));
        let mut headers = nal(NAL_SPS, false);
        headers.extend(nal(NAL_PPS, false));
        assert!(!contains_slice(&headers));
        assert!(!contains_slice(b""));
    }

    #[test]
    fn test_annexb_rejects_garbage() {
        assert!(AnnexBDemuxer::from_bytes(Bytes::from_static(b"not h264"), 30.0).is_err());
        assert!(AnnexBDemuxer::from_bytes(stream(), 0.0).is_err());
    }
}
