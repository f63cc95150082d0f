//! MP4 / QuickTime demuxer
//!
//! The whole file is read into memory and its `moov` box decoded with
//! `mp4-atom`. Every track gets a sample table built from `stsz`, `stsc`,
//! `stco`/`co64`, `stts`, `ctts` and `stss`; sample payloads are slices of
//! the file buffer.
//!
//! H.264 samples are stored length-prefixed. They are rewritten to Annex-B
//! when read, with the parameter sets from `avcC` in front of every sync
//! sample, so the decoder sees the same byte stream as from a `.h264` file.

use crate::demuxer::Demuxer;
use crate::error::{MediaError, MediaResult};
use crate::tracks::{CompressedSample, SampleFlags, TrackFormat, MIME_VIDEO_AVC};
use bytes::{Bytes, BytesMut};
use mp4_atom::{Atom, Avcc, Codec, DecodeMaybe, FourCC, Header, Moov, Stbl, StszSamples, Trak};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info, warn};

const ANNEX_B_START_CODE: [u8; 4] = [0, 0, 0, 1];

const HANDLER_VIDEO: FourCC = FourCC::new(b"vide");
const HANDLER_SOUND: FourCC = FourCC::new(b"soun");

#[derive(Debug, Clone)]
struct Mp4Sample {
    range: Range<usize>,
    pts_us: u64,
    flags: SampleFlags,
}

/// Length-prefixed H.264 layout of a track
#[derive(Debug, Clone)]
struct AvcLayout {
    length_size: usize,
    /// SPS and PPS, each behind a start code
    parameter_sets: Bytes,
}

impl AvcLayout {
    fn new(avcc: &Avcc) -> Self {
        let mut parameter_sets = BytesMut::new();
        for nal in avcc
            .sequence_parameter_sets
            .iter()
            .chain(&avcc.picture_parameter_sets)
        {
            parameter_sets.extend_from_slice(&ANNEX_B_START_CODE);
            parameter_sets.extend_from_slice(nal);
        }
        Self {
            length_size: usize::from(avcc.length_size.clamp(1, 4)),
            parameter_sets: parameter_sets.freeze(),
        }
    }

    fn to_annex_b(&self, payload: &[u8], sync: bool) -> Bytes {
        let mut out = BytesMut::with_capacity(payload.len() + self.parameter_sets.len() + 16);
        if sync {
            out.extend_from_slice(&self.parameter_sets);
        }

        let mut rest = payload;
        while rest.len() > self.length_size {
            let (prefix, tail) = rest.split_at(self.length_size);
            let len = prefix
                .iter()
                .fold(0usize, |len, &byte| (len << 8) | usize::from(byte));
            if len > tail.len() {
                warn!("NAL unit of {} bytes overruns its {} byte sample", len, payload.len());
                break;
            }
            out.extend_from_slice(&ANNEX_B_START_CODE);
            out.extend_from_slice(&tail[..len]);
            rest = &tail[len..];
        }
        out.freeze()
    }
}

#[derive(Debug, Clone)]
struct Mp4Track {
    format: TrackFormat,
    samples: Vec<Mp4Sample>,
    avc: Option<AvcLayout>,
}

/// Demuxer for ISO base media files (`.mp4`, `.m4v`, `.mov`, `.3gp`)
#[derive(Debug, Clone)]
pub struct Mp4Demuxer {
    data: Bytes,
    tracks: Vec<Mp4Track>,
    selected: Option<usize>,
    position: usize,
    released: bool,
}

impl Mp4Demuxer {
    /// Read and index a file
    pub fn open(path: &Path) -> MediaResult<Self> {
        let data = std::fs::read(path)?;
        info!("Opened MP4 file {} ({} bytes)", path.display(), data.len());
        Self::from_bytes(Bytes::from(data))
    }

    /// Index an in-memory file
    pub fn from_bytes(data: Bytes) -> MediaResult<Self> {
        let moov = find_moov(&data)?;
        let tracks = moov
            .trak
            .iter()
            .map(|trak| read_track(trak, data.len()))
            .collect::<MediaResult<Vec<_>>>()?;

        for (index, track) in tracks.iter().enumerate() {
            debug!(
                "MP4 track {}: {} {}x{}, {} samples",
                index,
                track.format.mime,
                track.format.width,
                track.format.height,
                track.samples.len()
            );
        }

        Ok(Self {
            data,
            tracks,
            selected: None,
            position: 0,
            released: false,
        })
    }

    /// Number of samples in the track at `index`
    pub fn sample_count(&self, index: usize) -> Option<usize> {
        self.tracks.get(index).map(|track| track.samples.len())
    }

    fn current(&self) -> Option<(&Mp4Track, &Mp4Sample)> {
        if self.released {
            return None;
        }
        let track = self.tracks.get(self.selected?)?;
        track.samples.get(self.position).map(|sample| (track, sample))
    }
}

impl Demuxer for Mp4Demuxer {
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
            Some((_, sample)) => sample.flags,
            None => SampleFlags::END_OF_STREAM,
        }
    }

    fn sample_time_us(&self) -> Option<u64> {
        self.current().map(|(_, sample)| sample.pts_us)
    }

    fn read_sample(&mut self) -> Option<CompressedSample> {
        let (track, sample) = self.current()?;
        let payload = self.data.slice(sample.range.clone());
        let data = match &track.avc {
            Some(avc) => avc.to_annex_b(&payload, sample.flags.is_key_frame()),
            None => payload,
        };
        Some(CompressedSample::new(data, sample.pts_us, sample.flags))
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
            debug!("Released MP4 demuxer at sample {}", self.position);
        }
        self.released = true;
        self.tracks.clear();
        self.data = Bytes::new();
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

fn malformed(reason: impl std::fmt::Display) -> MediaError {
    MediaError::UnsupportedFormat {
        format: format!("malformed MP4: {}", reason),
    }
}

/// Walk the top-level boxes up to `moov`
fn find_moov(data: &[u8]) -> MediaResult<Moov> {
    let mut rest = data;
    while let Some(header) = Header::decode_maybe(&mut rest).map_err(malformed)? {
        let size = header.size.unwrap_or(rest.len());
        if size > rest.len() {
            return Err(malformed(format!("{} box overruns the file", header.kind)));
        }
        let (mut body, tail) = rest.split_at(size);
        if header.kind == Moov::KIND {
            return Moov::decode_body(&mut body).map_err(malformed);
        }
        rest = tail;
    }
    Err(malformed("no moov box"))
}

fn read_track(trak: &Trak, file_len: usize) -> MediaResult<Mp4Track> {
    let mdia = &trak.mdia;
    let timescale = u64::from(mdia.mdhd.timescale.max(1));
    let (format, avc) = describe(mdia.hdlr.handler, &mdia.minf.stbl);
    let samples = sample_table(&mdia.minf.stbl, timescale, file_len)?;

    let duration_us = scale_us(mdia.mdhd.duration, timescale);
    let mut format = format.with_duration_us(duration_us);
    if format.is_video() && duration_us > 0 && !samples.is_empty() {
        format = format.with_frame_rate((samples.len() as f64 * 1e6 / duration_us as f64) as f32);
    }

    Ok(Mp4Track {
        format,
        samples,
        avc,
    })
}

/// Track format from the first sample entry, falling back to the handler
fn describe(handler: FourCC, stbl: &Stbl) -> (TrackFormat, Option<AvcLayout>) {
    let video = |mime: &str, width: u16, height: u16| {
        TrackFormat::video(mime, u32::from(width), u32::from(height))
    };

    match stbl.stsd.codecs.first() {
        Some(Codec::Avc1(avc1)) => (
            video(MIME_VIDEO_AVC, avc1.visual.width, avc1.visual.height),
            Some(AvcLayout::new(&avc1.avcc)),
        ),
        Some(Codec::Hev1(hev1)) => (video("video/hevc", hev1.visual.width, hev1.visual.height), None),
        Some(Codec::Hvc1(hvc1)) => (video("video/hevc", hvc1.visual.width, hvc1.visual.height), None),
        Some(Codec::Vp08(vp08)) => (
            video("video/x-vnd.on2.vp8", vp08.visual.width, vp08.visual.height),
            None,
        ),
        Some(Codec::Vp09(vp09)) => (
            video("video/x-vnd.on2.vp9", vp09.visual.width, vp09.visual.height),
            None,
        ),
        Some(Codec::Av01(av01)) => (video("video/av01", av01.visual.width, av01.visual.height), None),
        Some(Codec::Mp4a(_)) => (TrackFormat::audio("audio/mp4a-latm"), None),
        Some(Codec::Opus(_)) => (TrackFormat::audio("audio/opus"), None),
        Some(Codec::Flac(_)) => (TrackFormat::audio("audio/flac"), None),
        Some(Codec::Ac3(_)) => (TrackFormat::audio("audio/ac3"), None),
        Some(Codec::Eac3(_)) => (TrackFormat::audio("audio/eac3"), None),
        Some(Codec::Tx3g(_)) => (TrackFormat::other("text/3gpp-tt"), None),
        other => {
            let name = match other {
                Some(Codec::Unknown(kind)) => kind.to_string(),
                _ => handler.to_string(),
            };
            let format = match handler {
                HANDLER_VIDEO => TrackFormat::video(&format!("video/x-mp4-{}", name), 0, 0),
                HANDLER_SOUND => TrackFormat::audio(&format!("audio/x-mp4-{}", name)),
                _ => TrackFormat::other(&format!("application/x-mp4-{}", name)),
            };
            (format, None)
        }
    }
}

fn scale_us(value: u64, timescale: u64) -> u64 {
    (u128::from(value) * 1_000_000 / u128::from(timescale)) as u64
}

/// Resolve every sample's byte range, presentation time and sync flag
fn sample_table(stbl: &Stbl, timescale: u64, file_len: usize) -> MediaResult<Vec<Mp4Sample>> {
    let sample_count = match &stbl.stsz.samples {
        StszSamples::Identical { count, .. } => *count as usize,
        StszSamples::Different { sizes } => sizes.len(),
    };
    if sample_count > file_len {
        return Err(malformed(format!(
            "{} samples in a {} byte file",
            sample_count, file_len
        )));
    }
    let sample_size = |index: usize| -> u64 {
        match &stbl.stsz.samples {
            StszSamples::Identical { size, .. } => u64::from(*size),
            StszSamples::Different { sizes } => sizes.get(index).copied().map_or(0, u64::from),
        }
    };

    let chunk_offsets: Vec<u64> = match (&stbl.co64, &stbl.stco) {
        (Some(co64), _) => co64.entries.clone(),
        (None, Some(stco)) => stco.entries.iter().map(|&offset| u64::from(offset)).collect(),
        (None, None) => Vec::new(),
    };

    // stsc runs cover chunks [first_chunk, next run's first_chunk), 1-based
    let mut offsets = Vec::with_capacity(sample_count);
    let runs = &stbl.stsc.entries;
    'runs: for (i, run) in runs.iter().enumerate() {
        let first = run.first_chunk.max(1) as usize;
        let end = runs
            .get(i + 1)
            .map_or(chunk_offsets.len() + 1, |next| next.first_chunk as usize);
        for chunk in first..end {
            let Some(&chunk_offset) = chunk_offsets.get(chunk - 1) else {
                break 'runs;
            };
            let mut offset = chunk_offset;
            for _ in 0..run.samples_per_chunk {
                if offsets.len() == sample_count {
                    break 'runs;
                }
                offsets.push(offset);
                offset += sample_size(offsets.len() - 1);
            }
        }
    }
    if offsets.len() < sample_count {
        return Err(malformed(format!(
            "chunk tables locate {} of {} samples",
            offsets.len(),
            sample_count
        )));
    }

    let mut deltas = stbl
        .stts
        .entries
        .iter()
        .flat_map(|entry| std::iter::repeat(entry.sample_delta).take(entry.sample_count as usize));
    let mut composition = stbl
        .ctts
        .iter()
        .flat_map(|ctts| &ctts.entries)
        .flat_map(|entry| std::iter::repeat(entry.sample_offset).take(entry.sample_count as usize));

    let mut samples = Vec::with_capacity(sample_count);
    let mut dts = 0u64;
    for (index, &offset) in offsets.iter().enumerate() {
        let end = offset + sample_size(index);
        if end > file_len as u64 {
            return Err(malformed(format!(
                "sample {} at {}..{} lies outside the file",
                index, offset, end
            )));
        }

        let pts = (dts as i64 + i64::from(composition.next().unwrap_or(0))).max(0) as u64;
        let sync = match &stbl.stss {
            Some(stss) => stss.entries.binary_search(&(index as u32 + 1)).is_ok(),
            None => true,
        };

        samples.push(Mp4Sample {
            range: offset as usize..end as usize,
            pts_us: scale_us(pts, timescale),
            flags: if sync {
                SampleFlags::KEY_FRAME
            } else {
                SampleFlags::NONE
            },
        });
        dts += u64::from(deltas.next().unwrap_or(0));
    }

    Ok(samples)
}
