//! Integration tests for container playback
//!
//! Each test writes a real MP4 file (an Opus track followed by an H.264
//! track) and plays it through the registry the way an application would.

use bytes::Bytes;
use facelens_media::*;
use mp4_atom::{
    Audio, Avc1, Avcc, Codec, Dops, Encode, FixedPoint, FourCC, Ftyp, Hdlr, Mdat, Mdhd, Mdia,
    Minf, Moov, Mvhd, Opus, Smhd, Stbl, Stco, Stsc, StscEntry, Stsd, Stss, Stsz, StszSamples,
    Stts, SttsEntry, Tkhd, Trak, Visual, Vmhd,
};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// 30 fps in a 30000 Hz timescale
const TIMESCALE: u32 = 30_000;
const FRAME_DELTA: u32 = 1_000;

/// H.264 track contents in MP4 form
struct AvcTrack {
    width: u16,
    height: u16,
    sps: Vec<u8>,
    pps: Vec<u8>,
    /// Length-prefixed samples
    samples: Vec<Vec<u8>>,
}

fn length_prefixed(nals: &[&[u8]]) -> Vec<u8> {
    let mut sample = Vec::new();
    for nal in nals {
        sample.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        sample.extend_from_slice(nal);
    }
    sample
}

fn audio_samples() -> Vec<Vec<u8>> {
    vec![vec![0xFC, 1, 2, 3], vec![0xFC, 4, 5, 6], vec![0xFC, 7, 8]]
}

fn stbl(codec: Codec, samples: &[Vec<u8>], delta: u32, chunk_offset: u32) -> Stbl {
    Stbl {
        stsd: Stsd {
            codecs: vec![codec],
        },
        stts: Stts {
            entries: vec![SttsEntry {
                sample_count: samples.len() as u32,
                sample_delta: delta,
            }],
        },
        stsc: Stsc {
            entries: vec![StscEntry {
                first_chunk: 1,
                samples_per_chunk: samples.len() as u32,
                sample_description_index: 1,
            }],
        },
        stsz: Stsz {
            samples: StszSamples::Different {
                sizes: samples.iter().map(|sample| sample.len() as u32).collect(),
            },
        },
        stco: Some(Stco {
            entries: vec![chunk_offset],
        }),
        ..Default::default()
    }
}

fn trak(track_id: u32, handler: &[u8; 4], timescale: u32, duration: u64, minf: Minf) -> Trak {
    Trak {
        tkhd: Tkhd {
            track_id,
            duration,
            enabled: true,
            ..Default::default()
        },
        mdia: Mdia {
            mdhd: Mdhd {
                timescale,
                duration,
                language: "und".to_string(),
                ..Default::default()
            },
            hdlr: Hdlr {
                handler: FourCC::new(handler),
                name: "FaceLens".to_string(),
            },
            minf,
        },
        ..Default::default()
    }
}

fn moov(video: &AvcTrack, audio_offset: u32, video_offset: u32) -> Moov {
    let opus = Codec::Opus(Opus {
        audio: Audio {
            data_reference_index: 1,
            channel_count: 2,
            sample_size: 16,
            sample_rate: FixedPoint::new(48000, 0),
        },
        dops: Dops {
            output_channel_count: 2,
            pre_skip: 312,
            input_sample_rate: 48000,
            output_gain: 0,
        },
        btrt: None,
    });
    let audio_count = audio_samples().len() as u64;
    let audio = trak(
        1,
        b"soun",
        48000,
        audio_count * 960,
        Minf {
            smhd: Some(Smhd::default()),
            stbl: stbl(opus, &audio_samples(), 960, audio_offset),
            ..Default::default()
        },
    );

    let avc1 = Codec::Avc1(Avc1 {
        visual: Visual {
            data_reference_index: 1,
            width: video.width,
            height: video.height,
            ..Default::default()
        },
        avcc: Avcc {
            configuration_version: 1,
            avc_profile_indication: video.sps[1],
            profile_compatibility: video.sps[2],
            avc_level_indication: video.sps[3],
            length_size: 4,
            sequence_parameter_sets: vec![video.sps.clone()],
            picture_parameter_sets: vec![video.pps.clone()],
            ext: None,
        },
        ..Default::default()
    });
    let mut video_stbl = stbl(avc1, &video.samples, FRAME_DELTA, video_offset);
    video_stbl.stss = Some(Stss { entries: vec![1] });
    let video_trak = trak(
        2,
        b"vide",
        TIMESCALE,
        video.samples.len() as u64 * FRAME_DELTA as u64,
        Minf {
            vmhd: Some(Vmhd::default()),
            stbl: video_stbl,
            ..Default::default()
        },
    );

    Moov {
        mvhd: Mvhd {
            timescale: 1000,
            duration: 1000,
            ..Default::default()
        },
        trak: vec![audio, video_trak],
        ..Default::default()
    }
}

/// ftyp, moov and mdat with the audio samples ahead of the video samples
fn mp4_file(video: &AvcTrack) -> NamedTempFile {
    let ftyp = Ftyp {
        major_brand: FourCC::new(b"isom"),
        minor_version: 512,
        compatible_brands: vec![FourCC::new(b"isom"), FourCC::new(b"avc1")],
    };
    let mut file = Vec::new();
    ftyp.encode(&mut file).unwrap();

    let mut sizing = Vec::new();
    moov(video, 0, 0).encode(&mut sizing).unwrap();
    let mdat_body = (file.len() + sizing.len() + 8) as u32;
    let audio_len: usize = audio_samples().iter().map(Vec::len).sum();
    moov(video, mdat_body, mdat_body + audio_len as u32)
        .encode(&mut file)
        .unwrap();

    let data = audio_samples()
        .into_iter()
        .chain(video.samples.iter().cloned())
        .flatten()
        .collect();
    Mdat { data }.encode(&mut file).unwrap();

    let fixture = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    std::fs::write(fixture.path(), &file).unwrap();
    fixture
}

fn source_for(fixture: &NamedTempFile) -> MediaSource {
    MediaSource::parse(fixture.path().to_str().unwrap()).unwrap()
}

fn default_registry() -> Arc<DemuxerRegistry> {
    Arc::new(
        DemuxerRegistry::new()
            .with_factory(Arc::new(Mp4DemuxerFactory::new()))
            .with_factory(Arc::new(AnnexBDemuxerFactory::new(30.0))),
    )
}

/// Runs ticks 16 ms apart until the pipeline stops
fn play_to_end(pipeline: &mut PlaybackPipeline) {
    let mut now = 0;
    while !pipeline.is_finished() && now < 10_000 {
        pipeline.tick(now);
        now += 16;
    }
    assert!(pipeline.is_finished(), "pipeline still {}", pipeline.state());
}

// ============================================================================
// TRACK SELECTION TESTS
// ============================================================================

/// Emits a 2x2 frame per sample once the sample parses as Annex-B
struct AnnexBCheckingDecoder {
    seen: Arc<parking_lot::Mutex<Vec<Bytes>>>,
}

impl FrameDecoder for AnnexBCheckingDecoder {
    fn codec_name(&self) -> &'static str {
        "annexb-check"
    }

    fn decode(&mut self, sample: &CompressedSample) -> MediaResult<Vec<VideoFrame>> {
        if !sample.data.starts_with(&[0, 0, 0, 1]) {
            return Err(MediaError::DecodingFailed {
                codec: self.codec_name().to_string(),
                reason: "sample is not Annex-B".to_string(),
            });
        }
        self.seen.lock().push(sample.data.clone());
        Ok(vec![VideoFrame {
            width: 2,
            height: 2,
            format: PixelFormat::Rgba8,
            data: vec![0u8; 16].into(),
            pts_us: sample.pts_us,
            is_keyframe: sample.flags.is_key_frame(),
        }])
    }
}

#[derive(Default)]
struct AvcOnlyFactory {
    seen: Arc<parking_lot::Mutex<Vec<Bytes>>>,
    offered: parking_lot::Mutex<Vec<String>>,
}

impl DecoderFactory for AvcOnlyFactory {
    fn from_video_format(
        &self,
        format: &TrackFormat,
        surface: Arc<dyn Surface>,
    ) -> Option<Box<dyn DecodeSession>> {
        self.offered.lock().push(format.mime.clone());
        if format.mime != MIME_VIDEO_AVC {
            return None;
        }
        let decoder = AnnexBCheckingDecoder {
            seen: self.seen.clone(),
        };
        Some(Box::new(QueuedDecodeSession::new(decoder, surface)))
    }
}

fn synthetic_avc() -> AvcTrack {
    AvcTrack {
        width: 320,
        height: 240,
        sps: vec![0x67, 0x42, 0xC0, 0x1E, 0xDA],
        pps: vec![0x68, 0xCE, 0x3C, 0x80],
        samples: vec![
            length_prefixed(&[&[0x65, 0x88, 0x84, 0x21]]),
            length_prefixed(&[&[0x41, 0x9A, 0x02]]),
            length_prefixed(&[&[0x41, 0x9A, 0x04]]),
            length_prefixed(&[&[0x41, 0x9A, 0x06]]),
        ],
    }
}

#[test]
fn test_mp4_video_track_selected_after_audio() {
    let fixture = mp4_file(&synthetic_avc());
    let decoders = Arc::new(AvcOnlyFactory::default());
    let surface = Arc::new(FrameSinkSurface::new());
    let mut pipeline = PlaybackPipeline::new(
        source_for(&fixture),
        default_registry(),
        decoders.clone(),
        surface.clone(),
    );

    pipeline.play().unwrap();
    let track = pipeline.track().unwrap();
    assert_eq!(track.index, 1);
    assert_eq!(track.format.mime, MIME_VIDEO_AVC);
    assert_eq!((track.format.width, track.format.height), (320, 240));
    // The audio track is never offered to the decoder factory
    assert_eq!(*decoders.offered.lock(), vec![MIME_VIDEO_AVC.to_string()]);

    play_to_end(&mut pipeline);
    assert_eq!(surface.rendered_pts_us(), vec![0, 33_333, 66_666, 100_000]);
    assert!(surface.is_released());

    let seen = decoders.seen.lock();
    assert_eq!(seen.len(), 4);
    // SPS and PPS travel in front of the key frame only
    assert_eq!(&seen[0][4..9], &[0x67, 0x42, 0xC0, 0x1E, 0xDA]);
    assert_eq!(&seen[1][..], &[0, 0, 0, 1, 0x41, 0x9A, 0x02]);
}

#[test]
fn test_container_extension_picks_demuxer() {
    let fixture = mp4_file(&synthetic_avc());
    let renamed = tempfile::Builder::new().suffix(".webm").tempfile().unwrap();
    std::fs::copy(fixture.path(), renamed.path()).unwrap();

    let mut pipeline = PlaybackPipeline::new(
        source_for(&renamed),
        default_registry(),
        Arc::new(AvcOnlyFactory::default()),
        Arc::new(NullSurface::new()),
    );
    let err = pipeline.play().unwrap_err();
    assert!(matches!(err, MediaError::UnsupportedFormat { .. }), "{}", err);
    assert!(err.to_string().contains("no demuxer"), "{}", err);
    assert_eq!(pipeline.state(), PipelineState::Idle);
}

// ============================================================================
// H.264 DECODING TESTS
// ============================================================================

/// Splits an Annex-B stream on its start codes
#[cfg(feature = "h264")]
fn split_nals(stream: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= stream.len() {
        if stream[i..i + 3] == [0, 0, 1] {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let mut end = starts.get(n + 1).map_or(stream.len(), |next| next - 3);
            // Trailing zero belongs to a four-byte start code
            while end > start && stream[end - 1] == 0 {
                end -= 1;
            }
            &stream[start..end]
        })
        .collect()
}

/// Encodes `frames` frames of drifting bars into an MP4 H.264 track
#[cfg(feature = "h264")]
fn encoded_avc(frames: usize, width: usize, height: usize) -> AvcTrack {
    use openh264::encoder::{Encoder, EncoderConfig};
    use openh264::formats::YUVBuffer;
    use openh264::OpenH264API;

    let config = EncoderConfig::new().skip_frames(false);
    let mut encoder = Encoder::with_api_config(OpenH264API::from_source(), config).unwrap();

    let mut sps = Vec::new();
    let mut pps = Vec::new();
    let mut samples = Vec::new();
    for i in 0..frames {
        let mut yuv = vec![128u8; width * height * 3 / 2];
        for (p, luma) in yuv[..width * height].iter_mut().enumerate() {
            *luma = ((p % width + i * 8) % 256) as u8;
        }
        let buffer = YUVBuffer::from_vec(yuv, width, height);
        let stream = encoder.encode(&buffer).unwrap().to_vec();

        let mut picture = Vec::new();
        for nal in split_nals(&stream) {
            match nal[0] & 0x1F {
                7 => sps = nal.to_vec(),
                8 => pps = nal.to_vec(),
                _ => picture.push(nal),
            }
        }
        samples.push(length_prefixed(&picture));
    }
    assert!(!sps.is_empty() && !pps.is_empty());

    AvcTrack {
        width: width as u16,
        height: height as u16,
        sps,
        pps,
        samples,
    }
}

#[cfg(feature = "h264")]
#[test]
fn test_encoded_mp4_plays_every_frame() {
    let fixture = mp4_file(&encoded_avc(6, 64, 64));
    let surface = Arc::new(FrameSinkSurface::new());
    let mut pipeline = PlaybackPipeline::new(
        source_for(&fixture),
        default_registry(),
        Arc::new(DefaultDecoderFactory::new().with_max_pending_outputs(8)),
        surface.clone(),
    );

    pipeline.play().unwrap();
    assert_eq!(pipeline.track().map(|track| track.index), Some(1));

    play_to_end(&mut pipeline);
    let expected: Vec<u64> = (0..6u64).map(|i| i * 1_000_000 / 30).collect();
    assert_eq!(surface.rendered_pts_us(), expected);

    assert_eq!(pipeline.stats().frames_released, 6);
    assert!(surface.is_released());
}
