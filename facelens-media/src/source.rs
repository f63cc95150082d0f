//! Source descriptors and demuxer factories
//!
//! A [`MediaSource`] names what to play: a local file, a content-provider
//! URI handed over by a picker, or a remote URL. A [`DemuxerFactory`] turns a
//! source into a [`Demuxer`].

use crate::demuxer::{AnnexBDemuxer, Demuxer, MemoryDemuxer};
use crate::error::{MediaError, MediaResult};
use crate::mp4::Mp4Demuxer;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;
use url::Url;

/// Where a source lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// File on the local file system
    LocalFile,
    /// Content-provider URI, e.g. from a gallery picker
    Content,
    /// HTTP(S) URL
    Remote,
    /// Registered in-memory source
    Memory,
}

/// Streaming format inferred from the source name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// MPEG-DASH manifest (`.mpd`)
    Dash,
    /// Smooth Streaming manifest (`.ism`, `.isml`, optionally `/manifest`)
    SmoothStreaming,
    /// HLS playlist (`.m3u8`)
    Hls,
    /// Progressive file
    Other,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContentType::Dash => "DASH manifest",
            ContentType::SmoothStreaming => "Smooth Streaming manifest",
            ContentType::Hls => "HLS playlist",
            ContentType::Other => "progressive file",
        })
    }
}

/// A parsed source URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    url: Url,
    kind: SourceKind,
}

impl MediaSource {
    /// Parse a URI or a bare file path
    ///
    /// Relative paths are resolved against the current directory.
    pub fn parse(input: &str) -> MediaResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(invalid(input, "empty source"));
        }

        let url = match Url::parse(input) {
            Ok(url) if url.scheme().len() > 1 => url,
            // A single-letter scheme is a Windows drive, not a URI
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
                let mut path = PathBuf::from(input);
                if path.is_relative() {
                    path = std::env::current_dir()?.join(path);
                }
                Url::from_file_path(&path)
                    .map_err(|_| invalid(input, "not an absolute file path"))?
            }
            Err(e) => return Err(invalid(input, &e.to_string())),
        };

        let kind = match url.scheme() {
            "file" => SourceKind::LocalFile,
            "content" => SourceKind::Content,
            "http" | "https" => SourceKind::Remote,
            "memory" => SourceKind::Memory,
            other => return Err(invalid(input, &format!("unsupported scheme {}", other))),
        };

        Ok(Self { url, kind })
    }

    /// Where the source lives
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Parsed URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Source as a string
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Local path for file sources
    pub fn file_path(&self) -> Option<PathBuf> {
        match self.kind {
            SourceKind::LocalFile => self.url.to_file_path().ok(),
            _ => None,
        }
    }

    /// Lower-cased file extension of the last path segment
    pub fn extension(&self) -> Option<String> {
        let segment = self.url.path_segments()?.last()?;
        let (_, extension) = segment.rsplit_once('.')?;
        Some(extension.to_ascii_lowercase())
    }

    /// Infer the streaming format from the path
    pub fn content_type(&self) -> ContentType {
        let path = self.url.path().to_ascii_lowercase();
        if path.ends_with(".mpd") {
            ContentType::Dash
        } else if path.ends_with(".m3u8") {
            ContentType::Hls
        } else if is_smooth_streaming(&path) {
            ContentType::SmoothStreaming
        } else {
            ContentType::Other
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

fn is_smooth_streaming(path: &str) -> bool {
    let path = match path.find("/manifest") {
        Some(pos) => {
            let rest = &path[pos + "/manifest".len()..];
            // Optional "(format=...)" suffix
            if !(rest.is_empty() || (rest.starts_with('(') && rest.ends_with(')'))) {
                return false;
            }
            &path[..pos]
        }
        None => path,
    };
    path.ends_with(".ism") || path.ends_with(".isml")
}

fn invalid(input: &str, reason: &str) -> MediaError {
    MediaError::InvalidSource {
        source_uri: input.to_string(),
        reason: reason.to_string(),
    }
}

/// Opens demuxers for sources
pub trait DemuxerFactory: Send + Sync {
    /// Whether this factory can open `source`
    fn supports(&self, source: &MediaSource) -> bool;

    /// Open a demuxer positioned before the first sample
    fn open(&self, source: &MediaSource) -> MediaResult<Box<dyn Demuxer>>;
}

/// Opens H.264 elementary stream files
#[derive(Debug, Clone)]
pub struct AnnexBDemuxerFactory {
    frame_rate: f32,
}

impl AnnexBDemuxerFactory {
    /// Create a factory stamping samples at `frame_rate`
    pub fn new(frame_rate: f32) -> Self {
        Self { frame_rate }
    }
}

impl Default for AnnexBDemuxerFactory {
    fn default() -> Self {
        Self::new(30.0)
    }
}

impl DemuxerFactory for AnnexBDemuxerFactory {
    fn supports(&self, source: &MediaSource) -> bool {
        source.kind() == SourceKind::LocalFile
            && matches!(source.extension().as_deref(), Some("h264") | Some("264"))
    }

    fn open(&self, source: &MediaSource) -> MediaResult<Box<dyn Demuxer>> {
        if !self.supports(source) {
            return Err(invalid(source.as_str(), "not an H.264 elementary stream file"));
        }
        let path = source
            .file_path()
            .ok_or_else(|| invalid(source.as_str(), "not a local file"))?;
        Ok(Box::new(AnnexBDemuxer::open(&path, self.frame_rate)?))
    }
}

/// Opens ISO base media files (`.mp4`, `.m4v`, `.mov`, `.3gp`)
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp4DemuxerFactory;

impl Mp4DemuxerFactory {
    /// Create the factory
    pub fn new() -> Self {
        Self
    }
}

impl DemuxerFactory for Mp4DemuxerFactory {
    fn supports(&self, source: &MediaSource) -> bool {
        source.kind() == SourceKind::LocalFile
            && source.content_type() == ContentType::Other
            && matches!(
                source.extension().as_deref(),
                Some("mp4") | Some("m4v") | Some("mov") | Some("3gp")
            )
    }

    fn open(&self, source: &MediaSource) -> MediaResult<Box<dyn Demuxer>> {
        if !self.supports(source) {
            return Err(invalid(source.as_str(), "not an MP4 file"));
        }
        let path = source
            .file_path()
            .ok_or_else(|| invalid(source.as_str(), "not a local file"))?;
        Ok(Box::new(Mp4Demuxer::open(&path)?))
    }
}

/// Serves demuxers registered under a source URI
///
/// Useful for content decoded elsewhere and for tests.
#[derive(Debug, Default)]
pub struct MemoryDemuxerFactory {
    sources: RwLock<HashMap<String, MemoryDemuxer>>,
}

impl MemoryDemuxerFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `demuxer` under `uri`
    pub fn register(&self, uri: &str, demuxer: MemoryDemuxer) -> MediaResult<MediaSource> {
        let source = MediaSource::parse(uri)?;
        debug!("Registered in-memory source {}", source);
        self.sources
            .write()
            .insert(source.as_str().to_string(), demuxer);
        Ok(source)
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }
}

impl DemuxerFactory for MemoryDemuxerFactory {
    fn supports(&self, source: &MediaSource) -> bool {
        self.sources.read().contains_key(source.as_str())
    }

    fn open(&self, source: &MediaSource) -> MediaResult<Box<dyn Demuxer>> {
        let demuxer = self
            .sources
            .read()
            .get(source.as_str())
            .cloned()
            .ok_or_else(|| invalid(source.as_str(), "no source registered"))?;
        Ok(Box::new(demuxer))
    }
}

/// Tries a list of factories in order
#[derive(Default)]
pub struct DemuxerRegistry {
    factories: Vec<std::sync::Arc<dyn DemuxerFactory>>,
}

impl fmt::Debug for DemuxerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemuxerRegistry")
            .field("factories", &self.factories.len())
            .finish()
    }
}

impl DemuxerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a factory
    pub fn with_factory(mut self, factory: std::sync::Arc<dyn DemuxerFactory>) -> Self {
        self.factories.push(factory);
        self
    }
}

impl DemuxerFactory for DemuxerRegistry {
    fn supports(&self, source: &MediaSource) -> bool {
        self.factories.iter().any(|factory| factory.supports(source))
    }

    fn open(&self, source: &MediaSource) -> MediaResult<Box<dyn Demuxer>> {
        match self.factories.iter().find(|factory| factory.supports(source)) {
            Some(factory) => factory.open(source),
            None => {
                let format = match source.content_type() {
                    ContentType::Other => format!("no demuxer for {}", source),
                    manifest => format!("no demuxer for {} {}", manifest, source),
                };
                debug!("{}", format);
                Err(MediaError::UnsupportedFormat { format })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        let remote = MediaSource::parse(
            "https://www.videvo.net/videvo_files/converted/2018_04/preview/171215_C_19.mp473209.webm",
        )
        .unwrap();
        assert_eq!(remote.kind(), SourceKind::Remote);
        assert_eq!(remote.extension().as_deref(), Some("webm"));

        let content =
            MediaSource::parse("content://media/external/video/media/42").unwrap();
        assert_eq!(content.kind(), SourceKind::Content);
        assert!(content.file_path().is_none());

        let memory = MediaSource::parse("memory://clip").unwrap();
        assert_eq!(memory.kind(), SourceKind::Memory);

        assert!(MediaSource::parse("ftp://example.com/a.mp4").is_err());
        assert!(MediaSource::parse("   ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_bare_path() {
        let source = MediaSource::parse("/sdcard/DCIM/clip.h264").unwrap();
        assert_eq!(source.kind(), SourceKind::LocalFile);
        assert_eq!(source.as_str(), "file:///sdcard/DCIM/clip.h264");
        assert_eq!(
            source.file_path(),
            Some(PathBuf::from("/sdcard/DCIM/clip.h264"))
        );

        let relative = MediaSource::parse("clip.264").unwrap();
        assert_eq!(relative.kind(), SourceKind::LocalFile);
        assert!(relative.as_str().ends_with("/clip.264"));
    }

    #[test]
    fn test_content_type_inference() {
        let kind = |uri: &str| MediaSource::parse(uri).unwrap().content_type();
        assert_eq!(kind("https://cdn.example.com/live/stream.mpd"), ContentType::Dash);
        assert_eq!(kind("https://cdn.example.com/hls/index.M3U8"), ContentType::Hls);
        assert_eq!(
            kind("https://cdn.example.com/ss/movie.ism/Manifest"),
            ContentType::SmoothStreaming
        );
        assert_eq!(
            kind("https://cdn.example.com/ss/movie.isml/manifest(format=mpd-time-csf)"),
            ContentType::SmoothStreaming
        );
        assert_eq!(kind("https://cdn.example.com/clip.mp4"), ContentType::Other);
    }

    #[test]
    fn test_memory_factory() {
        let factory = MemoryDemuxerFactory::new();
        let source = factory
            .register("memory://clip", MemoryDemuxer::new().with_raw_video(2, 2, &[0]))
            .unwrap();

        assert!(factory.supports(&source));
        let demuxer = factory.open(&source).unwrap();
        assert_eq!(demuxer.track_count(), 1);

        let missing = MediaSource::parse("memory://other").unwrap();
        assert!(!factory.supports(&missing));
        assert!(factory.open(&missing).is_err());
    }

    #[test]
    fn test_annexb_factory_support() {
        let factory = AnnexBDemuxerFactory::default();
        assert!(factory.supports(&MediaSource::parse("file:///tmp/clip.h264").unwrap()));
        assert!(!factory.supports(&MediaSource::parse("file:///tmp/clip.mp4").unwrap()));
        assert!(!factory.supports(&MediaSource::parse("https://host/clip.h264").unwrap()));

        let missing = MediaSource::parse("file:///definitely/not/here.h264").unwrap();
        match factory.open(&missing) {
            Err(MediaError::Io { .. }) => {}
            other => panic!("Expected I/O error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_mp4_factory_support() {
        let factory = Mp4DemuxerFactory::new();
        assert!(factory.supports(&MediaSource::parse("file:///tmp/clip.mp4").unwrap()));
        assert!(factory.supports(&MediaSource::parse("file:///tmp/CLIP.MOV").unwrap()));
        assert!(!factory.supports(&MediaSource::parse("file:///tmp/clip.h264").unwrap()));
        assert!(!factory.supports(&MediaSource::parse("https://host/clip.mp4").unwrap()));
        assert!(!factory.supports(
            &MediaSource::parse("content://media/external/video/media/42").unwrap()
        ));

        let missing = MediaSource::parse("file:///definitely/not/here.mp4").unwrap();
        assert!(matches!(factory.open(&missing), Err(MediaError::Io { .. })));
    }

    #[test]
    fn test_registry_names_manifest_type() {
        let registry = DemuxerRegistry::new().with_factory(std::sync::Arc::new(Mp4DemuxerFactory));

        let message = |uri: &str| match registry.open(&MediaSource::parse(uri).unwrap()) {
            Err(MediaError::UnsupportedFormat { format }) => format,
            other => panic!("Expected unsupported format, got {:?}", other.map(|_| ())),
        };
        assert_eq!(
            message("https://cdn.example.com/hls/index.m3u8"),
            "no demuxer for HLS playlist https://cdn.example.com/hls/index.m3u8"
        );
        assert!(message("https://cdn.example.com/live/stream.mpd").contains("DASH manifest"));
        assert_eq!(
            message("https://cdn.example.com/clip.webm"),
            "no demuxer for https://cdn.example.com/clip.webm"
        );
    }

    #[test]
    fn test_registry_falls_through() {
        let memory = std::sync::Arc::new(MemoryDemuxerFactory::new());
        let source = memory
            .register("memory://clip", MemoryDemuxer::new())
            .unwrap();
        let registry = DemuxerRegistry::new()
            .with_factory(std::sync::Arc::new(AnnexBDemuxerFactory::default()))
            .with_factory(memory);

        assert!(registry.open(&source).is_ok());
        assert!(registry
            .open(&MediaSource::parse("https://host/clip.webm").unwrap())
            .is_err());
    }
}
