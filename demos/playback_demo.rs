//! FaceLens Playback Demo
//!
//! Plays a generated clip from memory at display rate, runs a toy face
//! detector on every presented frame and prints the session report.
//!
//! Pass a path to an H.264 elementary stream to play a real file instead:
//!
//! ```text
//! cargo run --example playback_demo -- /path/to/clip.h264
//! ```

use anyhow::Context;
use async_trait::async_trait;
use facelens::{Event, FaceDetector, FaceLens, GlobalConfig, MediaError, MemoryDemuxer};
use facelens::{Face, MemoryDemuxerFactory, Size, VisionImage};
use facelens_media::RectF;
use std::sync::Arc;

/// Reports one face in the middle of every frame
struct CenterDetector;

#[async_trait]
impl FaceDetector for CenterDetector {
    async fn detect(&self, image: &VisionImage) -> Result<Vec<Face>, MediaError> {
        let (w, h) = (image.width as f32, image.height as f32);
        Ok(vec![Face::new(RectF::new(w * 0.375, h * 0.25, w * 0.625, h * 0.75))])
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("🎬 FaceLens Playback Demo");
    println!("=========================");

    let config = GlobalConfig {
        debug_logging: std::env::var("FACELENS_DEBUG").is_ok(),
        ..GlobalConfig::default()
    };
    let facelens = FaceLens::init_with(config).context("initializing FaceLens")?;

    let builder = match std::env::args().nth(1) {
        Some(path) => {
            println!("📂 Playing {}", path);
            facelens.playback(&path)
        }
        None => {
            println!("🧪 Playing a generated 2 second clip from memory");
            let timestamps: Vec<u64> = (0..60).map(|i| i * 33).collect();
            let demuxers = Arc::new(MemoryDemuxerFactory::new());
            demuxers.register(
                "memory://demo",
                MemoryDemuxer::new().with_raw_video(64, 36, &timestamps),
            )?;
            facelens.playback("memory://demo").demuxer_factory(demuxers)
        }
    };

    let mut session = builder
        .detector(Arc::new(CenterDetector))
        .view_size(Size::new(1280, 720))
        .start()
        .await
        .context("starting playback")?;
    println!("✅ Session {} started", session.id());

    let overlay = session.overlay();
    let mut events = session
        .events()
        .context("event stream already taken")?;
    let printer = tokio::spawn(async move {
        let mut detections = 0;
        while let Some(event) = events.next().await {
            match event {
                Event::PlaybackStarted { track_index, .. } => {
                    println!("▶️  Playing track {}", track_index)
                }
                Event::FacesDetected { .. } => {
                    detections += 1;
                    if detections % 10 == 1 {
                        if let Some(face) = overlay.faces().first() {
                            println!("🙂 Face at {:?}", face.bounding_box);
                        }
                    }
                }
                Event::NoVideoTrack { source, .. } => println!("❌ No video track in {}", source),
                Event::PlaybackFinished { reason, .. } => println!("⏹️  Finished: {:?}", reason),
                Event::SessionError { error, .. } => println!("❌ {}", error),
                _ => {}
            }
        }
        detections
    });

    let report = session.wait().await.context("playback failed")?;
    let detections = printer.await?;

    println!("\n📊 {}", report.summary());
    println!("🔍 {} detection results", detections);
    println!("\n{}", report.to_json()?);
    Ok(())
}
