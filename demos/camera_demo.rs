//! FaceLens Camera Demo
//!
//! Opens a simulated front camera, offers a few preview frames for face
//! detection and closes the camera again. Shows which preview size the
//! controller picks and how open failures are reported to the user.

use anyhow::Context;
use async_trait::async_trait;
use facelens::{CameraFacing, CameraManager, Event, Face, FaceDetector, FaceLens, MediaError};
use facelens::{Size, VideoFrame, VisionImage};
use facelens_media::{
    CameraCharacteristics, CameraDevice, CameraError, CaptureRequest, CaptureSession,
    PixelFormat, RectF, StreamConfigurationMap,
};
use std::sync::Arc;
use std::time::Duration;

/// Camera stack with a back camera and a front camera
struct SimulatedCameras {
    has_stream_configuration: bool,
}

impl CameraManager for SimulatedCameras {
    fn camera_ids(&self) -> Result<Vec<String>, CameraError> {
        Ok(vec!["back".to_string(), "front".to_string()])
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError> {
        let stream_configuration = self.has_stream_configuration.then(|| StreamConfigurationMap {
            recorder_sizes: vec![Size::new(1920, 1080), Size::new(1280, 720)],
            preview_sizes: vec![
                Size::new(1920, 1080),
                Size::new(1280, 720),
                Size::new(640, 480),
            ],
        });
        Ok(CameraCharacteristics {
            facing: if camera_id == "front" {
                CameraFacing::Front
            } else {
                CameraFacing::Back
            },
            sensor_orientation: 270,
            stream_configuration,
        })
    }

    fn open(&self, camera_id: &str) -> Result<Box<dyn CameraDevice>, CameraError> {
        println!("📷 Opening camera {}", camera_id);
        Ok(Box::new(SimulatedDevice {
            id: camera_id.to_string(),
        }))
    }
}

struct SimulatedDevice {
    id: String,
}

impl CameraDevice for SimulatedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &self,
        targets: &[Size],
    ) -> Result<Box<dyn CaptureSession>, CameraError> {
        println!("🎞️  Capture session for {:?}", targets);
        Ok(Box::new(SimulatedCapture))
    }

    fn close(&self) {
        println!("📷 Camera {} closed", self.id);
    }
}

struct SimulatedCapture;

impl CaptureSession for SimulatedCapture {
    fn set_repeating_request(&mut self, request: CaptureRequest) -> Result<(), CameraError> {
        println!("🔁 Repeating preview request at {}", request.target);
        Ok(())
    }

    fn close(&mut self) {}
}

/// Finds a face in the top left quarter
struct QuarterDetector;

#[async_trait]
impl FaceDetector for QuarterDetector {
    async fn detect(&self, image: &VisionImage) -> Result<Vec<Face>, MediaError> {
        let (w, h) = (image.width as f32, image.height as f32);
        Ok(vec![Face::new(RectF::new(0.0, 0.0, w / 2.0, h / 2.0))])
    }
}

fn preview_frame(size: Size, pts_us: u64) -> VideoFrame {
    VideoFrame {
        width: size.width,
        height: size.height,
        format: PixelFormat::Rgba8,
        data: vec![128u8; size.width as usize * size.height as usize * 4].into(),
        pts_us,
        is_keyframe: true,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("📸 FaceLens Camera Demo");
    println!("=======================");

    let facelens = FaceLens::init().context("initializing FaceLens")?;

    println!("\n📋 Test 1: Open the front camera");
    let mut session = facelens
        .camera(Arc::new(SimulatedCameras {
            has_stream_configuration: true,
        }))
        .detector(Arc::new(QuarterDetector))
        .view_size(Size::new(1080, 1920))
        .build()?;
    let mut events = session.events().context("event stream already taken")?;

    let opened = session.open(1080, 1920).await?;
    println!(
        "✅ Camera {} open, preview {} video {}",
        opened.camera_id, opened.preview_size, opened.video_size
    );

    for i in 0..3u64 {
        let offer = session.detect(&preview_frame(opened.preview_size, i * 33_000));
        println!("🔍 Frame {} offered: {:?}", i, offer);
    }

    while let Ok(Some(event)) = events.try_next() {
        println!("📨 {}", event.event_type());
    }
    let next = tokio::time::timeout(Duration::from_secs(1), events.next()).await;
    if let Ok(Some(Event::FacesDetected { faces, .. })) = next {
        println!("🙂 {} face(s), overlay shows {:?}", faces, session.overlay().faces());
    }

    session.pause().await?;
    println!("⏸️  Camera paused");

    println!("\n📋 Test 2: Camera without stream configuration");
    let mut broken = facelens
        .camera(Arc::new(SimulatedCameras {
            has_stream_configuration: false,
        }))
        .build()?;
    let mut broken_events = broken.events().context("event stream already taken")?;
    if let Err(e) = broken.open(1080, 1920).await {
        println!("❌ Open failed: {}", e);
    }
    if let Ok(Some(Event::SessionError { user_message, .. })) = broken_events.try_next() {
        println!("💬 User sees: {}", user_message.unwrap_or_default());
    }

    println!("\n🎉 Done");
    Ok(())
}
