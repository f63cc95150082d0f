//! Graphic overlay drawn over the preview
//!
//! Detection runs on a downscaled image, so every face coordinate has to be
//! scaled to the view and, for the front camera, mirrored horizontally.
//! [`GraphicOverlay`] keeps that transform together with the graphics of
//! the latest detection result. Drawing is left to the host; the overlay
//! bumps a generation counter whenever it wants to be redrawn.

use crate::camera::CameraFacing;
use crate::detection::{DetectionResult, Face, LandmarkKind};
use crate::geometry::{PointF, RectF, Size};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A face mapped into view coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct FaceGraphic {
    /// Bounding box in view coordinates
    pub bounding_box: RectF,
    /// Nose base in view coordinates, where the sticker is drawn
    pub nose: Option<PointF>,
    /// Tracking id reported by the detector
    pub tracking_id: Option<i32>,
    /// Probability that the face is smiling
    pub smiling_probability: Option<f32>,
    /// Only the face outline should be drawn
    pub show_only_contour: bool,
}

impl FaceGraphic {
    /// Map `face` into the coordinate space of `overlay`
    pub fn from_face(overlay: &GraphicOverlay, face: &Face, show_only_contour: bool) -> Self {
        let transform = overlay.transform();
        let box_ = face.bounding_box;
        let x1 = transform.translate_x(box_.left);
        let x2 = transform.translate_x(box_.right);

        Self {
            // Mirroring swaps the horizontal edges
            bounding_box: RectF::new(
                x1.min(x2),
                transform.translate_y(box_.top),
                x1.max(x2),
                transform.translate_y(box_.bottom),
            ),
            nose: face
                .landmark(LandmarkKind::NoseBase)
                .map(|nose| transform.translate_point(nose)),
            tracking_id: face.tracking_id,
            smiling_probability: face.smiling_probability,
            show_only_contour,
        }
    }

    /// Where the nose sticker goes, unless only contours are drawn
    pub fn sticker_anchor(&self) -> Option<PointF> {
        if self.show_only_contour {
            None
        } else {
            self.nose
        }
    }
}

/// Something the overlay draws
#[derive(Debug, Clone, PartialEq)]
pub enum Graphic {
    /// The image detection ran on, stretched to the view
    CameraImage {
        /// Size of the detected image
        size: Size,
    },
    /// A detected face
    Face(FaceGraphic),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OverlayTransform {
    view: Size,
    preview: Size,
    facing: CameraFacing,
}

impl OverlayTransform {
    fn scale_x(&self, horizontal: f32) -> f32 {
        if self.preview.width == 0 {
            return horizontal;
        }
        horizontal * self.view.width as f32 / self.preview.width as f32
    }

    fn scale_y(&self, vertical: f32) -> f32 {
        if self.preview.height == 0 {
            return vertical;
        }
        vertical * self.view.height as f32 / self.preview.height as f32
    }

    fn translate_x(&self, x: f32) -> f32 {
        match self.facing {
            CameraFacing::Front => self.view.width as f32 - self.scale_x(x),
            CameraFacing::Back => self.scale_x(x),
        }
    }

    fn translate_y(&self, y: f32) -> f32 {
        self.scale_y(y)
    }

    fn translate_point(&self, point: PointF) -> PointF {
        PointF::new(self.translate_x(point.x), self.translate_y(point.y))
    }
}

/// View that renders detection graphics on top of the preview
///
/// Shared between the detection consumer and the host's draw loop.
#[derive(Debug)]
pub struct GraphicOverlay {
    transform: RwLock<OverlayTransform>,
    graphics: RwLock<Vec<Graphic>>,
    show_only_contour: bool,
    generation: AtomicU64,
}

impl GraphicOverlay {
    /// Create an overlay covering a view of `view` pixels
    pub fn new(view: Size) -> Self {
        Self {
            transform: RwLock::new(OverlayTransform {
                view,
                preview: Size::new(0, 0),
                facing: CameraFacing::Back,
            }),
            graphics: RwLock::new(Vec::new()),
            show_only_contour: false,
            generation: AtomicU64::new(0),
        }
    }

    /// Draw face outlines only
    pub fn with_show_only_contour(mut self, show_only_contour: bool) -> Self {
        self.show_only_contour = show_only_contour;
        self
    }

    /// Set the size of the images detection runs on and the camera facing
    pub fn set_camera_info(&self, preview: Size, facing: CameraFacing) {
        {
            let mut transform = self.transform.write();
            transform.preview = preview;
            transform.facing = facing;
        }
        self.post_invalidate();
    }

    /// Resize the view
    pub fn set_view_size(&self, view: Size) {
        self.transform.write().view = view;
        self.post_invalidate();
    }

    /// Current view size
    pub fn view_size(&self) -> Size {
        self.transform.read().view
    }

    /// Current preview size
    pub fn preview_size(&self) -> Size {
        self.transform.read().preview
    }

    /// Current camera facing
    pub fn camera_facing(&self) -> CameraFacing {
        self.transform.read().facing
    }

    fn transform(&self) -> OverlayTransform {
        *self.transform.read()
    }

    /// Scale a horizontal length from image to view
    pub fn scale_x(&self, horizontal: f32) -> f32 {
        self.transform().scale_x(horizontal)
    }

    /// Scale a vertical length from image to view
    pub fn scale_y(&self, vertical: f32) -> f32 {
        self.transform().scale_y(vertical)
    }

    /// Map an image x coordinate to the view, mirrored for the front camera
    pub fn translate_x(&self, x: f32) -> f32 {
        self.transform().translate_x(x)
    }

    /// Map an image y coordinate to the view
    pub fn translate_y(&self, y: f32) -> f32 {
        self.transform().translate_y(y)
    }

    /// Remove all graphics
    pub fn clear(&self) {
        self.graphics.write().clear();
        self.post_invalidate();
    }

    /// Add a graphic
    pub fn add(&self, graphic: Graphic) {
        self.graphics.write().push(graphic);
        self.post_invalidate();
    }

    /// Snapshot of the current graphics
    pub fn graphics(&self) -> Vec<Graphic> {
        self.graphics.read().clone()
    }

    /// Faces currently shown
    pub fn faces(&self) -> Vec<FaceGraphic> {
        self.graphics
            .read()
            .iter()
            .filter_map(|graphic| match graphic {
                Graphic::Face(face) => Some(face.clone()),
                Graphic::CameraImage { .. } => None,
            })
            .collect()
    }

    /// Request a redraw
    pub fn post_invalidate(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Incremented on every redraw request
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replace the graphics with the faces of `result`
    pub fn apply(&self, result: &DetectionResult) {
        let image = Size::new(result.metadata.width, result.metadata.height);
        {
            let mut transform = self.transform.write();
            transform.preview = image;
            transform.facing = result.metadata.camera_facing;
        }

        let mut graphics = Vec::with_capacity(result.faces.len() + 1);
        graphics.push(Graphic::CameraImage { size: image });
        for face in &result.faces {
            graphics.push(Graphic::Face(FaceGraphic::from_face(
                self,
                face,
                self.show_only_contour,
            )));
        }

        *self.graphics.write() = graphics;
        debug!(
            "Overlay updated with {} faces from frame {}",
            result.faces.len(),
            result.sequence
        );
        self.post_invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::FrameMetadata;

    fn face() -> Face {
        Face::new(RectF::new(10.0, 20.0, 50.0, 60.0))
            .with_landmark(LandmarkKind::NoseBase, PointF::new(30.0, 40.0))
    }

    #[test]
    fn test_back_camera_scales() {
        let overlay = GraphicOverlay::new(Size::new(640, 360));
        overlay.set_camera_info(Size::new(320, 180), CameraFacing::Back);

        assert_eq!(overlay.scale_x(10.0), 20.0);
        assert_eq!(overlay.translate_x(10.0), 20.0);
        assert_eq!(overlay.translate_y(90.0), 180.0);

        let graphic = FaceGraphic::from_face(&overlay, &face(), false);
        assert_eq!(graphic.bounding_box, RectF::new(20.0, 40.0, 100.0, 120.0));
        assert_eq!(graphic.sticker_anchor(), Some(PointF::new(60.0, 80.0)));
    }

    #[test]
    fn test_front_camera_mirrors() {
        let overlay = GraphicOverlay::new(Size::new(640, 360));
        overlay.set_camera_info(Size::new(320, 180), CameraFacing::Front);

        assert_eq!(overlay.translate_x(10.0), 620.0);
        let graphic = FaceGraphic::from_face(&overlay, &face(), false);
        assert_eq!(graphic.bounding_box.left, 540.0);
        assert_eq!(graphic.bounding_box.right, 620.0);
        assert_eq!(graphic.nose, Some(PointF::new(580.0, 80.0)));
    }

    #[test]
    fn test_apply_replaces_graphics() {
        let overlay = GraphicOverlay::new(Size::new(320, 180)).with_show_only_contour(true);
        overlay.add(Graphic::CameraImage {
            size: Size::new(1, 1),
        });
        let before = overlay.generation();

        let result = DetectionResult {
            faces: vec![face(), face()],
            metadata: FrameMetadata::new(320, 180),
            sequence: 7,
        };
        overlay.apply(&result);

        let graphics = overlay.graphics();
        assert_eq!(graphics.len(), 3);
        assert_eq!(
            graphics[0],
            Graphic::CameraImage {
                size: Size::new(320, 180)
            }
        );
        assert_eq!(overlay.faces().len(), 2);
        assert_eq!(overlay.faces()[0].sticker_anchor(), None);
        assert!(overlay.generation() > before);

        overlay.clear();
        assert!(overlay.graphics().is_empty());
    }
}
