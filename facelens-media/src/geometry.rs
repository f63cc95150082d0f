//! Size arithmetic for preview, detection and overlay surfaces

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Size {
    /// Create a size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Whether width exceeds height
    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Whether either side is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Swap width and height
    pub fn transposed(&self) -> Size {
        Size::new(self.height, self.width)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A point in floating-point pixel coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    /// Horizontal position
    pub x: f32,
    /// Vertical position
    pub y: f32,
}

impl PointF {
    /// Create a point
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in floating-point pixel coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    /// Left edge
    pub left: f32,
    /// Top edge
    pub top: f32,
    /// Right edge
    pub right: f32,
    /// Bottom edge
    pub bottom: f32,
}

impl RectF {
    /// Create a rectangle from its edges
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width of the rectangle
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Height of the rectangle
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Center point
    pub fn center(&self) -> PointF {
        PointF::new(
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }
}

/// Orders sizes by pixel count
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareSizesByArea;

impl CompareSizesByArea {
    /// Compare two sizes by area
    pub fn compare(&self, lhs: &Size, rhs: &Size) -> Ordering {
        lhs.area().cmp(&rhs.area())
    }
}

/// Scale so the longer side equals `max_size`, keeping the aspect ratio
///
/// Square inputs are scaled by height.
pub fn scale_to_max(size: Size, max_size: u32) -> Size {
    if size.is_empty() {
        return size;
    }

    let (width, height, max) = (size.width as u64, size.height as u64, max_size as u64);
    if size.is_landscape() {
        Size::new(max_size, (max * height / width) as u32)
    } else {
        Size::new((max * width / height) as u32, max_size)
    }
}

/// Shrink or grow `image` until it fits inside `target`, keeping the aspect ratio
pub fn fit_within(image: Size, target: Size) -> Size {
    if image.is_empty() || target.is_empty() {
        return Size::new(0, 0);
    }

    let scale = f32::max(
        image.width as f32 / target.width as f32,
        image.height as f32 / target.height as f32,
    );
    Size::new(
        (image.width as f32 / scale) as u32,
        (image.height as f32 / scale) as u32,
    )
}

/// Stretch `image` to `width`, deriving the height from its aspect ratio
pub fn fit_width(image: Size, width: u32) -> Size {
    if image.width == 0 {
        return Size::new(width, 0);
    }
    let height = image.height as u64 * width as u64 / image.width as u64;
    Size::new(width, height as u32)
}

/// Orient `size` for the display: landscape keeps it, portrait transposes it
pub fn oriented(size: Size, landscape: bool) -> Size {
    if landscape {
        size
    } else {
        size.transposed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_to_max() {
        assert_eq!(scale_to_max(Size::new(1920, 1080), 400), Size::new(400, 225));
        assert_eq!(scale_to_max(Size::new(1080, 1920), 400), Size::new(225, 400));
        assert_eq!(scale_to_max(Size::new(500, 500), 400), Size::new(400, 400));
        assert_eq!(scale_to_max(Size::new(0, 10), 400), Size::new(0, 10));
    }

    #[test]
    fn test_fit_within() {
        // Wide image in a tall box is limited by width
        assert_eq!(
            fit_within(Size::new(1280, 720), Size::new(640, 1000)),
            Size::new(640, 360)
        );
        // Small image grows to fill the box
        assert_eq!(
            fit_within(Size::new(320, 180), Size::new(1280, 1280)),
            Size::new(1280, 720)
        );
    }

    #[test]
    fn test_fit_width() {
        assert_eq!(fit_width(Size::new(400, 225), 1080), Size::new(1080, 607));
    }

    #[test]
    fn test_rect_center() {
        let rect = RectF::new(10.0, 20.0, 50.0, 100.0);
        assert_eq!(rect.width(), 40.0);
        assert_eq!(rect.height(), 80.0);
        assert_eq!(rect.center(), PointF::new(30.0, 60.0));
    }

    #[test]
    fn test_orientation_and_area() {
        let size = Size::new(640, 480);
        assert_eq!(oriented(size, false), Size::new(480, 640));
        assert_eq!(oriented(size, true), size);
        assert_eq!(size.area(), 307_200);
        assert_eq!(
            CompareSizesByArea.compare(&Size::new(640, 480), &Size::new(800, 600)),
            Ordering::Less
        );
        assert_eq!(size.to_string(), "640x480");
    }
}
