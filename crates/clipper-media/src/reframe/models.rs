//! Geometry types for face-following reframing.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn cy(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Scale coordinates from one resolution to another.
    pub fn scale(&self, sx: f64, sy: f64) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// A detected face in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub bbox: BoundingBox,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
}

impl FaceBox {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self { bbox, confidence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_center_and_scale() {
        let bbox = BoundingBox::new(100.0, 50.0, 40.0, 60.0);
        assert_eq!((bbox.cx(), bbox.cy()), (120.0, 80.0));
        assert_eq!(bbox.area(), 2400.0);
        let scaled = bbox.scale(3.0, 2.0);
        assert_eq!((scaled.cx(), scaled.cy()), (360.0, 160.0));
    }

    #[test]
    fn test_bbox_validity() {
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(0.0, 0.0, 0.0, 1.0).is_valid());
        assert!(!BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0).is_valid());
    }
}
