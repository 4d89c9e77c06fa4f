//! Face detection seam.

use async_trait::async_trait;
use image::RgbImage;

use super::models::FaceBox;
use crate::error::MediaResult;

/// Detects faces in a single RGB frame.
///
/// Boxes are in the pixel space of the frame passed in.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<FaceBox>>;

    /// Detector name for logging.
    fn name(&self) -> &'static str;
}

/// Detector that never finds a face.
///
/// Used when no detection service is configured; vertical clips then get a
/// steady center crop.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFaceDetector;

#[async_trait]
impl FaceDetector for NullFaceDetector {
    async fn detect(&self, _frame: &RgbImage) -> MediaResult<Vec<FaceBox>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Pick the face to follow: largest area, ties broken by confidence.
pub fn select_primary_face(faces: &[FaceBox], min_confidence: f64) -> Option<FaceBox> {
    faces
        .iter()
        .filter(|f| f.bbox.is_valid() && f.confidence >= min_confidence)
        .max_by(|a, b| {
            a.bbox
                .area()
                .total_cmp(&b.bbox.area())
                .then(a.confidence.total_cmp(&b.confidence))
        })
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reframe::models::BoundingBox;

    fn face(size: f64, confidence: f64) -> FaceBox {
        FaceBox::new(BoundingBox::new(10.0, 10.0, size, size), confidence)
    }

    #[test]
    fn test_largest_face_wins() {
        let faces = [face(20.0, 0.99), face(50.0, 0.6), face(30.0, 0.9)];
        assert_eq!(select_primary_face(&faces, 0.5), Some(faces[1]));
    }

    #[test]
    fn test_confidence_breaks_ties() {
        let faces = [face(40.0, 0.7), face(40.0, 0.95)];
        assert_eq!(select_primary_face(&faces, 0.5), Some(faces[1]));
    }

    #[test]
    fn test_low_confidence_and_degenerate_ignored() {
        let faces = [face(80.0, 0.2), face(0.0, 0.9)];
        assert_eq!(select_primary_face(&faces, 0.5), None);
        assert_eq!(select_primary_face(&[], 0.0), None);
    }

    #[tokio::test]
    async fn test_null_detector() {
        let frame = RgbImage::new(4, 4);
        assert!(NullFaceDetector.detect(&frame).await.unwrap().is_empty());
    }
}
