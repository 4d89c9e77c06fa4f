//! Face observations, crop-center trajectories and crop rectangles.
//!
//! All coordinates are in source-frame pixels with the origin at the
//! top-left corner.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Primary-face position at a sampled frame.
///
/// When no face was found, `confidence` is 0 and the center is the
/// geometric center of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FaceObservation {
    pub frame_index: u64,
    pub center_x: f64,
    pub center_y: f64,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
}

impl FaceObservation {
    pub fn face(frame_index: u64, center_x: f64, center_y: f64, confidence: f64) -> Self {
        Self {
            frame_index,
            center_x,
            center_y,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Observation for a frame with no detected face.
    pub fn missing(frame_index: u64, frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_index,
            center_x: frame_width as f64 / 2.0,
            center_y: frame_height as f64 / 2.0,
            confidence: 0.0,
        }
    }

    pub fn has_face(&self) -> bool {
        self.confidence > 0.0
    }
}

/// Smoothed crop center for one output frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrajectoryPoint {
    pub frame_index: u64,
    pub center_x: f64,
    pub center_y: f64,
}

/// Crop-center trajectory with exactly one point per output frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct CropTrajectory {
    points: Vec<TrajectoryPoint>,
}

impl CropTrajectory {
    /// Build from per-frame centers; frame indices are assigned 0..n.
    pub fn from_centers(centers: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let points = centers
            .into_iter()
            .enumerate()
            .map(|(i, (center_x, center_y))| TrajectoryPoint {
                frame_index: i as u64,
                center_x,
                center_y,
            })
            .collect();
        Self { points }
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Crop center at an arbitrary (possibly fractional) frame position.
    ///
    /// Linearly interpolates between neighbouring points and holds the
    /// first/last point outside the covered range.
    pub fn center_at(&self, frame: f64) -> Option<(f64, f64)> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if !frame.is_finite() || frame <= 0.0 {
            return Some((first.center_x, first.center_y));
        }
        let max = (self.points.len() - 1) as f64;
        if frame >= max {
            return Some((last.center_x, last.center_y));
        }
        let lo = frame.floor() as usize;
        let t = frame - lo as f64;
        let a = self.points[lo];
        let b = self.points[lo + 1];
        Some((
            a.center_x + (b.center_x - a.center_x) * t,
            a.center_y + (b.center_y - a.center_y) * t,
        ))
    }

    /// Largest per-frame Euclidean displacement of the crop center.
    pub fn max_step(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| (w[1].center_x - w[0].center_x).hypot(w[1].center_y - w[0].center_y))
            .fold(0.0, f64::max)
    }
}

/// Crop window for a single output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CropRect {
    pub frame_index: u64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// True when the rectangle lies entirely within a `width x height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_observation_is_centered() {
        let obs = FaceObservation::missing(4, 1920, 1080);
        assert_eq!((obs.center_x, obs.center_y), (960.0, 540.0));
        assert!(!obs.has_face());
        assert!(FaceObservation::face(0, 1.0, 1.0, 1.5).has_face());
    }

    #[test]
    fn test_center_at_interpolates() {
        let traj = CropTrajectory::from_centers(vec![(0.0, 0.0), (10.0, 20.0), (10.0, 20.0)]);
        assert_eq!(traj.center_at(0.5), Some((5.0, 10.0)));
        assert_eq!(traj.center_at(-3.0), Some((0.0, 0.0)));
        assert_eq!(traj.center_at(99.0), Some((10.0, 20.0)));
        assert_eq!(CropTrajectory::default().center_at(0.0), None);
    }

    #[test]
    fn test_max_step() {
        let traj = CropTrajectory::from_centers(vec![(0.0, 0.0), (3.0, 4.0), (4.0, 4.0)]);
        assert!((traj.max_step() - 5.0).abs() < 1e-9);
        assert_eq!(traj.points()[2].frame_index, 2);
    }

    #[test]
    fn test_crop_rect_fits() {
        let rect = CropRect { frame_index: 0, x: 1312, y: 0, width: 608, height: 1080 };
        assert!(rect.fits_within(1920, 1080));
        assert!(!CropRect { x: 1313, ..rect }.fits_within(1920, 1080));
    }
}
