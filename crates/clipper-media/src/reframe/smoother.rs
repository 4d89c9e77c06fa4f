//! Crop-center trajectory smoothing.
//!
//! Sparse face observations become one crop center per output frame:
//! 1. targets are interpolated between face samples and held across short
//!    gaps, drifting to the frame center once a gap exceeds the missing-face
//!    window
//! 2. a causal EMA follows the target
//! 3. each per-frame step is capped at the configured velocity

use clipper_models::{CropTrajectory, FaceObservation};

use super::config::TrackingConfig;

/// Turns observations into a stable crop-center trajectory.
#[derive(Debug, Clone)]
pub struct TrajectorySmoother {
    alpha: f64,
    max_velocity: f64,
    max_missing_frames: u64,
}

impl TrajectorySmoother {
    pub fn new(config: &TrackingConfig) -> Self {
        let config = config.clone().normalized();
        Self {
            alpha: config.smoothing_alpha,
            max_velocity: config.max_velocity,
            max_missing_frames: config.max_missing_frames,
        }
    }

    /// Build a trajectory with exactly `frame_count` points.
    pub fn smooth(
        &self,
        observations: &[FaceObservation],
        frame_count: u64,
        width: u32,
        height: u32,
    ) -> CropTrajectory {
        let center = (width as f64 / 2.0, height as f64 / 2.0);
        let mut faces: Vec<&FaceObservation> = observations.iter().filter(|o| o.has_face()).collect();
        faces.sort_by_key(|o| o.frame_index);

        let mut centers = Vec::with_capacity(frame_count as usize);
        let mut state: Option<(f64, f64)> = None;
        // Index of the first face sample after the current frame.
        let mut next = 0usize;

        for frame in 0..frame_count {
            while next < faces.len() && faces[next].frame_index <= frame {
                next += 1;
            }
            let prev = next.checked_sub(1).map(|i| faces[i]);
            let upcoming = faces.get(next).copied();
            let target = self.target(frame, prev, upcoming, center);

            let point = match state {
                None => target,
                Some((x, y)) => {
                    let mut dx = self.alpha * (target.0 - x);
                    let mut dy = self.alpha * (target.1 - y);
                    let step = dx.hypot(dy);
                    if step > self.max_velocity {
                        let k = self.max_velocity / step;
                        dx *= k;
                        dy *= k;
                    }
                    (x + dx, y + dy)
                }
            };
            state = Some(point);
            centers.push(point);
        }

        CropTrajectory::from_centers(centers)
    }

    /// Raw (unsmoothed) target for `frame`.
    fn target(
        &self,
        frame: u64,
        prev: Option<&FaceObservation>,
        next: Option<&FaceObservation>,
        center: (f64, f64),
    ) -> (f64, f64) {
        let window = self.max_missing_frames;
        match (prev, next) {
            (Some(p), Some(n)) if n.frame_index - p.frame_index <= window => {
                let t = (frame - p.frame_index) as f64 / (n.frame_index - p.frame_index) as f64;
                (
                    p.center_x + (n.center_x - p.center_x) * t,
                    p.center_y + (n.center_y - p.center_y) * t,
                )
            }
            (Some(p), _) if frame - p.frame_index <= window => (p.center_x, p.center_y),
            (_, Some(n)) if n.frame_index - frame <= window => (n.center_x, n.center_y),
            _ => center,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 1920;
    const H: u32 = 1080;

    fn smoother() -> TrajectorySmoother {
        TrajectorySmoother::new(&TrackingConfig::default())
    }

    #[test]
    fn test_no_face_is_constant_center() {
        let observations: Vec<_> = (0..100).step_by(3).map(|f| FaceObservation::missing(f, W, H)).collect();
        let traj = smoother().smooth(&observations, 100, W, H);

        assert_eq!(traj.len(), 100);
        for p in traj.points() {
            assert_eq!((p.center_x, p.center_y), (960.0, 540.0));
        }
        assert_eq!(traj.max_step(), 0.0);
    }

    #[test]
    fn test_empty_observations() {
        let traj = smoother().smooth(&[], 10, W, H);
        assert_eq!(traj.len(), 10);
        assert_eq!(traj.max_step(), 0.0);
        assert!(smoother().smooth(&[], 0, W, H).is_empty());
    }

    #[test]
    fn test_velocity_bound_on_jump() {
        // Face teleports from the far left to the far right.
        let mut observations = Vec::new();
        for f in (0..300).step_by(3) {
            let x = if f < 150 { 100.0 } else { 1800.0 };
            observations.push(FaceObservation::face(f, x, 500.0, 0.9));
        }
        let traj = smoother().smooth(&observations, 300, W, H);

        assert!(traj.max_step() <= 12.0 + 1e-9);
        assert!(traj.points()[299].center_x > traj.points()[150].center_x);
    }

    #[test]
    fn test_velocity_bound_across_gap() {
        // Face visible, then a long gap, then visible somewhere else.
        let mut observations = vec![FaceObservation::face(0, 200.0, 200.0, 0.9)];
        for f in (3..200).step_by(3) {
            observations.push(FaceObservation::missing(f, W, H));
        }
        observations.push(FaceObservation::face(201, 1700.0, 900.0, 0.9));
        let traj = smoother().smooth(&observations, 260, W, H);

        assert!(traj.max_step() <= 12.0 + 1e-9);
    }

    #[test]
    fn test_decays_to_center_after_missing_window() {
        let observations = vec![FaceObservation::face(0, 200.0, 540.0, 0.9)];
        let traj = smoother().smooth(&observations, 600, W, H);

        // Held near the face while within the window.
        assert!((traj.points()[40].center_x - 200.0).abs() < 1e-9);
        // Far past the window the crop has returned to center.
        assert!((traj.points()[599].center_x - 960.0).abs() < 1.0);
    }

    #[test]
    fn test_steady_face_is_followed() {
        let observations: Vec<_> = (0..90).step_by(3).map(|f| FaceObservation::face(f, 1500.0, 400.0, 0.8)).collect();
        let traj = smoother().smooth(&observations, 90, W, H);
        assert_eq!((traj.points()[0].center_x, traj.points()[0].center_y), (1500.0, 400.0));
        assert_eq!(traj.max_step(), 0.0);
    }

    #[test]
    fn test_interpolates_between_samples() {
        let cfg = TrackingConfig {
            smoothing_alpha: 1.0,
            max_velocity: 1000.0,
            ..Default::default()
        };
        let observations = vec![
            FaceObservation::face(0, 100.0, 100.0, 0.9),
            FaceObservation::face(4, 140.0, 100.0, 0.9),
        ];
        let traj = TrajectorySmoother::new(&cfg).smooth(&observations, 5, W, H);
        let xs: Vec<f64> = traj.points().iter().map(|p| p.center_x).collect();
        assert_eq!(xs, vec![100.0, 110.0, 120.0, 130.0, 140.0]);
    }
}
