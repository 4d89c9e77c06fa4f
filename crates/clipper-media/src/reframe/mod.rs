//! Face-following vertical reframing.
//!
//! - [`FaceTracker`]: sampled face detection over a clip
//! - [`TrajectorySmoother`]: EMA + velocity-capped crop-center path
//! - [`CropPlanner`]: fixed-size 9:16 crop rectangles kept inside the frame
//! - [`VerticalRenderer`]: single-pass dynamic crop encode

pub mod config;
pub mod crop_planner;
pub mod detector;
pub mod models;
pub mod renderer;
pub mod smoother;
pub mod tracker;

pub use config::TrackingConfig;
pub use crop_planner::CropPlanner;
pub use detector::{select_primary_face, FaceDetector, NullFaceDetector};
pub use models::{BoundingBox, FaceBox};
pub use renderer::VerticalRenderer;
pub use smoother::TrajectorySmoother;
pub use tracker::FaceTracker;

use std::path::{Path, PathBuf};

use clipper_models::{CropTrajectory, EncodingConfig};
use tracing::debug;

use crate::command::FfmpegRunner;
use crate::error::MediaResult;

/// Geometry of the clip being reframed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipGeometry {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Clip duration in seconds
    pub duration: f64,
}

impl ClipGeometry {
    pub fn frame_count(&self) -> u64 {
        (self.duration * self.fps).round().max(1.0) as u64
    }
}

/// Tracker, smoother, planner and renderer wired together.
pub struct VerticalReframer {
    config: TrackingConfig,
    tracker: FaceTracker,
    smoother: TrajectorySmoother,
    renderer: VerticalRenderer,
}

impl VerticalReframer {
    pub fn new(config: TrackingConfig, runner: FfmpegRunner, encoding: EncodingConfig) -> Self {
        let config = config.normalized();
        Self {
            tracker: FaceTracker::new(config.clone(), runner.clone()),
            smoother: TrajectorySmoother::new(&config),
            renderer: VerticalRenderer::new(runner, encoding),
            config,
        }
    }

    /// Track the primary face in `clip` and build its crop trajectory.
    pub async fn track(
        &self,
        clip: &Path,
        geometry: ClipGeometry,
        detector: &dyn FaceDetector,
    ) -> MediaResult<CropTrajectory> {
        let observations = self
            .tracker
            .observe(clip, geometry.width, geometry.height, detector)
            .await?;
        let trajectory = self.smoother.smooth(
            &observations,
            geometry.frame_count(),
            geometry.width,
            geometry.height,
        );
        debug!(
            "Trajectory for {}: {} frames, max step {:.2}px",
            clip.display(),
            trajectory.len(),
            trajectory.max_step()
        );
        Ok(trajectory)
    }

    /// Render `clip` to vertical format along `trajectory`.
    pub async fn render<F>(
        &self,
        clip: &Path,
        geometry: ClipGeometry,
        trajectory: &CropTrajectory,
        dest: &Path,
        on_progress: F,
    ) -> MediaResult<PathBuf>
    where
        F: Fn(f64) + Send + 'static,
    {
        let planner = CropPlanner::new(geometry.width, geometry.height, self.config.aspect);
        let rects = planner.plan(trajectory, geometry.frame_count());
        self.renderer
            .render(clip, &rects, geometry.fps, geometry.duration, dest, on_progress)
            .await
    }
}
