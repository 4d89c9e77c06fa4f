//! Configuration for face tracking and vertical reframing.

use clipper_models::AspectRatio;
use serde::{Deserialize, Serialize};

/// Face tracking and crop-path settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Run face detection on every Nth frame (default: 3)
    pub detection_stride: u32,

    /// Height frames are decoded at for detection (default: 360)
    pub analysis_height: u32,

    /// Faces below this confidence are ignored (default: 0.5)
    pub min_confidence: f64,

    /// EMA weight of the newest target, in (0, 1] (default: 0.15)
    pub smoothing_alpha: f64,

    /// Maximum crop-center movement in source pixels per frame (default: 12.0)
    pub max_velocity: f64,

    /// Frames without a face before the crop drifts back to center (default: 45)
    pub max_missing_frames: u64,

    /// Output aspect ratio (default: 9:16)
    pub aspect: AspectRatio,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            detection_stride: 3,
            analysis_height: 360,
            min_confidence: 0.5,
            smoothing_alpha: 0.15,
            max_velocity: 12.0,
            max_missing_frames: 45,
            aspect: AspectRatio::PORTRAIT,
        }
    }
}

impl TrackingConfig {
    /// Clamp values into their usable ranges.
    ///
    /// The missing-face window is never shorter than the detection stride,
    /// otherwise consecutive samples of a visible face would count as a gap.
    pub fn normalized(mut self) -> Self {
        self.detection_stride = self.detection_stride.max(1);
        self.analysis_height = self.analysis_height.max(64);
        self.min_confidence = self.min_confidence.clamp(0.0, 1.0);
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            self.smoothing_alpha = Self::default().smoothing_alpha;
        }
        if !(self.max_velocity.is_finite() && self.max_velocity > 0.0) {
            self.max_velocity = Self::default().max_velocity;
        }
        self.max_missing_frames = self.max_missing_frames.max(self.detection_stride as u64);
        self
    }
}
