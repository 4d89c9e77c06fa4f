//! Sampled face observation over a clip.

use std::path::Path;

use clipper_models::FaceObservation;
use tracing::{debug, warn};

use super::config::TrackingConfig;
use super::detector::{select_primary_face, FaceDetector};
use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};
use crate::frames::{FrameStream, SampledFrame, SamplePlan};

/// Runs a [`FaceDetector`] over every `detection_stride`-th frame of a clip.
pub struct FaceTracker {
    config: TrackingConfig,
    runner: FfmpegRunner,
}

impl FaceTracker {
    pub fn new(config: TrackingConfig, runner: FfmpegRunner) -> Self {
        Self {
            config: config.normalized(),
            runner,
        }
    }

    /// Observe the primary face in `clip`.
    ///
    /// Coordinates are returned in source pixels (`width` x `height`). Frames
    /// without an acceptable face yield a zero-confidence, frame-centered
    /// observation. A detector error on a single frame counts as no face;
    /// the call fails only when the detector errors on every sampled frame.
    pub async fn observe(
        &self,
        clip: &Path,
        width: u32,
        height: u32,
        detector: &dyn FaceDetector,
    ) -> MediaResult<Vec<FaceObservation>> {
        let plan = SamplePlan::new(
            width,
            height,
            self.config.detection_stride,
            self.config.analysis_height,
        );
        let mut log = ObservationLog::new(
            detector,
            self.config.min_confidence,
            (width, height),
            plan.scale_to(width, height),
        );

        let mut stream = FrameStream::open(&self.runner, clip, plan);
        while let Some(frame) = stream.next_frame().await {
            log.record(&frame).await;
        }
        let decoded = stream.finish().await?;
        debug!("Decoded {} sampled frames from {}", decoded, clip.display());

        log.finish()
    }
}

/// Per-frame detection results for one clip.
struct ObservationLog<'a> {
    detector: &'a dyn FaceDetector,
    min_confidence: f64,
    /// Source frame size
    size: (u32, u32),
    /// Sampled-to-source scale factors
    scale: (f64, f64),
    observations: Vec<FaceObservation>,
    failures: usize,
    last_error: Option<MediaError>,
}

impl<'a> ObservationLog<'a> {
    fn new(
        detector: &'a dyn FaceDetector,
        min_confidence: f64,
        size: (u32, u32),
        scale: (f64, f64),
    ) -> Self {
        Self {
            detector,
            min_confidence,
            size,
            scale,
            observations: Vec::new(),
            failures: 0,
            last_error: None,
        }
    }

    async fn record(&mut self, frame: &SampledFrame) {
        let faces = match self.detector.detect(&frame.image).await {
            Ok(faces) => faces,
            Err(e) => {
                debug!(frame = frame.frame_index, "Face detection failed: {}", e);
                self.failures += 1;
                self.last_error = Some(e);
                Vec::new()
            }
        };

        let (width, height) = self.size;
        let observation = match select_primary_face(&faces, self.min_confidence) {
            Some(face) => {
                let bbox = face.bbox.scale(self.scale.0, self.scale.1);
                FaceObservation::face(
                    frame.frame_index,
                    bbox.cx().clamp(0.0, width as f64),
                    bbox.cy().clamp(0.0, height as f64),
                    face.confidence.max(f64::MIN_POSITIVE),
                )
            }
            None => FaceObservation::missing(frame.frame_index, width, height),
        };
        self.observations.push(observation);
    }

    fn finish(self) -> MediaResult<Vec<FaceObservation>> {
        let sampled = self.observations.len();
        if self.failures > 0 && self.failures == sampled {
            if let Some(e) = self.last_error {
                return Err(MediaError::detection_failed(format!(
                    "{} failed on all {} sampled frames: {}",
                    self.detector.name(),
                    self.failures,
                    e
                )));
            }
        }
        if self.failures > 0 {
            warn!(
                "{} failed on {}/{} sampled frames, treated as no face",
                self.detector.name(),
                self.failures,
                sampled
            );
        }

        let with_face = self.observations.iter().filter(|o| o.has_face()).count();
        debug!("Observed {} sampled frames, face in {}", sampled, with_face);
        Ok(self.observations)
    }
}
