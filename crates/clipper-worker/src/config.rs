//! Pipeline configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clipper_media::{ProxyPolicy, TrackingConfig};
use clipper_models::{ClipLengthPolicy, EncodingConfig};

use crate::error::{PipelineError, PipelineResult};

/// Allowed range for the requested clip count.
pub const MIN_CLIP_COUNT: usize = 1;
pub const MAX_CLIP_COUNT: usize = 10;
pub const DEFAULT_CLIP_COUNT: usize = 3;

/// Pipeline configuration, passed explicitly to [`crate::ClipPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Clip length bounds and duplicate tolerance
    pub clip_policy: ClipLengthPolicy,
    /// When and how to build the analysis proxy
    pub proxy: ProxyPolicy,
    /// Face tracking and crop-path settings
    pub tracking: TrackingConfig,
    /// Encoder settings for extracted and reframed clips
    pub encoding: EncodingConfig,
    /// Segments processed concurrently
    pub max_parallel_segments: usize,
    /// Extra attempts for a failed extraction or render
    pub extraction_retries: u32,
    /// Per-FFmpeg-process timeout
    pub ffmpeg_timeout: Duration,
    /// Parent of the per-run work directories
    pub work_dir: PathBuf,
    /// Where finished clips are written, one subdirectory per run
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clip_policy: ClipLengthPolicy::default(),
            proxy: ProxyPolicy::default(),
            tracking: TrackingConfig::default(),
            encoding: EncodingConfig::default(),
            max_parallel_segments: 2,
            extraction_retries: 1,
            ffmpeg_timeout: Duration::from_secs(1800),
            work_dir: std::env::temp_dir().join("clipper"),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl PipelineConfig {
    /// Create config from `CLIPPER_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            clip_policy: ClipLengthPolicy {
                min_clip_len: env_or("CLIPPER_MIN_CLIP_SECS", d.clip_policy.min_clip_len),
                max_clip_len: env_or("CLIPPER_MAX_CLIP_SECS", d.clip_policy.max_clip_len),
                duplicate_tolerance: env_or(
                    "CLIPPER_DUPLICATE_TOLERANCE_SECS",
                    d.clip_policy.duplicate_tolerance,
                ),
            },
            proxy: ProxyPolicy {
                long_duration_secs: env_or("CLIPPER_PROXY_LONG_SECS", d.proxy.long_duration_secs),
                large_size_bytes: env_or("CLIPPER_PROXY_LARGE_BYTES", d.proxy.large_size_bytes),
                max_long_edge: env_or("CLIPPER_PROXY_MAX_EDGE", d.proxy.max_long_edge),
                max_fps: env_or("CLIPPER_PROXY_FPS", d.proxy.max_fps),
                ..d.proxy
            },
            tracking: TrackingConfig {
                detection_stride: env_or("CLIPPER_DETECTION_STRIDE", d.tracking.detection_stride),
                analysis_height: env_or("CLIPPER_ANALYSIS_HEIGHT", d.tracking.analysis_height),
                min_confidence: env_or("CLIPPER_FACE_MIN_CONFIDENCE", d.tracking.min_confidence),
                smoothing_alpha: env_or("CLIPPER_SMOOTHING_ALPHA", d.tracking.smoothing_alpha),
                max_velocity: env_or("CLIPPER_MAX_VELOCITY", d.tracking.max_velocity),
                max_missing_frames: env_or("CLIPPER_MAX_MISSING_FRAMES", d.tracking.max_missing_frames),
                ..d.tracking
            },
            encoding: EncodingConfig {
                preset: env_or("CLIPPER_PRESET", d.encoding.preset.clone()),
                crf: env_or("CLIPPER_CRF", d.encoding.crf),
                ..d.encoding
            },
            max_parallel_segments: env_or("CLIPPER_MAX_PARALLEL", d.max_parallel_segments),
            extraction_retries: env_or("CLIPPER_EXTRACTION_RETRIES", d.extraction_retries),
            ffmpeg_timeout: Duration::from_secs(env_or(
                "CLIPPER_FFMPEG_TIMEOUT_SECS",
                d.ffmpeg_timeout.as_secs(),
            )),
            work_dir: env_or("CLIPPER_WORK_DIR", d.work_dir),
            output_dir: env_or("CLIPPER_OUTPUT_DIR", d.output_dir),
        }
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> PipelineResult<()> {
        let policy = &self.clip_policy;
        if !(policy.min_clip_len.is_finite() && policy.min_clip_len > 0.0) {
            return Err(PipelineError::config("minimum clip length must be positive"));
        }
        if !(policy.max_clip_len.is_finite() && policy.max_clip_len >= policy.min_clip_len) {
            return Err(PipelineError::config(format!(
                "maximum clip length ({}) must be at least the minimum ({})",
                policy.max_clip_len, policy.min_clip_len
            )));
        }
        if !(policy.duplicate_tolerance >= 0.0) {
            return Err(PipelineError::config("duplicate tolerance must be non-negative"));
        }
        if self.max_parallel_segments == 0 {
            return Err(PipelineError::config("max_parallel_segments must be at least 1"));
        }
        Ok(())
    }
}

/// Check a requested clip count against the supported range.
pub fn validate_clip_count(k: usize) -> PipelineResult<usize> {
    if (MIN_CLIP_COUNT..=MAX_CLIP_COUNT).contains(&k) {
        Ok(k)
    } else {
        Err(PipelineError::invalid_request(format!(
            "clip count must be between {} and {}, got {}",
            MIN_CLIP_COUNT, MAX_CLIP_COUNT, k
        )))
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.clip_policy.min_clip_len, 15.0);
        assert_eq!(config.clip_policy.max_clip_len, 60.0);
        assert_eq!(config.extraction_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_lengths() {
        let mut config = PipelineConfig::default();
        config.clip_policy.max_clip_len = 5.0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut config = PipelineConfig::default();
        config.max_parallel_segments = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clip_count_range() {
        assert_eq!(validate_clip_count(3).unwrap(), 3);
        assert!(validate_clip_count(1).is_ok());
        assert!(validate_clip_count(10).is_ok());
        assert!(matches!(validate_clip_count(0), Err(PipelineError::InvalidRequest(_))));
        assert!(validate_clip_count(11).is_err());
    }

    #[test]
    fn test_env_or_fallback() {
        assert_eq!(env_or("CLIPPER_TEST_UNSET_VARIABLE", 7u32), 7);
    }
}
