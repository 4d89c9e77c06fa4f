#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the clip pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with progress, timeout and cancellation
//! - Source probing and remote download
//! - Analysis proxy compression
//! - Frame-accurate clip extraction with write-then-rename outputs
//! - Face-following vertical reframing

pub mod clip;
pub mod command;
pub mod compress;
pub mod download;
pub mod error;
pub mod frames;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod reframe;

pub use clip::{ClipExtractor, CutRange};
pub use command::{
    check_ffmpeg, check_ffprobe, check_ytdlp, wait_for_cancel, FfmpegCommand, FfmpegRunner,
};
pub use compress::{prepare_analysis_proxy, AnalysisProxy, ProxyPolicy};
pub use download::{download_source, is_remote_source};
pub use error::{MediaError, MediaResult};
pub use frames::{FrameStream, SampledFrame, SamplePlan};
pub use fs_utils::{move_file, PartialOutput};
pub use probe::{probe_source, SourceVideo};
pub use progress::FfmpegProgress;
pub use reframe::{
    ClipGeometry, CropPlanner, FaceBox, FaceDetector, FaceTracker, NullFaceDetector,
    TrackingConfig, TrajectorySmoother, VerticalReframer, VerticalRenderer,
};
