//! Shared data models for the clip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Segment candidates proposed by the analysis model and reconciled segments
//! - Output formats and aspect ratios
//! - Face observations, crop trajectories and crop rectangles
//! - Run reports and progress events
//! - Encoding configuration

pub mod encoding;
pub mod format;
pub mod progress;
pub mod report;
pub mod run;
pub mod segment;
pub mod timestamp;
pub mod tracking;

// Re-export common types
pub use encoding::EncodingConfig;
pub use format::{AspectRatio, ClipFormat, ClipFormatParseError};
pub use progress::{PipelineStage, ProgressEvent, StageStatus};
pub use report::{OutputClip, RunReport, SegmentFailure};
pub use run::RunId;
pub use segment::{ClipLengthPolicy, Segment, SegmentCandidate};
pub use timestamp::{format_seconds, parse_timestamp, TimestampError};
pub use tracking::{CropRect, CropTrajectory, FaceObservation, TrajectoryPoint};
