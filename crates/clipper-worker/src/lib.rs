//! Viral clip pipeline.
//!
//! This crate provides:
//! - Segment proposal through the analysis model, with tolerant parsing
//! - Reconciliation of proposed segments against the source
//! - Bounded parallel extraction and vertical reframing
//! - Run-scoped cleanup, cancellation, progress events and metrics

pub mod analysis;
pub mod config;
pub mod error;
pub mod gemini;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod reconciler;
pub mod retry;
pub mod toolkit;

pub use analysis::{AnalysisClient, SegmentProposer};
pub use config::{PipelineConfig, DEFAULT_CLIP_COUNT, MAX_CLIP_COUNT, MIN_CLIP_COUNT};
pub use error::{AnalysisError, PipelineError, PipelineResult, SegmentError};
pub use gemini::{AnalysisConfig, GeminiClient};
pub use logging::RunLogger;
pub use parser::parse_candidates;
pub use pipeline::ClipPipeline;
pub use progress::ProgressSink;
pub use reconciler::reconcile;
pub use toolkit::{FfmpegToolkit, MediaToolkit, ProgressFn, ReframePlan};
