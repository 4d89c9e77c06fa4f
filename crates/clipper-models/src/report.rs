//! Run outcome types.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::format::ClipFormat;
use crate::progress::PipelineStage;
use crate::run::RunId;
use crate::segment::Segment;

/// A finished clip on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputClip {
    pub path: PathBuf,
    pub format: ClipFormat,
    pub segment: Segment,
}

/// A segment that could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentFailure {
    pub segment: Segment,
    /// Stage in which the segment failed
    pub stage: PipelineStage,
    pub reason: String,
}

/// Result of a pipeline run with at least one produced clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub run_id: RunId,
    pub format: ClipFormat,
    /// Clip count requested by the caller
    pub requested_clips: usize,
    /// Candidates parsed from the analysis response before reconciliation
    pub proposed_candidates: usize,
    /// Clips in segment order
    pub clips: Vec<OutputClip>,
    /// Failed segments in segment order
    pub failures: Vec<SegmentFailure>,
}

impl RunReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}
