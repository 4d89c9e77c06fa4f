//! Progress events emitted while a run is in flight.
//!
//! Events are advisory; consumers may drop or ignore them.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage an event or failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    FetchingSource,
    Probing,
    Preprocessing,
    Analyzing,
    Reconciling,
    Extracting,
    Tracking,
    Reframing,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::FetchingSource => "fetching_source",
            PipelineStage::Probing => "probing",
            PipelineStage::Preprocessing => "preprocessing",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Reconciling => "reconciling",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Tracking => "tracking",
            PipelineStage::Reframing => "reframing",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Started,
    /// Percentage in [0, 100]
    Progress(f64),
    Completed,
    Failed,
}

/// Progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Run-level stage change (segment-independent)
    Stage {
        stage: PipelineStage,
        status: StageStatus,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    /// Per-segment stage change
    Segment {
        segment: usize,
        stage: PipelineStage,
        status: StageStatus,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    /// Free-form message
    Log {
        message: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn stage(stage: PipelineStage, status: StageStatus) -> Self {
        Self::Stage {
            stage,
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn segment(segment: usize, stage: PipelineStage, status: StageStatus) -> Self {
        Self::Segment {
            segment,
            stage,
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
