//! Pipeline error types.

use clipper_media::MediaError;
use clipper_models::{PipelineStage, SegmentFailure};
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure talking to the analysis model.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("credentials rejected: {0}")]
    Auth(String),

    #[error("quota exhausted: {0}")]
    Quota(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("model not available: {0}")]
    ModelNotFound(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("uploaded video could not be processed: {0}")]
    FileProcessing(String),

    #[error("response contained no text")]
    EmptyResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    /// Operator-facing hint on how to resolve the failure.
    pub fn guidance(&self) -> &'static str {
        match self {
            AnalysisError::Auth(_) => "check that GEMINI_API_KEY is set and valid",
            AnalysisError::Quota(_) => {
                "check the Gemini API quota and billing for this key, then try again later"
            }
            AnalysisError::Transport(_) => {
                "check network connectivity to generativelanguage.googleapis.com"
            }
            AnalysisError::ModelNotFound(_) => "check CLIPPER_GEMINI_MODELS names a model available to this key",
            AnalysisError::FileProcessing(_) => "the analysis service could not decode the video; try another source",
            _ => "check GEMINI_API_KEY, quota and the Gemini service status",
        }
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        AnalysisError::Transport(e.to_string())
    }
}

/// Run-level errors. Any of these ends the run without clips.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not fetch source: {0}")]
    SourceFetch(#[source] MediaError),

    #[error("Unreadable media: {0}")]
    UnreadableMedia(#[source] MediaError),

    #[error("Analysis unavailable ({source}); {guidance}")]
    AnalysisUnavailable {
        #[source]
        source: AnalysisError,
        guidance: &'static str,
    },

    #[error("No segments found: {0}")]
    NoSegmentsFound(String),

    #[error("All {} segments failed", .failures.len())]
    AllSegmentsFailed { failures: Vec<SegmentFailure> },

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn no_segments(msg: impl Into<String>) -> Self {
        Self::NoSegmentsFound(msg.into())
    }

    /// Map a probe failure, keeping cancellation distinct.
    pub fn unreadable(e: MediaError) -> Self {
        match e {
            MediaError::Cancelled => Self::Cancelled,
            other => Self::UnreadableMedia(other),
        }
    }

    pub fn source_fetch(e: MediaError) -> Self {
        match e {
            MediaError::Cancelled => Self::Cancelled,
            other => Self::SourceFetch(other),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::Config(_) => "config",
            PipelineError::SourceFetch(_) => "source_fetch",
            PipelineError::UnreadableMedia(_) => "unreadable_media",
            PipelineError::AnalysisUnavailable { .. } => "analysis_unavailable",
            PipelineError::NoSegmentsFound(_) => "no_segments_found",
            PipelineError::AllSegmentsFailed { .. } => "all_segments_failed",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Io(_) => "io",
        }
    }
}

impl From<AnalysisError> for PipelineError {
    fn from(source: AnalysisError) -> Self {
        let guidance = source.guidance();
        PipelineError::AnalysisUnavailable { source, guidance }
    }
}

/// Failure of a single segment; recorded, never fatal to the run.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("extraction failed: {0}")]
    Extraction(#[source] MediaError),

    #[error("face tracking failed: {0}")]
    Tracking(#[source] MediaError),

    #[error("reframe failed: {0}")]
    Reframe(#[source] MediaError),

    #[error("cancelled")]
    Cancelled,
}

impl SegmentError {
    pub fn extraction(e: MediaError) -> Self {
        match e {
            MediaError::Cancelled => Self::Cancelled,
            other => Self::Extraction(other),
        }
    }

    pub fn tracking(e: MediaError) -> Self {
        match e {
            MediaError::Cancelled => Self::Cancelled,
            other => Self::Tracking(other),
        }
    }

    pub fn reframe(e: MediaError) -> Self {
        match e {
            MediaError::Cancelled => Self::Cancelled,
            other => Self::Reframe(other),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            SegmentError::Extraction(_) | SegmentError::Cancelled => PipelineStage::Extracting,
            SegmentError::Tracking(_) => PipelineStage::Tracking,
            SegmentError::Reframe(_) => PipelineStage::Reframing,
        }
    }
}
