//! Segment proposal through the analysis model.

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use clipper_models::{ClipFormat, ClipLengthPolicy, SegmentCandidate};

use crate::error::{AnalysisError, PipelineError, PipelineResult};
use crate::parser::parse_candidates;

/// Multimodal model that watches a video and answers a prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Submit `video` with `prompt` and return the raw response text.
    async fn analyze(&self, video: &Path, prompt: &str) -> Result<String, AnalysisError>;
}

/// Asks the analysis model for candidate segments.
pub struct SegmentProposer<'a> {
    client: &'a dyn AnalysisClient,
    policy: ClipLengthPolicy,
}

impl<'a> SegmentProposer<'a> {
    pub fn new(client: &'a dyn AnalysisClient, policy: ClipLengthPolicy) -> Self {
        Self { client, policy }
    }

    /// Propose up to `k` segments for the video at `proxy`.
    ///
    /// Calls the model exactly once. Transport, auth and quota failures
    /// become `AnalysisUnavailable`; a response with nothing parseable
    /// becomes `NoSegmentsFound`.
    pub async fn propose(
        &self,
        proxy: &Path,
        k: usize,
        format: ClipFormat,
    ) -> PipelineResult<Vec<SegmentCandidate>> {
        let prompt = build_prompt(k, format, &self.policy);
        let response = self.client.analyze(proxy, &prompt).await?;

        let candidates = parse_candidates(&response);
        if candidates.is_empty() {
            warn!(
                "Analysis response had no usable segments: {}",
                truncate(&response, 300)
            );
            return Err(PipelineError::no_segments(
                "the analysis model returned no parseable segments",
            ));
        }

        info!("Analysis proposed {} candidate segments", candidates.len());
        Ok(candidates)
    }
}

/// Prompt asking for exactly `k` segments as a JSON array.
pub fn build_prompt(k: usize, format: ClipFormat, policy: &ClipLengthPolicy) -> String {
    let framing = match format {
        ClipFormat::Vertical => {
            "The clips will be cropped to vertical 9:16 around the main speaker's face, \
             so prefer moments where one person is clearly on screen."
        }
        ClipFormat::Horizontal => "The clips will keep the original horizontal framing.",
    };
    let (min, max) = (policy.min_clip_len, policy.max_clip_len);

    format!(
        r#"You are an expert short-form video editor. Watch this video and find the {k} moments most likely to go viral as standalone clips.

{framing}

Rules:
- Return exactly {k} segments that do not overlap.
- Each segment must be between {min:.0} and {max:.0} seconds long.
- Each segment must start and end at natural boundaries (not mid-sentence).
- Times are seconds from the start of the video.

Return ONLY a JSON array and nothing else, in this shape:
[
  {{
    "start_seconds": 12.5,
    "end_seconds": 48.0,
    "label": "Short catchy title",
    "rationale": "Why this moment will engage viewers",
    "virality_score": 8
  }}
]
virality_score is an integer from 1 (weak) to 10 (certain hit)."#
    )
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
