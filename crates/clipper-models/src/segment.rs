//! Segment candidates and reconciled segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A segment as proposed by the analysis model.
///
/// Values come straight from untrusted model output and may be out of
/// range, inverted or duplicated. The reconciler decides what survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentCandidate {
    /// Proposed start in seconds
    pub start: f64,
    /// Proposed end in seconds
    pub end: f64,
    /// Short title for the clip
    pub label: String,
    /// Why the model thinks this moment will engage viewers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Model's virality estimate (1-10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virality_score: Option<u8>,
}

impl SegmentCandidate {
    pub fn new(start: f64, end: f64, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            rationale: None,
            virality_score: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_score(mut self, score: u8) -> Self {
        self.virality_score = Some(score.clamp(1, 10));
        self
    }
}

/// A validated segment within the source bounds.
///
/// Always satisfies `0 <= start < end <= duration` and the clip length
/// policy it was reconciled under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// 1-based position in the final segment list
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virality_score: Option<u8>,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Filesystem-safe stem for outputs of this segment, e.g. `clip_02_big_reveal`.
    pub fn file_stem(&self) -> String {
        let mut slug = String::with_capacity(self.label.len());
        for c in self.label.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('_') && !slug.is_empty() {
                slug.push('_');
            }
            if slug.len() >= 40 {
                break;
            }
        }
        let slug = slug.trim_end_matches('_');
        if slug.is_empty() {
            format!("clip_{:02}", self.index)
        } else {
            format!("clip_{:02}_{}", self.index, slug)
        }
    }
}

/// Clip length bounds applied during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipLengthPolicy {
    /// Segments shorter than this are discarded (seconds)
    pub min_clip_len: f64,
    /// Segments longer than this are truncated from their start (seconds)
    pub max_clip_len: f64,
    /// Two segments whose starts and ends both lie within this distance
    /// are treated as the same segment (seconds)
    pub duplicate_tolerance: f64,
}

impl Default for ClipLengthPolicy {
    fn default() -> Self {
        Self {
            min_clip_len: 15.0,
            max_clip_len: 60.0,
            duplicate_tolerance: 0.5,
        }
    }
}
