//! Reconciliation of proposed segments against the real source.

use tracing::debug;

use clipper_models::{ClipLengthPolicy, Segment, SegmentCandidate};

/// Turn model candidates into at most `k` valid segments.
///
/// Pure and deterministic. Candidates are processed in model order:
/// inverted or non-finite bounds are dropped, bounds are clamped into
/// `[0, duration]`, segments shorter than the minimum are dropped, longer
/// ones are truncated from their start, and near-exact duplicates of an
/// earlier segment are dropped. Overlapping segments are kept.
pub fn reconcile(
    candidates: &[SegmentCandidate],
    duration: f64,
    policy: &ClipLengthPolicy,
    k: usize,
) -> Vec<Segment> {
    let mut kept: Vec<Segment> = Vec::with_capacity(k.min(candidates.len()));

    for candidate in candidates {
        if kept.len() >= k {
            break;
        }
        let Some((start, end)) = clamp_bounds(candidate, duration, policy) else {
            debug!(
                "Discarding candidate {:.2}..{:.2} '{}'",
                candidate.start, candidate.end, candidate.label
            );
            continue;
        };

        let duplicate = kept.iter().any(|s| {
            (s.start - start).abs() <= policy.duplicate_tolerance
                && (s.end - end).abs() <= policy.duplicate_tolerance
        });
        if duplicate {
            debug!("Discarding duplicate candidate {:.2}..{:.2}", start, end);
            continue;
        }

        kept.push(Segment {
            index: kept.len() + 1,
            start,
            end,
            label: candidate.label.trim().to_string(),
            rationale: candidate.rationale.clone(),
            virality_score: candidate.virality_score,
        });
    }

    kept
}

fn clamp_bounds(
    candidate: &SegmentCandidate,
    duration: f64,
    policy: &ClipLengthPolicy,
) -> Option<(f64, f64)> {
    let (start, end) = (candidate.start, candidate.end);
    if !start.is_finite() || !end.is_finite() || end <= start {
        return None;
    }

    let start = start.max(0.0);
    if start >= duration {
        return None;
    }
    let end = end.min(duration);

    if end - start < policy.min_clip_len {
        return None;
    }
    Some((start, end.min(start + policy.max_clip_len)))
}
