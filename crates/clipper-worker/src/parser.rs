//! Tolerant parsing of analysis model responses.
//!
//! Model output is untrusted text. Every element is read independently and
//! anything unusable is skipped, so one bad entry never costs the others.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use clipper_models::{parse_timestamp, SegmentCandidate};

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").unwrap());

static RANGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+(?::\d{1,2}){0,2}(?:\.\d+)?)\s*(?:-|–|—|\bto\b|,)\s*(\d+(?::\d{1,2}){0,2}(?:\.\d+)?)",
    )
    .unwrap()
});

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+").unwrap());

const ARRAY_KEYS: [&str; 3] = ["segments", "clips", "highlights"];
const START_KEYS: [&str; 3] = ["start_seconds", "start", "start_time"];
const END_KEYS: [&str; 3] = ["end_seconds", "end", "end_time"];
const LABEL_KEYS: [&str; 3] = ["label", "title", "summary"];
const RATIONALE_KEYS: [&str; 3] = ["rationale", "reason", "summary"];
const SCORE_KEYS: [&str; 2] = ["virality_score", "score"];

/// Extract segment candidates from a model response. Never fails.
pub fn parse_candidates(text: &str) -> Vec<SegmentCandidate> {
    let body = strip_fences(text);

    if let Some(elements) = json_elements(body) {
        let candidates: Vec<_> = elements.iter().filter_map(candidate_from_json).collect();
        debug!(
            "Parsed {} of {} JSON elements as candidates",
            candidates.len(),
            elements.len()
        );
        if !candidates.is_empty() {
            return candidates;
        }
    }

    let candidates: Vec<_> = body.lines().filter_map(candidate_from_line).collect();
    debug!("Parsed {} candidates from free-form lines", candidates.len());
    candidates
}

fn strip_fences(text: &str) -> &str {
    match FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}

/// The segment array held by `body`, if it is JSON at all.
///
/// Tolerates prose before or after the JSON value, including prose that
/// itself contains brackets.
fn json_elements(body: &str) -> Option<Vec<Value>> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return segment_elements(value);
    }
    let mut fallback = None;
    for value in embedded_values(body) {
        match segment_elements(value) {
            Some(items) if items.iter().any(Value::is_object) => return Some(items),
            Some(items) => fallback = fallback.or(Some(items)),
            None => {}
        }
    }
    fallback
}

fn segment_elements(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => {
            for key in ARRAY_KEYS {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Some(items);
                }
            }
            // A single segment object
            if first_present(&map, &START_KEYS).is_some() {
                return Some(vec![Value::Object(map)]);
            }
            Some(Vec::new())
        }
        _ => None,
    }
}

/// Every JSON value that starts at a `[` or `{` in `body`, in order.
///
/// Trailing text after a value is ignored.
fn embedded_values(body: &str) -> impl Iterator<Item = Value> + '_ {
    body.match_indices(['[', '{']).filter_map(move |(open, _)| {
        serde_json::Deserializer::from_str(&body[open..])
            .into_iter::<Value>()
            .next()
            .and_then(Result::ok)
    })
}

fn candidate_from_json(element: &Value) -> Option<SegmentCandidate> {
    let map = element.as_object()?;
    let start = first_present(map, &START_KEYS).and_then(seconds_value)?;
    let end = first_present(map, &END_KEYS).and_then(seconds_value)?;

    let label = first_present(map, &LABEL_KEYS)
        .and_then(text_value)
        .unwrap_or_default();
    let mut candidate = SegmentCandidate::new(start, end, label);

    if let Some(rationale) = first_present(map, &RATIONALE_KEYS).and_then(text_value) {
        candidate = candidate.with_rationale(rationale);
    }
    if let Some(score) = first_present(map, &SCORE_KEYS).and_then(score_value) {
        candidate = candidate.with_score(score);
    }
    Some(candidate)
}

fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

fn seconds_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_timestamp(s).ok(),
        _ => None,
    }
}

fn text_value(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn score_value(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| raw.round().clamp(0.0, 10.0) as u8)
}

fn candidate_from_line(line: &str) -> Option<SegmentCandidate> {
    let line = LIST_MARKER.replace(line.trim(), "");
    let caps = RANGE_LINE.captures(&line)?;
    let start = parse_timestamp(&caps[1]).ok()?;
    let end = parse_timestamp(&caps[2]).ok()?;

    let whole = caps.get(0)?;
    let rest = format!("{} {}", &line[..whole.start()], &line[whole.end()..]);
    let label = rest
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—' | '|' | '"'))
        .to_string();
    Some(SegmentCandidate::new(start, end, label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_array() {
        let text = r#"Here you go:
```json
[
  {"start_seconds": 12.5, "end_seconds": 40, "label": "Cold open", "rationale": "Strong hook", "virality_score": 8},
  {"start_seconds": 100, "end_seconds": 130, "label": "Punchline"}
]
```"#;
        let candidates = parse_candidates(text);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].start, 12.5);
        assert_eq!(candidates[0].end, 40.0);
        assert_eq!(candidates[0].label, "Cold open");
        assert_eq!(candidates[0].rationale.as_deref(), Some("Strong hook"));
        assert_eq!(candidates[0].virality_score, Some(8));
        assert_eq!(candidates[1].rationale, None);
    }

    #[test]
    fn test_object_with_highlights_and_timestamp_strings() {
        let text = r#"{"video_title": "Talk", "highlights": [
            {"title": "Reveal", "start": "00:01:30", "end": "00:02:05.500", "reason": "Twist", "score": "9"},
            {"title": "Outro", "start_time": "10:00", "end_time": "10:45"}
        ]}"#;
        let candidates = parse_candidates(text);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].start, 90.0);
        assert_eq!(candidates[0].end, 125.5);
        assert_eq!(candidates[0].label, "Reveal");
        assert_eq!(candidates[0].rationale.as_deref(), Some("Twist"));
        assert_eq!(candidates[0].virality_score, Some(9));
        assert_eq!(candidates[1].start, 600.0);
    }

    #[test]
    fn test_malformed_elements_are_skipped() {
        let text = r#"[
            {"start_seconds": 10, "end_seconds": 40, "label": "ok"},
            {"start_seconds": "soon", "end_seconds": 50},
            {"label": "no bounds"},
            "not an object",
            {"start": 70, "end": 95, "summary": "Summary doubles as label"}
        ]"#;
        let candidates = parse_candidates(text);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].label, "Summary doubles as label");
        assert_eq!(candidates[1].rationale.as_deref(), Some("Summary doubles as label"));
    }

    #[test]
    fn test_inverted_bounds_are_left_for_reconciler() {
        let candidates = parse_candidates(r#"[{"start": 50, "end": 20, "label": "x"}]"#);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].start, 50.0);
    }

    #[test]
    fn test_json_surrounded_by_prose() {
        let text = "Sure! The best moments are [{\"start\": 5, \"end\": 25, \"label\": \"a\"}] enjoy.";
        assert_eq!(parse_candidates(text).len(), 1);
    }

    #[test]
    fn test_json_followed_by_bracketed_prose() {
        let text = "{\"segments\": [{\"start\": 10, \"end\": 40, \"label\": \"a\"}]}\n\
                    Note: times are approximate [audio based].";
        let candidates = parse_candidates(text);
        assert_eq!(candidates.len(), 1);
        assert_eq!((candidates[0].start, candidates[0].end), (10.0, 40.0));
    }

    #[test]
    fn test_bracketed_prose_before_json() {
        let text = "Picks [v2]: [{\"start\": 5, \"end\": 25, \"label\": \"a\"}]";
        assert_eq!(parse_candidates(text).len(), 1);
    }

    #[test]
    fn test_line_fallback() {
        let text = "Top moments:\n\
                    1. 00:10 - 00:40 The opening joke\n\
                    2. 1:05:00 to 1:05:45: Audience reaction\n\
                    - 500 – 530 | Big finish\n\
                    No timestamps here";
        let candidates = parse_candidates(text);
        assert_eq!(candidates.len(), 3);
        assert_eq!((candidates[0].start, candidates[0].end), (10.0, 40.0));
        assert_eq!(candidates[0].label, "The opening joke");
        assert_eq!((candidates[1].start, candidates[1].end), (3900.0, 3945.0));
        assert_eq!(candidates[1].label, "Audience reaction");
        assert_eq!((candidates[2].start, candidates[2].end), (500.0, 530.0));
        assert_eq!(candidates[2].label, "Big finish");
    }

    #[test]
    fn test_garbage_yields_nothing() {
        assert!(parse_candidates("").is_empty());
        assert!(parse_candidates("I could not watch this video.").is_empty());
        assert!(parse_candidates(r#"{"error": "nothing interesting"}"#).is_empty());
    }

    #[test]
    fn test_score_is_clamped() {
        let candidates = parse_candidates(r#"[{"start": 0, "end": 20, "label": "x", "score": 42.7}]"#);
        assert_eq!(candidates[0].virality_score, Some(10));
    }
}
