//! FFprobe source inspection.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Frame rate assumed when the container does not report one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Properties of the source video, probed once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceVideo {
    pub path: PathBuf,
    /// Duration in seconds
    pub duration: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// File size in bytes
    pub byte_size: u64,
    /// Whether the container holds an audio stream
    pub has_audio: bool,
}

impl SourceVideo {
    /// Snap a timestamp to the nearest frame boundary.
    pub fn snap_to_frame(&self, seconds: f64) -> f64 {
        if self.fps <= 0.0 {
            return seconds;
        }
        (seconds * self.fps).round() / self.fps
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a video file.
///
/// Fails with [`MediaError::InvalidVideo`] when the container has no video
/// stream, no usable resolution or a zero duration.
pub async fn probe_source(path: impl AsRef<Path>) -> MediaResult<SourceVideo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(MediaError::FfprobeFailed {
            message: format!("cannot open {}", path.display()),
            stderr: (!stderr.is_empty()).then_some(stderr),
        });
    }

    let byte_size = tokio::fs::metadata(path).await.map(|m| m.len()).ok();
    let source = parse_probe_output(path, &output.stdout, byte_size)?;
    debug!(
        "Probed {}: {:.2}s {}x{} @ {:.3}fps, {} bytes",
        path.display(),
        source.duration,
        source.width,
        source.height,
        source.fps,
        source.byte_size
    );
    Ok(source)
}

fn parse_probe_output(path: &Path, json: &[u8], byte_size: Option<u64>) -> MediaResult<SourceVideo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::invalid_video("no video stream"))?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let format_duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());
    let stream_duration = video.duration.as_deref().and_then(|d| d.parse::<f64>().ok());
    let duration = format_duration
        .or(stream_duration)
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| MediaError::invalid_video("zero or unknown duration"))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(MediaError::invalid_video("video stream has no resolution")),
    };

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(DEFAULT_FPS);

    let byte_size = byte_size
        .or_else(|| {
            probe
                .format
                .as_ref()
                .and_then(|f| f.size.as_deref())
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(0);

    Ok(SourceVideo {
        path: path.to_path_buf(),
        duration,
        fps,
        width,
        height,
        byte_size,
        has_audio,
    })
}

/// Parse a frame rate such as `"30000/1001"` or `"29.97"`.
///
/// Returns `None` for `"0/0"` and other unusable values.
fn parse_frame_rate(s: &str) -> Option<f64> {
    let fps = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"codec_type": "audio", "codec_name": "aac"},
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "avg_frame_rate": "30000/1001", "r_frame_rate": "30/1"}
        ],
        "format": {"duration": "600.000000", "size": "104857600"}
    }"#;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let source = parse_probe_output(Path::new("in.mp4"), PROBE_JSON.as_bytes(), None).unwrap();
        assert_eq!(source.duration, 600.0);
        assert_eq!((source.width, source.height), (1920, 1080));
        assert_eq!(source.byte_size, 104_857_600);
        assert!(source.has_audio);
        assert!((source.fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_zero_duration_is_invalid() {
        let json = r#"{"streams":[{"codec_type":"video","width":640,"height":360}],
                       "format":{"duration":"0.0"}}"#;
        let err = parse_probe_output(Path::new("x.mp4"), json.as_bytes(), Some(10)).unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }

    #[test]
    fn test_audio_only_is_invalid() {
        let json = r#"{"streams":[{"codec_type":"audio"}],"format":{"duration":"12.0"}}"#;
        let err = parse_probe_output(Path::new("x.m4a"), json.as_bytes(), None).unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }

    #[test]
    fn test_snap_to_frame() {
        let source = SourceVideo {
            path: PathBuf::from("in.mp4"),
            duration: 10.0,
            fps: 25.0,
            width: 640,
            height: 360,
            byte_size: 1,
            has_audio: false,
        };
        assert!((source.snap_to_frame(1.019) - 1.0).abs() < 1e-9);
        assert!((source.snap_to_frame(1.021) - 1.04).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = probe_source("/definitely/not/here.mp4").await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
