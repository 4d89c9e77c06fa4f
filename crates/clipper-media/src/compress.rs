//! Analysis proxy preparation.
//!
//! Large or long sources are transcoded to a small, low frame rate proxy
//! before being uploaded to the analysis model. Small sources are used as-is.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::fs_utils::PartialOutput;
use crate::probe::SourceVideo;

/// Thresholds and output settings for the analysis proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyPolicy {
    /// Sources longer than this are compressed (seconds)
    pub long_duration_secs: f64,
    /// Sources larger than this are compressed (bytes)
    pub large_size_bytes: u64,
    /// Longest edge of the proxy in pixels
    pub max_long_edge: u32,
    /// Proxy frame rate
    pub max_fps: f64,
    pub crf: u8,
    /// Mono audio bitrate
    pub audio_bitrate: String,
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        Self {
            long_duration_secs: 20.0 * 60.0,
            large_size_bytes: 200 * 1024 * 1024,
            max_long_edge: 480,
            max_fps: 1.0,
            crf: 32,
            audio_bitrate: "32k".to_string(),
        }
    }
}

impl ProxyPolicy {
    pub fn needs_proxy(&self, source: &SourceVideo) -> bool {
        source.duration > self.long_duration_secs || source.byte_size > self.large_size_bytes
    }

    /// Proxy dimensions: long edge capped, aspect kept, both sides even.
    pub fn proxy_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let long_edge = width.max(height);
        if long_edge <= self.max_long_edge || long_edge == 0 {
            return (even(width), even(height));
        }
        let scale = self.max_long_edge as f64 / long_edge as f64;
        (
            even((width as f64 * scale).round() as u32),
            even((height as f64 * scale).round() as u32),
        )
    }
}

fn even(v: u32) -> u32 {
    (v / 2 * 2).max(2)
}

/// The file handed to the analysis model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisProxy {
    /// The source itself; never deleted by the pipeline
    Original(PathBuf),
    /// A derivative inside the run work directory
    Compressed(PathBuf),
}

impl AnalysisProxy {
    pub fn path(&self) -> &Path {
        match self {
            AnalysisProxy::Original(p) | AnalysisProxy::Compressed(p) => p,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, AnalysisProxy::Compressed(_))
    }

    /// Remove a compressed proxy. The original is left untouched.
    pub async fn discard(self) {
        if let AnalysisProxy::Compressed(path) = self {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::debug!("Could not remove proxy {}: {}", path.display(), e);
            }
        }
    }
}

/// Prepare the analysis proxy for `source`.
///
/// Errors are recoverable for callers: submitting the original is always
/// a valid fallback.
pub async fn prepare_analysis_proxy(
    runner: &FfmpegRunner,
    source: &SourceVideo,
    policy: &ProxyPolicy,
    work_dir: &Path,
) -> MediaResult<AnalysisProxy> {
    if !policy.needs_proxy(source) {
        return Ok(AnalysisProxy::Original(source.path.clone()));
    }

    let (width, height) = policy.proxy_dimensions(source.width, source.height);
    info!(
        "Compressing {:.0}s / {} byte source to {}x{} @ {}fps analysis proxy",
        source.duration, source.byte_size, width, height, policy.max_fps
    );

    let output = PartialOutput::new(work_dir.join("analysis_proxy.mp4"));
    let mut cmd = FfmpegCommand::new(&source.path, output.path())
        .map("0:v:0")
        .video_filter(format!("fps={},scale={}:{}", policy.max_fps, width, height))
        .video_codec("libx264")
        .preset("veryfast")
        .crf(policy.crf);
    cmd = if source.has_audio {
        cmd.map("0:a:0")
            .audio_codec("aac")
            .output_args(["-ac", "1", "-ar", "16000"])
            .audio_bitrate(policy.audio_bitrate.clone())
    } else {
        cmd.output_arg("-an")
    };
    runner.run(&cmd.faststart()).await?;

    let path = output.commit().await?;
    Ok(AnalysisProxy::Compressed(path))
}
