//! Remote source download using yt-dlp.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;
use url::Url;

use crate::command::check_ytdlp;
use crate::error::{MediaError, MediaResult};

/// MP4 video up to 1080p merged with M4A audio, falling back to a single MP4.
const YTDLP_FORMAT: &str =
    "bestvideo[ext=mp4][height<=1080]+bestaudio[ext=m4a]/best[ext=mp4][height<=1080]/best";

/// True when `source` is an http(s) URL rather than a local path.
pub fn is_remote_source(source: &str) -> bool {
    Url::parse(source)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Download `url` into `output_dir` as `source.mp4` and return its path.
pub async fn download_source(url: &str, output_dir: impl AsRef<Path>) -> MediaResult<PathBuf> {
    if !is_remote_source(url) {
        return Err(MediaError::download_failed(format!("not an http(s) URL: {url}")));
    }
    check_ytdlp()?;

    let output_dir = output_dir.as_ref();
    tokio::fs::create_dir_all(output_dir).await?;
    let output_path = output_dir.join("source.mp4");

    info!("Downloading {} to {}", url, output_path.display());

    let output = Command::new("yt-dlp")
        .args(["--no-playlist", "--no-progress", "--merge-output-format", "mp4"])
        .args(["-f", YTDLP_FORMAT])
        .arg("-o")
        .arg(&output_path)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|l| l.contains("ERROR"))
            .unwrap_or("yt-dlp exited with non-zero status");
        return Err(MediaError::download_failed(reason.trim().to_string()));
    }

    let size = tokio::fs::metadata(&output_path)
        .await
        .map(|m| m.len())
        .map_err(|_| MediaError::download_failed("yt-dlp reported success but produced no file"))?;
    if size == 0 {
        return Err(MediaError::download_failed("downloaded file is empty"));
    }

    info!("Download complete: {} ({} bytes)", output_path.display(), size);
    Ok(output_path)
}
