//! Vertical rendering with a per-frame dynamic crop.
//!
//! Crop positions are fed to FFmpeg's `crop` filter through a `sendcmd`
//! script, so the whole clip is encoded in a single pass.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clipper_models::encoding::{VERTICAL_HEIGHT, VERTICAL_WIDTH};
use clipper_models::{CropRect, EncodingConfig};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::PartialOutput;
use crate::progress::FfmpegProgress;

/// Encodes a clip to vertical format following planned crop rectangles.
#[derive(Debug, Clone)]
pub struct VerticalRenderer {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
    output_width: u32,
    output_height: u32,
}

impl VerticalRenderer {
    pub fn new(runner: FfmpegRunner, encoding: EncodingConfig) -> Self {
        Self {
            runner,
            encoding,
            output_width: VERTICAL_WIDTH,
            output_height: VERTICAL_HEIGHT,
        }
    }

    /// Render `clip` into `dest` using one crop rectangle per frame.
    ///
    /// `duration` is only used for progress reporting.
    pub async fn render<F>(
        &self,
        clip: &Path,
        rects: &[CropRect],
        fps: f64,
        duration: f64,
        dest: &Path,
        on_progress: F,
    ) -> MediaResult<PathBuf>
    where
        F: Fn(f64) + Send + 'static,
    {
        let first = rects
            .first()
            .ok_or_else(|| MediaError::internal("no crop rectangles to render"))?;

        let script_dir = clip
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let script = tempfile::Builder::new()
            .prefix("crop_")
            .suffix(".cmd")
            .tempfile_in(script_dir)?;
        tokio::fs::write(script.path(), build_sendcmd_script(rects, fps)).await?;

        let output = PartialOutput::new(dest);
        let cmd = self.build_command(clip, first, script.path(), output.path());
        debug!("Vertical render of {} with {} crop frames", clip.display(), rects.len());

        self.runner
            .run_with_progress(&cmd, move |p: FfmpegProgress| on_progress(p.percentage(duration)))
            .await?;

        let path = output.commit().await?;
        info!("Rendered vertical clip {}", path.display());
        Ok(path)
    }

    fn build_command(&self, clip: &Path, first: &CropRect, script: &Path, output: &Path) -> FfmpegCommand {
        let filter = format!(
            "[0:v]setpts=PTS-STARTPTS,sendcmd=f='{script}',\
             crop@dyncrop=w={w}:h={h}:x={x}:y={y}:exact=1,\
             scale={ow}:{oh}:flags=lanczos,setsar=1,format=yuv420p[vout]",
            script = escape_filter_path(script),
            w = first.width,
            h = first.height,
            x = first.x,
            y = first.y,
            ow = self.output_width,
            oh = self.output_height,
        );

        FfmpegCommand::new(clip, output)
            .filter_complex(filter)
            .map("[vout]")
            .map("0:a?")
            .video_codec(self.encoding.codec.clone())
            .preset(self.encoding.preset.clone())
            .crf(self.encoding.crf)
            .audio_codec(self.encoding.audio_codec.clone())
            .audio_bitrate(self.encoding.audio_bitrate.clone())
            .audio_filter("aresample=async=1:first_pts=0")
            .faststart()
    }
}

/// `sendcmd` script moving the crop whenever its position changes.
///
/// Only x/y are updated; the crop size is fixed for the whole clip.
pub fn build_sendcmd_script(rects: &[CropRect], fps: f64) -> String {
    let fps = if fps > 0.0 { fps } else { 30.0 };
    let mut script = String::new();
    let mut last: Option<(u32, u32)> = None;
    for rect in rects {
        let position = (rect.x, rect.y);
        if last == Some(position) {
            continue;
        }
        let t = rect.frame_index as f64 / fps;
        let _ = writeln!(
            script,
            "{:.4} crop@dyncrop x {}, crop@dyncrop y {};",
            t, rect.x, rect.y
        );
        last = Some(position);
    }
    script
}

/// Quote a path for use inside a single-quoted filtergraph option.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").replace('\'', "'\\''")
}
