//! Clip extraction from the original source.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use clipper_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::PartialOutput;
use crate::probe::SourceVideo;
use crate::progress::FfmpegProgress;

/// Frame-aligned bounds actually used for a cut.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutRange {
    pub start: f64,
    pub end: f64,
}

impl CutRange {
    /// Snap `[start, end)` to the source frame grid and clamp to its duration.
    pub fn snapped(source: &SourceVideo, start: f64, end: f64) -> MediaResult<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(MediaError::InvalidRange(format!("{start}..{end}")));
        }
        let start = source.snap_to_frame(start.max(0.0));
        let end = source.snap_to_frame(end).min(source.duration);
        if end <= start {
            return Err(MediaError::InvalidRange(format!(
                "{start:.3}..{end:.3} is empty after frame alignment"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Re-encodes segments of a source into standalone clips.
///
/// Always re-encodes rather than stream-copying so cuts land on the
/// requested frame instead of the nearest keyframe and audio stays in sync.
#[derive(Debug, Clone)]
pub struct ClipExtractor {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
}

impl ClipExtractor {
    pub fn new(runner: FfmpegRunner, encoding: EncodingConfig) -> Self {
        Self { runner, encoding }
    }

    pub fn build_command(&self, source: &SourceVideo, range: CutRange, output: &Path) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(&source.path, output)
            .seek(range.start)
            .duration(range.duration())
            .map("0:v:0")
            .video_codec(self.encoding.codec.clone())
            .preset(self.encoding.preset.clone())
            .crf(self.encoding.crf)
            .output_args(["-pix_fmt", "yuv420p"]);
        if source.has_audio {
            cmd = cmd
                .map("0:a:0?")
                .audio_codec(self.encoding.audio_codec.clone())
                .audio_bitrate(self.encoding.audio_bitrate.clone());
        }
        cmd.output_args(["-avoid_negative_ts", "make_zero"]).faststart()
    }

    /// Cut `[start, end)` from `source` into `dest`.
    ///
    /// The file is written next to `dest` and renamed into place only when
    /// FFmpeg succeeds.
    pub async fn extract<F>(
        &self,
        source: &SourceVideo,
        start: f64,
        end: f64,
        dest: &Path,
        on_progress: F,
    ) -> MediaResult<PathBuf>
    where
        F: Fn(f64) + Send + 'static,
    {
        let range = CutRange::snapped(source, start, end)?;
        let output = PartialOutput::new(dest);
        let cmd = self.build_command(source, range, output.path());

        debug!(
            "Extracting {:.3}s..{:.3}s from {} to {}",
            range.start,
            range.end,
            source.path.display(),
            dest.display()
        );

        let total = range.duration();
        self.runner
            .run_with_progress(&cmd, move |p: FfmpegProgress| on_progress(p.percentage(total)))
            .await?;

        let path = output.commit().await?;
        info!("Extracted clip {} ({:.2}s)", path.display(), total);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceVideo {
        SourceVideo {
            path: PathBuf::from("/videos/in.mp4"),
            duration: 600.0,
            fps: 30.0,
            width: 1920,
            height: 1080,
            byte_size: 1,
            has_audio: true,
        }
    }

    #[test]
    fn test_snapped_range_within_half_frame() {
        let range = CutRange::snapped(&source(), 10.01, 40.02).unwrap();
        assert!((range.start - 10.01).abs() <= 0.5 / 30.0);
        assert!((range.end - 40.02).abs() <= 0.5 / 30.0);
        assert!((range.start * 30.0 - (range.start * 30.0).round()).abs() < 1e-9);
    }

    #[test]
    fn test_snapped_range_clamps_to_duration() {
        let range = CutRange::snapped(&source(), 590.0, 650.0).unwrap();
        assert_eq!(range.end, 600.0);
        assert!(CutRange::snapped(&source(), 50.0, 50.001).is_err());
        assert!(CutRange::snapped(&source(), f64::NAN, 5.0).is_err());
    }

    #[test]
    fn test_build_command_reencodes_with_audio() {
        let extractor = ClipExtractor::new(FfmpegRunner::new(), EncodingConfig::default());
        let range = CutRange { start: 10.0, end: 40.0 };
        let args = extractor
            .build_command(&source(), range, Path::new("/tmp/clip.part.mp4"))
            .build_args();

        let pos = |needle: &str| args.iter().position(|a| a == needle).unwrap();
        assert_eq!(args[pos("-ss") + 1], "10.000");
        assert_eq!(args[pos("-t") + 1], "30.000");
        assert_eq!(args[pos("-c:v") + 1], "libx264");
        assert_eq!(args[pos("-c:a") + 1], "aac");
        assert!(args.contains(&"0:a:0?".to_string()));
        assert!(!args.contains(&"copy".to_string()));
    }

    #[test]
    fn test_build_command_without_audio() {
        let extractor = ClipExtractor::new(FfmpegRunner::new(), EncodingConfig::default());
        let silent = SourceVideo { has_audio: false, ..source() };
        let args = extractor
            .build_command(&silent, CutRange { start: 0.0, end: 20.0 }, Path::new("o.mp4"))
            .build_args();
        assert!(!args.contains(&"-c:a".to_string()));
    }
}
