//! Media operations used by the pipeline.
//!
//! [`MediaToolkit`] is the seam between orchestration and the FFmpeg-backed
//! media crate, so the pipeline can be driven without real media.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use clipper_media::{
    download_source, prepare_analysis_proxy, probe_source, wait_for_cancel, AnalysisProxy,
    ClipExtractor, ClipGeometry, FaceDetector, FfmpegRunner, MediaError, MediaResult,
    SourceVideo, VerticalReframer,
};
use clipper_models::{CropTrajectory, Segment};

use crate::config::PipelineConfig;

/// Progress callback receiving a percentage in `[0, 100]`.
pub type ProgressFn = Box<dyn Fn(f64) + Send + 'static>;

/// Face-tracked crop path for one clip, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ReframePlan {
    pub geometry: ClipGeometry,
    pub trajectory: CropTrajectory,
}

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Download a remote source into `work_dir`.
    async fn fetch(
        &self,
        url: &str,
        work_dir: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> MediaResult<PathBuf>;

    async fn probe(&self, path: &Path) -> MediaResult<SourceVideo>;

    async fn prepare_proxy(
        &self,
        source: &SourceVideo,
        work_dir: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> MediaResult<AnalysisProxy>;

    /// Cut `segment` out of `source` into `dest`.
    async fn extract(
        &self,
        source: &SourceVideo,
        segment: &Segment,
        dest: &Path,
        cancel: &watch::Receiver<bool>,
        on_progress: ProgressFn,
    ) -> MediaResult<PathBuf>;

    /// Follow the primary face through `clip`.
    async fn track(&self, clip: &Path, cancel: &watch::Receiver<bool>) -> MediaResult<ReframePlan>;

    /// Render a vertical version of `clip` along `plan` into `dest`.
    async fn render(
        &self,
        clip: &Path,
        plan: &ReframePlan,
        dest: &Path,
        cancel: &watch::Receiver<bool>,
        on_progress: ProgressFn,
    ) -> MediaResult<PathBuf>;
}

/// FFmpeg-backed toolkit.
pub struct FfmpegToolkit {
    config: PipelineConfig,
    detector: Arc<dyn FaceDetector>,
}

impl FfmpegToolkit {
    pub fn new(config: PipelineConfig, detector: Arc<dyn FaceDetector>) -> Self {
        info!("Face detector: {}", detector.name());
        Self { config, detector }
    }

    fn runner(&self, cancel: &watch::Receiver<bool>) -> FfmpegRunner {
        FfmpegRunner::new()
            .with_timeout(self.config.ffmpeg_timeout)
            .with_cancel(cancel.clone())
    }

    fn reframer(&self, cancel: &watch::Receiver<bool>) -> VerticalReframer {
        VerticalReframer::new(
            self.config.tracking.clone(),
            self.runner(cancel),
            self.config.encoding.clone(),
        )
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn fetch(
        &self,
        url: &str,
        work_dir: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> MediaResult<PathBuf> {
        let mut cancel = cancel.clone();
        tokio::select! {
            result = download_source(url, work_dir) => result,
            _ = wait_for_cancel(&mut cancel) => Err(MediaError::Cancelled),
        }
    }

    async fn probe(&self, path: &Path) -> MediaResult<SourceVideo> {
        probe_source(path).await
    }

    async fn prepare_proxy(
        &self,
        source: &SourceVideo,
        work_dir: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> MediaResult<AnalysisProxy> {
        prepare_analysis_proxy(&self.runner(cancel), source, &self.config.proxy, work_dir).await
    }

    async fn extract(
        &self,
        source: &SourceVideo,
        segment: &Segment,
        dest: &Path,
        cancel: &watch::Receiver<bool>,
        on_progress: ProgressFn,
    ) -> MediaResult<PathBuf> {
        let extractor = ClipExtractor::new(self.runner(cancel), self.config.encoding.clone());
        extractor
            .extract(source, segment.start, segment.end, dest, on_progress)
            .await
    }

    async fn track(&self, clip: &Path, cancel: &watch::Receiver<bool>) -> MediaResult<ReframePlan> {
        let probed = probe_source(clip).await?;
        let geometry = ClipGeometry {
            width: probed.width,
            height: probed.height,
            fps: probed.fps,
            duration: probed.duration,
        };
        let trajectory = self
            .reframer(cancel)
            .track(clip, geometry, self.detector.as_ref())
            .await?;
        Ok(ReframePlan {
            geometry,
            trajectory,
        })
    }

    async fn render(
        &self,
        clip: &Path,
        plan: &ReframePlan,
        dest: &Path,
        cancel: &watch::Receiver<bool>,
        on_progress: ProgressFn,
    ) -> MediaResult<PathBuf> {
        debug!("Rendering {} frames of {}", plan.trajectory.len(), clip.display());
        self.reframer(cancel)
            .render(clip, plan.geometry, &plan.trajectory, dest, on_progress)
            .await
    }
}
