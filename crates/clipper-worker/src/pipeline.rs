//! Run orchestration: fetch, probe, analyze, reconcile, then cut and
//! reframe every segment on a bounded task pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info, warn, Instrument};

use clipper_media::{is_remote_source, wait_for_cancel, AnalysisProxy, MediaError, SourceVideo};
use clipper_models::{
    format_seconds, ClipFormat, OutputClip, PipelineStage, RunId, RunReport, Segment,
    SegmentFailure, StageStatus,
};

use crate::analysis::{AnalysisClient, SegmentProposer};
use crate::config::{validate_clip_count, PipelineConfig};
use crate::error::{PipelineError, PipelineResult, SegmentError};
use crate::logging::RunLogger;
use crate::metrics;
use crate::progress::ProgressSink;
use crate::reconciler::reconcile;
use crate::retry::{retry_async, RetryConfig};
use crate::toolkit::MediaToolkit;

/// End-to-end clip pipeline.
pub struct ClipPipeline {
    config: PipelineConfig,
    analysis: Arc<dyn AnalysisClient>,
    toolkit: Arc<dyn MediaToolkit>,
    progress: ProgressSink,
    cancel: watch::Receiver<bool>,
}

impl ClipPipeline {
    pub fn new(
        config: PipelineConfig,
        analysis: Arc<dyn AnalysisClient>,
        toolkit: Arc<dyn MediaToolkit>,
    ) -> Self {
        // The sender is dropped immediately, so this run can never be cancelled.
        let (_, cancel) = watch::channel(false);
        Self {
            config,
            analysis,
            toolkit,
            progress: ProgressSink::disabled(),
            cancel,
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Cancel the run once `cancel` flips to `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Produce up to `clip_count` clips from `source` (a path or http(s) URL).
    ///
    /// Returns at least one clip, possibly alongside per-segment failures,
    /// or a single run-level error. The run's work directory is removed on
    /// every exit path.
    pub async fn run(
        &self,
        source: &str,
        clip_count: usize,
        format: ClipFormat,
    ) -> PipelineResult<RunReport> {
        let run_id = RunId::new();
        let logger = RunLogger::new(&run_id, "clip_run");
        let span = logger.create_span();

        let result = self
            .run_inner(&run_id, &logger, source, clip_count, format)
            .instrument(span)
            .await;

        match &result {
            Ok(report) => {
                let outcome = if report.is_partial() { "partial" } else { "success" };
                metrics::record_run(format.as_str(), outcome);
                logger.log_completion(&format!(
                    "{} clips, {} failed segments",
                    report.clips.len(),
                    report.failures.len()
                ));
            }
            Err(e) => {
                metrics::record_run(format.as_str(), e.kind());
                logger.log_error(&e.to_string());
            }
        }
        result
    }

    async fn run_inner(
        &self,
        run_id: &RunId,
        logger: &RunLogger,
        source: &str,
        clip_count: usize,
        format: ClipFormat,
    ) -> PipelineResult<RunReport> {
        let k = validate_clip_count(clip_count)?;
        self.config.validate()?;
        logger.log_start(&format!("{} ({} {} clips)", source, k, format));

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let work_dir = tempfile::Builder::new()
            .prefix(&format!("run-{}-", run_id.short()))
            .tempdir_in(&self.config.work_dir)?;
        debug!("Run work directory: {}", work_dir.path().display());

        let source_path = self.resolve_source(source, work_dir.path()).await?;
        let video = self.probe(&source_path).await?;

        self.ensure_not_cancelled()?;
        let proxy = self.prepare_proxy(&video, work_dir.path(), logger).await?;

        let started = Instant::now();
        self.progress.stage(PipelineStage::Analyzing, StageStatus::Started);
        let proposer = SegmentProposer::new(self.analysis.as_ref(), self.config.clip_policy);
        let mut cancel = self.cancel.clone();
        let proposed = tokio::select! {
            result = proposer.propose(proxy.path(), k, format) => result,
            _ = wait_for_cancel(&mut cancel) => Err(PipelineError::Cancelled),
        };
        proxy.discard().await;
        let candidates = self.finish_stage(PipelineStage::Analyzing, started, proposed)?;

        self.progress.stage(PipelineStage::Reconciling, StageStatus::Started);
        let segments = reconcile(&candidates, video.duration, &self.config.clip_policy, k);
        if segments.is_empty() {
            self.progress.stage(PipelineStage::Reconciling, StageStatus::Failed);
            return Err(PipelineError::no_segments(format!(
                "none of the {} proposed segments fit a {:.1}s source",
                candidates.len(),
                video.duration
            )));
        }
        self.progress.stage(PipelineStage::Reconciling, StageStatus::Completed);
        logger.log_progress(&format!(
            "{} of {} candidates reconciled into segments",
            segments.len(),
            candidates.len()
        ));

        // One output directory per run.
        let output_dir = self.config.output_dir.join(run_id.short());
        tokio::fs::create_dir_all(&output_dir).await?;
        let (clips, failures) = self
            .process_segments(logger, video, segments, format, work_dir.path(), &output_dir)
            .await;

        if clips.is_empty() {
            // Only succeeds while the directory is still empty.
            let _ = tokio::fs::remove_dir(&output_dir).await;
        }
        self.ensure_not_cancelled()?;
        if clips.is_empty() {
            return Err(PipelineError::AllSegmentsFailed { failures });
        }

        Ok(RunReport {
            run_id: run_id.clone(),
            format,
            requested_clips: k,
            proposed_candidates: candidates.len(),
            clips,
            failures,
        })
    }

    async fn resolve_source(&self, source: &str, work_dir: &Path) -> PipelineResult<PathBuf> {
        if !is_remote_source(source) {
            let path = PathBuf::from(source);
            if !path.is_file() {
                return Err(PipelineError::unreadable(MediaError::FileNotFound(path)));
            }
            return Ok(path);
        }

        let started = Instant::now();
        self.progress.stage(PipelineStage::FetchingSource, StageStatus::Started);
        let fetched = self
            .toolkit
            .fetch(source, work_dir, &self.cancel)
            .await
            .map_err(PipelineError::source_fetch);
        self.finish_stage(PipelineStage::FetchingSource, started, fetched)
    }

    async fn probe(&self, path: &Path) -> PipelineResult<SourceVideo> {
        let started = Instant::now();
        self.progress.stage(PipelineStage::Probing, StageStatus::Started);
        let probed = self
            .toolkit
            .probe(path)
            .await
            .map_err(PipelineError::unreadable);
        let video = self.finish_stage(PipelineStage::Probing, started, probed)?;
        info!(
            duration = video.duration,
            fps = video.fps,
            width = video.width,
            height = video.height,
            "Probed {}",
            path.display()
        );
        Ok(video)
    }

    /// Build the analysis proxy, falling back to the original on failure.
    async fn prepare_proxy(
        &self,
        video: &SourceVideo,
        work_dir: &Path,
        logger: &RunLogger,
    ) -> PipelineResult<AnalysisProxy> {
        let started = Instant::now();
        self.progress.stage(PipelineStage::Preprocessing, StageStatus::Started);
        let proxy = match self.toolkit.prepare_proxy(video, work_dir, &self.cancel).await {
            Ok(proxy) => proxy,
            Err(MediaError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                logger.log_warning(&format!(
                    "Analysis proxy failed ({}); submitting the original, expect higher analysis cost and latency",
                    e
                ));
                AnalysisProxy::Original(video.path.clone())
            }
        };
        self.progress.stage(PipelineStage::Preprocessing, StageStatus::Completed);
        metrics::record_stage_duration(PipelineStage::Preprocessing, started.elapsed().as_secs_f64());
        Ok(proxy)
    }

    fn finish_stage<T>(
        &self,
        stage: PipelineStage,
        started: Instant,
        result: PipelineResult<T>,
    ) -> PipelineResult<T> {
        let status = if result.is_ok() {
            StageStatus::Completed
        } else {
            StageStatus::Failed
        };
        self.progress.stage(stage, status);
        metrics::record_stage_duration(stage, started.elapsed().as_secs_f64());
        result
    }

    fn ensure_not_cancelled(&self) -> PipelineResult<()> {
        if *self.cancel.borrow() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run every segment on the task pool and merge outcomes in segment order.
    async fn process_segments(
        &self,
        logger: &RunLogger,
        video: SourceVideo,
        segments: Vec<Segment>,
        format: ClipFormat,
        work_dir: &Path,
        output_dir: &Path,
    ) -> (Vec<OutputClip>, Vec<SegmentFailure>) {
        let ctx = Arc::new(SegmentContext {
            toolkit: Arc::clone(&self.toolkit),
            source: video,
            format,
            work_dir: work_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            retry: RetryConfig::new("segment_encode")
                .with_max_retries(self.config.extraction_retries),
            progress: self.progress.clone(),
            cancel: self.cancel.clone(),
        });

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_segments));
        let (tx, mut rx) = mpsc::channel(segments.len().max(1));
        let mut tasks = Vec::with_capacity(segments.len());

        for segment in segments {
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            let span = logger.segment_span(segment.index);
            let spawned = segment.clone();
            let handle = tokio::spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    let outcome = process_segment(&ctx, spawned).await;
                    let _ = tx.send(outcome).await;
                }
                .instrument(span),
            );
            tasks.push((segment, handle));
        }
        drop(tx);

        let mut clips = Vec::new();
        let mut failures = Vec::new();
        while let Some(outcome) = rx.recv().await {
            match outcome {
                Ok(clip) => {
                    metrics::record_segment(format.as_str(), true);
                    clips.push(clip);
                }
                Err(failure) => {
                    metrics::record_segment(format.as_str(), false);
                    logger.log_warning(&format!(
                        "Segment {} failed during {}: {}",
                        failure.segment.index, failure.stage, failure.reason
                    ));
                    failures.push(failure);
                }
            }
        }

        // A task that panicked never reports back.
        let (segments, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        for (segment, joined) in segments.into_iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                metrics::record_segment(format.as_str(), false);
                logger.log_error(&format!("Segment {} task aborted: {}", segment.index, e));
                failures.push(SegmentFailure {
                    segment,
                    stage: PipelineStage::Extracting,
                    reason: format!("segment task aborted: {}", e),
                });
            }
        }

        clips.sort_by_key(|c| c.segment.index);
        failures.sort_by_key(|f| f.segment.index);
        (clips, failures)
    }
}

/// Shared, read-only state for segment tasks.
struct SegmentContext {
    toolkit: Arc<dyn MediaToolkit>,
    source: SourceVideo,
    format: ClipFormat,
    work_dir: PathBuf,
    output_dir: PathBuf,
    retry: RetryConfig,
    progress: ProgressSink,
    cancel: watch::Receiver<bool>,
}

async fn process_segment(
    ctx: &SegmentContext,
    segment: Segment,
) -> Result<OutputClip, SegmentFailure> {
    let index = segment.index;
    let file_name = format!("{}.mp4", segment.file_stem());

    let result = match ctx.format {
        ClipFormat::Horizontal => extract(ctx, &segment, &ctx.output_dir.join(&file_name)).await,
        ClipFormat::Vertical => {
            let intermediate = ctx.work_dir.join(&file_name);
            match extract(ctx, &segment, &intermediate).await {
                Ok(clip) => {
                    let rendered = reframe(ctx, index, &clip, &ctx.output_dir.join(&file_name)).await;
                    if let Err(e) = tokio::fs::remove_file(&clip).await {
                        debug!("Could not remove intermediate {}: {}", clip.display(), e);
                    }
                    rendered
                }
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(path) => {
            info!(
                segment = index,
                "Clip ready: {} ({} - {})",
                path.display(),
                format_seconds(segment.start),
                format_seconds(segment.end)
            );
            Ok(OutputClip {
                path,
                format: ctx.format,
                segment,
            })
        }
        Err(e) => Err(SegmentFailure {
            stage: e.stage(),
            reason: e.to_string(),
            segment,
        }),
    }
}

async fn extract(ctx: &SegmentContext, segment: &Segment, dest: &Path) -> Result<PathBuf, SegmentError> {
    if *ctx.cancel.borrow() {
        return Err(SegmentError::Cancelled);
    }
    let index = segment.index;
    let stage = PipelineStage::Extracting;
    let started = Instant::now();
    ctx.progress.segment(index, stage, StageStatus::Started);

    let result = retry_async(
        &ctx.retry,
        |e: &MediaError| e.is_transient(),
        move |attempt| {
            if attempt > 0 {
                warn!(segment = index, attempt, "Retrying extraction");
            }
            let on_progress = Box::new(ctx.progress.segment_progress(index, stage));
            ctx.toolkit
                .extract(&ctx.source, segment, dest, &ctx.cancel, on_progress)
        },
    )
    .await
    .map_err(SegmentError::extraction);

    finish_segment_stage(ctx, index, stage, started, result)
}

/// Track the face through `clip`, then render it vertically into `dest`.
async fn reframe(
    ctx: &SegmentContext,
    index: usize,
    clip: &Path,
    dest: &Path,
) -> Result<PathBuf, SegmentError> {
    if *ctx.cancel.borrow() {
        return Err(SegmentError::Cancelled);
    }
    let stage = PipelineStage::Tracking;
    let started = Instant::now();
    ctx.progress.segment(index, stage, StageStatus::Started);

    let tracked = retry_async(
        &ctx.retry,
        |e: &MediaError| e.is_transient(),
        move |attempt| {
            if attempt > 0 {
                warn!(segment = index, attempt, "Retrying face tracking");
            }
            ctx.toolkit.track(clip, &ctx.cancel)
        },
    )
    .await
    .map_err(SegmentError::tracking);
    let plan = finish_segment_stage(ctx, index, stage, started, tracked)?;

    let stage = PipelineStage::Reframing;
    let started = Instant::now();
    ctx.progress.segment(index, stage, StageStatus::Started);
    let plan = &plan;

    let result = retry_async(
        &ctx.retry,
        |e: &MediaError| e.is_transient(),
        move |attempt| {
            if attempt > 0 {
                warn!(segment = index, attempt, "Retrying reframe");
            }
            let on_progress = Box::new(ctx.progress.segment_progress(index, stage));
            ctx.toolkit.render(clip, plan, dest, &ctx.cancel, on_progress)
        },
    )
    .await
    .map_err(SegmentError::reframe);

    finish_segment_stage(ctx, index, stage, started, result)
}

fn finish_segment_stage<T>(
    ctx: &SegmentContext,
    index: usize,
    stage: PipelineStage,
    started: Instant,
    result: Result<T, SegmentError>,
) -> Result<T, SegmentError> {
    let status = if result.is_ok() {
        StageStatus::Completed
    } else {
        StageStatus::Failed
    };
    ctx.progress.segment(index, stage, status);
    metrics::record_stage_duration(stage, started.elapsed().as_secs_f64());
    result
}
