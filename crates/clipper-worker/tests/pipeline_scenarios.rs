//! Pipeline runs against in-process fakes for media and analysis.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;

use clipper_media::{AnalysisProxy, ClipGeometry, MediaError, MediaResult, SourceVideo};
use clipper_models::{
    ClipFormat, CropTrajectory, PipelineStage, ProgressEvent, Segment, StageStatus,
};
use clipper_worker::{
    AnalysisClient, AnalysisError, ClipPipeline, MediaToolkit, PipelineConfig, PipelineError,
    ProgressFn, ProgressSink, ReframePlan,
};

const THREE_SEGMENTS: &str = r#"[
    {"start_seconds": 10, "end_seconds": 40, "label": "Opening joke"},
    {"start_seconds": 120, "end_seconds": 150, "label": "Big reveal"},
    {"start_seconds": 300, "end_seconds": 330, "label": "Finale"}
]"#;

type Responder = Box<dyn Fn() -> Result<String, AnalysisError> + Send + Sync>;

struct FakeAnalysis {
    respond: Responder,
    delay: Duration,
    calls: AtomicUsize,
    videos: Mutex<Vec<PathBuf>>,
}

impl FakeAnalysis {
    fn replying(text: &'static str) -> Arc<Self> {
        Self::with(Box::new(move || Ok(text.to_string())), Duration::ZERO)
    }

    fn with(respond: Responder, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            respond,
            delay,
            calls: AtomicUsize::new(0),
            videos: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn videos(&self) -> Vec<PathBuf> {
        self.videos.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisClient for FakeAnalysis {
    async fn analyze(&self, video: &Path, prompt: &str) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.videos.lock().unwrap().push(video.to_path_buf());
        assert!(!prompt.is_empty());
        assert!(video.exists(), "proxy {} should exist during analysis", video.display());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)()
    }
}

#[derive(Default)]
struct FakeToolkit {
    duration: f64,
    fail_extract: HashSet<usize>,
    fail_reframe: HashSet<usize>,
    fail_probe: bool,
    fail_fetch: bool,
    fail_proxy: bool,
    extract_calls: Mutex<Vec<usize>>,
    track_calls: AtomicUsize,
    render_calls: Mutex<Vec<PathBuf>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeToolkit {
    fn new(duration: f64) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    fn failing(mut self, index: usize) -> Self {
        self.fail_extract.insert(index);
        self
    }

    fn failing_reframe(mut self, index: usize) -> Self {
        self.fail_reframe.insert(index);
        self
    }

    fn render_attempts(&self, index: usize) -> usize {
        self.render_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|clip| segment_index(clip) == index)
            .count()
    }

    fn extract_attempts(&self, index: usize) -> usize {
        self.extract_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|i| **i == index)
            .count()
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn fetch(
        &self,
        url: &str,
        work_dir: &Path,
        _cancel: &watch::Receiver<bool>,
    ) -> MediaResult<PathBuf> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.fail_fetch {
            return Err(MediaError::download_failed("video unavailable"));
        }
        let path = work_dir.join("source.mp4");
        tokio::fs::write(&path, b"downloaded").await?;
        Ok(path)
    }

    async fn probe(&self, path: &Path) -> MediaResult<SourceVideo> {
        if self.fail_probe {
            return Err(MediaError::invalid_video("no video stream"));
        }
        Ok(SourceVideo {
            path: path.to_path_buf(),
            duration: self.duration,
            fps: 30.0,
            width: 1920,
            height: 1080,
            byte_size: 1024,
            has_audio: true,
        })
    }

    async fn prepare_proxy(
        &self,
        _source: &SourceVideo,
        work_dir: &Path,
        _cancel: &watch::Receiver<bool>,
    ) -> MediaResult<AnalysisProxy> {
        if self.fail_proxy {
            return Err(MediaError::ffmpeg_failed("proxy encode failed", None, Some(1)));
        }
        let proxy = work_dir.join("analysis_proxy.mp4");
        tokio::fs::write(&proxy, b"proxy").await?;
        Ok(AnalysisProxy::Compressed(proxy))
    }

    async fn extract(
        &self,
        _source: &SourceVideo,
        segment: &Segment,
        dest: &Path,
        _cancel: &watch::Receiver<bool>,
        on_progress: ProgressFn,
    ) -> MediaResult<PathBuf> {
        self.extract_calls.lock().unwrap().push(segment.index);
        if self.fail_extract.contains(&segment.index) {
            return Err(MediaError::ffmpeg_failed("encoder crashed", None, Some(1)));
        }
        on_progress(50.0);
        on_progress(100.0);
        tokio::fs::write(dest, b"clip").await?;
        Ok(dest.to_path_buf())
    }

    async fn track(&self, clip: &Path, _cancel: &watch::Receiver<bool>) -> MediaResult<ReframePlan> {
        self.track_calls.fetch_add(1, Ordering::SeqCst);
        assert!(clip.exists());
        Ok(ReframePlan {
            geometry: ClipGeometry {
                width: 1920,
                height: 1080,
                fps: 30.0,
                duration: 30.0,
            },
            trajectory: CropTrajectory::from_centers(vec![(960.0, 540.0); 900]),
        })
    }

    async fn render(
        &self,
        clip: &Path,
        plan: &ReframePlan,
        dest: &Path,
        _cancel: &watch::Receiver<bool>,
        _on_progress: ProgressFn,
    ) -> MediaResult<PathBuf> {
        self.render_calls.lock().unwrap().push(clip.to_path_buf());
        assert!(clip.exists());
        assert_eq!(plan.trajectory.len(), 900);
        if self.fail_reframe.contains(&segment_index(clip)) {
            return Err(MediaError::ffmpeg_failed("crop filter rejected", None, Some(1)));
        }
        tokio::fs::write(dest, b"vertical").await?;
        Ok(dest.to_path_buf())
    }
}

/// Segment index encoded in a `clip_NN_*` file name.
fn segment_index(clip: &Path) -> usize {
    clip.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix("clip_"))
        .and_then(|n| n.get(..2))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

struct Fixture {
    dir: TempDir,
    source: PathBuf,
    config: PipelineConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("talk.mp4");
        std::fs::write(&source, b"not really a video").unwrap();
        let config = PipelineConfig {
            work_dir: dir.path().join("work"),
            output_dir: dir.path().join("out"),
            ..PipelineConfig::default()
        };
        Self {
            dir,
            source,
            config,
        }
    }

    fn source(&self) -> &str {
        self.source.to_str().unwrap()
    }

    fn pipeline(&self, analysis: Arc<FakeAnalysis>, toolkit: Arc<FakeToolkit>) -> ClipPipeline {
        ClipPipeline::new(self.config.clone(), analysis, toolkit)
    }

    fn work_dir_is_empty(&self) -> bool {
        dir_is_empty(&self.dir.path().join("work"))
    }
}

fn dir_is_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[tokio::test]
async fn test_end_to_end_drops_segment_past_the_end() {
    let fx = Fixture::new();
    let analysis = FakeAnalysis::replying(
        r#"[{"start_seconds": 10, "end_seconds": 40, "label": "a"},
            {"start_seconds": 500, "end_seconds": 530, "label": "b"},
            {"start_seconds": 595, "end_seconds": 650, "label": "c"}]"#,
    );
    let toolkit = Arc::new(FakeToolkit::new(600.0));

    let report = fx
        .pipeline(analysis.clone(), toolkit)
        .run(fx.source(), 3, ClipFormat::Horizontal)
        .await
        .unwrap();

    assert_eq!(analysis.calls(), 1);
    assert_eq!(report.requested_clips, 3);
    assert_eq!(report.proposed_candidates, 3);
    assert_eq!(report.clips.len(), 2);
    assert!(report.failures.is_empty());
    assert_eq!(report.clips[0].segment.start, 10.0);
    assert_eq!(report.clips[1].segment.start, 500.0);
    for clip in &report.clips {
        assert!(clip.path.starts_with(&fx.config.output_dir));
        assert!(clip.path.exists());
    }
    assert!(fx.work_dir_is_empty());
}

#[tokio::test]
async fn test_partial_failure_keeps_other_segments() {
    let fx = Fixture::new();
    let toolkit = Arc::new(FakeToolkit::new(600.0).failing(2));

    let report = fx
        .pipeline(FakeAnalysis::replying(THREE_SEGMENTS), toolkit.clone())
        .run(fx.source(), 3, ClipFormat::Horizontal)
        .await
        .unwrap();

    let indices: Vec<_> = report.clips.iter().map(|c| c.segment.index).collect();
    assert_eq!(indices, vec![1, 3]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].segment.index, 2);
    assert_eq!(report.failures[0].stage, PipelineStage::Extracting);
    assert!(report.failures[0].reason.contains("encoder crashed"));
    assert!(report.is_partial());

    // one retry for the transient failure, none for the others
    assert_eq!(toolkit.extract_attempts(2), 2);
    assert_eq!(toolkit.extract_attempts(1), 1);
}

#[tokio::test]
async fn test_all_segments_failing_is_a_run_error() {
    let fx = Fixture::new();
    let toolkit = Arc::new(FakeToolkit::new(600.0).failing(1).failing(2).failing(3));

    let err = fx
        .pipeline(FakeAnalysis::replying(THREE_SEGMENTS), toolkit)
        .run(fx.source(), 3, ClipFormat::Horizontal)
        .await
        .unwrap_err();

    match err {
        PipelineError::AllSegmentsFailed { failures } => assert_eq!(failures.len(), 3),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(fx.work_dir_is_empty());
}

#[tokio::test]
async fn test_vertical_reframes_every_clip() {
    let fx = Fixture::new();
    let toolkit = Arc::new(FakeToolkit::new(600.0));

    let report = fx
        .pipeline(FakeAnalysis::replying(THREE_SEGMENTS), toolkit.clone())
        .run(fx.source(), 2, ClipFormat::Vertical)
        .await
        .unwrap();

    assert_eq!(report.clips.len(), 2);
    assert_eq!(toolkit.track_calls.load(Ordering::SeqCst), 2);
    assert_eq!(toolkit.render_calls.lock().unwrap().len(), 2);
    for clip in &report.clips {
        assert_eq!(clip.format, ClipFormat::Vertical);
        assert_eq!(std::fs::read(&clip.path).unwrap(), b"vertical");
    }
    assert!(fx.work_dir_is_empty());
}

#[tokio::test]
async fn test_unparseable_response_is_no_segments() {
    let fx = Fixture::new();
    let err = fx
        .pipeline(
            FakeAnalysis::replying("I could not find anything interesting."),
            Arc::new(FakeToolkit::new(600.0)),
        )
        .run(fx.source(), 3, ClipFormat::Horizontal)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoSegmentsFound(_)));
}

#[tokio::test]
async fn test_no_candidate_survives_reconciliation() {
    let fx = Fixture::new();
    let err = fx
        .pipeline(
            FakeAnalysis::replying(r#"[{"start": 700, "end": 730, "label": "past the end"}]"#),
            Arc::new(FakeToolkit::new(600.0)),
        )
        .run(fx.source(), 3, ClipFormat::Horizontal)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoSegmentsFound(_)));
}

#[tokio::test]
async fn test_analysis_unavailable_carries_guidance() {
    let fx = Fixture::new();
    let analysis = FakeAnalysis::with(
        Box::new(|| Err(AnalysisError::Auth("401 Unauthorized".into()))),
        Duration::ZERO,
    );
    let err = fx
        .pipeline(analysis.clone(), Arc::new(FakeToolkit::new(600.0)))
        .run(fx.source(), 3, ClipFormat::Horizontal)
        .await
        .unwrap_err();

    assert_eq!(analysis.calls(), 1);
    assert!(matches!(err, PipelineError::AnalysisUnavailable { .. }));
    assert!(err.to_string().contains("GEMINI_API_KEY"));
    assert!(fx.work_dir_is_empty());
}

#[tokio::test]
async fn test_clip_count_out_of_range_rejected_before_work() {
    let fx = Fixture::new();
    let analysis = FakeAnalysis::replying(THREE_SEGMENTS);
    let pipeline = fx.pipeline(analysis.clone(), Arc::new(FakeToolkit::new(600.0)));

    for k in [0, 11] {
        let err = pipeline
            .run(fx.source(), k, ClipFormat::Horizontal)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)), "k={k}");
    }
    assert_eq!(analysis.calls(), 0);
}

#[tokio::test]
async fn test_unreadable_media() {
    let fx = Fixture::new();
    let toolkit = FakeToolkit {
        fail_probe: true,
        ..FakeToolkit::new(600.0)
    };
    let analysis = FakeAnalysis::replying(THREE_SEGMENTS);
    let err = fx
        .pipeline(analysis.clone(), Arc::new(toolkit))
        .run(fx.source(), 3, ClipFormat::Horizontal)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnreadableMedia(_)));
    assert_eq!(analysis.calls(), 0);

    let err = fx
        .pipeline(analysis, Arc::new(FakeToolkit::new(600.0)))
        .run("/definitely/not/here.mp4", 3, ClipFormat::Horizontal)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnreadableMedia(_)));
}

#[tokio::test]
async fn test_remote_source_is_fetched_into_work_dir() {
    let fx = Fixture::new();
    let toolkit = Arc::new(FakeToolkit::new(600.0));
    let report = fx
        .pipeline(FakeAnalysis::replying(THREE_SEGMENTS), toolkit.clone())
        .run("https://www.youtube.com/watch?v=abc123", 1, ClipFormat::Horizontal)
        .await
        .unwrap();

    assert_eq!(report.clips.len(), 1);
    assert_eq!(
        toolkit.fetched.lock().unwrap().as_slice(),
        ["https://www.youtube.com/watch?v=abc123".to_string()]
    );
    assert!(fx.work_dir_is_empty());

    let failing = FakeToolkit {
        fail_fetch: true,
        ..FakeToolkit::new(600.0)
    };
    let err = fx
        .pipeline(FakeAnalysis::replying(THREE_SEGMENTS), Arc::new(failing))
        .run("https://example.com/video", 1, ClipFormat::Horizontal)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::SourceFetch(_)));
}

#[tokio::test]
async fn test_cancellation_during_analysis_cleans_up() {
    let fx = Fixture::new();
    let analysis = FakeAnalysis::with(
        Box::new(|| Ok(THREE_SEGMENTS.to_string())),
        Duration::from_secs(30),
    );
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = cancel_tx.send(true);
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let err = fx
        .pipeline(analysis, Arc::new(FakeToolkit::new(600.0)))
        .with_cancel(cancel_rx)
        .run(fx.source(), 3, ClipFormat::Horizontal)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(fx.work_dir_is_empty());
    assert!(dir_is_empty(&fx.config.output_dir));
}

#[tokio::test]
async fn test_progress_events_are_emitted() {
    let fx = Fixture::new();
    let (sink, mut events) = ProgressSink::channel();

    let pipeline = fx
        .pipeline(FakeAnalysis::replying(THREE_SEGMENTS), Arc::new(FakeToolkit::new(600.0)))
        .with_progress(sink);
    pipeline.run(fx.source(), 2, ClipFormat::Horizontal).await.unwrap();
    drop(pipeline);

    let mut analyzed = false;
    let mut segment_done = HashSet::new();
    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::Stage {
                stage: PipelineStage::Analyzing,
                status: StageStatus::Completed,
                ..
            } => analyzed = true,
            ProgressEvent::Segment {
                segment,
                stage: PipelineStage::Extracting,
                status: StageStatus::Completed,
                ..
            } => {
                segment_done.insert(segment);
            }
            _ => {}
        }
    }
    assert!(analyzed);
    assert_eq!(segment_done, HashSet::from([1, 2]));
}

#[tokio::test]
async fn test_analysis_uses_compressed_proxy() {
    let fx = Fixture::new();
    let analysis = FakeAnalysis::replying(THREE_SEGMENTS);
    fx.pipeline(analysis.clone(), Arc::new(FakeToolkit::new(600.0)))
        .run(fx.source(), 1, ClipFormat::Horizontal)
        .await
        .unwrap();

    let videos = analysis.videos();
    assert_eq!(videos.len(), 1);
    assert!(videos[0].ends_with("analysis_proxy.mp4"), "{videos:?}");
    assert!(!videos[0].exists());
}

#[tokio::test]
async fn test_proxy_failure_submits_original() {
    let fx = Fixture::new();
    let analysis = FakeAnalysis::replying(THREE_SEGMENTS);
    let toolkit = FakeToolkit {
        fail_proxy: true,
        ..FakeToolkit::new(600.0)
    };

    let report = fx
        .pipeline(analysis.clone(), Arc::new(toolkit))
        .run(fx.source(), 2, ClipFormat::Horizontal)
        .await
        .unwrap();

    assert_eq!(report.clips.len(), 2);
    assert_eq!(analysis.videos(), vec![fx.source.clone()]);
    // The original is never cleaned up with the run.
    assert!(fx.source.exists());
    assert!(fx.work_dir_is_empty());
}

#[tokio::test]
async fn test_reframe_failure_keeps_other_vertical_clips() {
    let fx = Fixture::new();
    let toolkit = Arc::new(FakeToolkit::new(600.0).failing_reframe(2));

    let report = fx
        .pipeline(FakeAnalysis::replying(THREE_SEGMENTS), toolkit.clone())
        .run(fx.source(), 3, ClipFormat::Vertical)
        .await
        .unwrap();

    let indices: Vec<_> = report.clips.iter().map(|c| c.segment.index).collect();
    assert_eq!(indices, vec![1, 3]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].segment.index, 2);
    assert_eq!(report.failures[0].stage, PipelineStage::Reframing);
    assert!(report.failures[0].reason.contains("crop filter rejected"));

    assert_eq!(toolkit.render_attempts(2), 2);
    assert_eq!(toolkit.render_attempts(1), 1);
    assert_eq!(toolkit.extract_attempts(2), 1);

    // The extracted intermediate for the failed segment is gone.
    let intermediates = toolkit.render_calls.lock().unwrap().clone();
    assert!(intermediates.iter().all(|clip| !clip.exists()));
    assert!(fx.work_dir_is_empty());
    let run_dir = report.clips[0].path.parent().unwrap();
    assert_eq!(std::fs::read_dir(run_dir).unwrap().count(), 2);
}

#[tokio::test]
async fn test_runs_write_to_separate_directories() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(
        FakeAnalysis::replying(THREE_SEGMENTS),
        Arc::new(FakeToolkit::new(600.0)),
    );

    let first = pipeline.run(fx.source(), 1, ClipFormat::Horizontal).await.unwrap();
    let second = pipeline.run(fx.source(), 1, ClipFormat::Horizontal).await.unwrap();

    let (a, b) = (&first.clips[0].path, &second.clips[0].path);
    assert_ne!(a, b);
    assert_eq!(a.file_name(), b.file_name());
    assert!(a.exists() && b.exists());
    assert_eq!(a.parent().unwrap(), fx.config.output_dir.join(first.run_id.short()));
}

#[tokio::test]
async fn test_tracking_stage_is_closed() {
    let fx = Fixture::new();
    let (sink, mut events) = ProgressSink::channel();

    let pipeline = fx
        .pipeline(FakeAnalysis::replying(THREE_SEGMENTS), Arc::new(FakeToolkit::new(600.0)))
        .with_progress(sink);
    pipeline.run(fx.source(), 1, ClipFormat::Vertical).await.unwrap();
    drop(pipeline);

    let mut tracking = Vec::new();
    while let Some(event) = events.recv().await {
        if let ProgressEvent::Segment {
            stage: PipelineStage::Tracking,
            status,
            ..
        } = event
        {
            tracking.push(status);
        }
    }
    assert_eq!(tracking, vec![StageStatus::Started, StageStatus::Completed]);
}
