//! Progress event delivery.

use tokio::sync::mpsc;

use clipper_models::{PipelineStage, ProgressEvent, StageStatus};

/// Optional progress channel.
///
/// Events are advisory: a missing or closed receiver never affects the run.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create a sink together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn stage(&self, stage: PipelineStage, status: StageStatus) {
        self.emit(ProgressEvent::stage(stage, status));
    }

    pub fn segment(&self, segment: usize, stage: PipelineStage, status: StageStatus) {
        self.emit(ProgressEvent::segment(segment, stage, status));
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::log(message));
    }

    /// Callback forwarding FFmpeg percentages for one segment stage.
    ///
    /// Only whole-percent changes are forwarded.
    pub fn segment_progress(
        &self,
        segment: usize,
        stage: PipelineStage,
    ) -> impl Fn(f64) + Send + 'static {
        let sink = self.clone();
        let last = std::sync::atomic::AtomicU64::new(u64::MAX);
        move |pct: f64| {
            let whole = pct.clamp(0.0, 100.0).floor() as u64;
            if last.swap(whole, std::sync::atomic::Ordering::Relaxed) != whole {
                sink.segment(segment, stage, StageStatus::Progress(whole as f64));
            }
        }
    }
}
