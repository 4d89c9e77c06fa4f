//! Sampled RGB frame decoding for face analysis.

use std::path::Path;

use image::RgbImage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Decoded frames buffered between FFmpeg and the consumer.
const FRAME_BUFFER: usize = 4;

/// Sampling geometry for one clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePlan {
    /// Every `stride`-th source frame is decoded
    pub stride: u32,
    pub width: u32,
    pub height: u32,
}

impl SamplePlan {
    /// Plan decoding at `analysis_height` (never upscaled), keeping aspect.
    pub fn new(source_width: u32, source_height: u32, stride: u32, analysis_height: u32) -> Self {
        let height = analysis_height.min(source_height).max(2) / 2 * 2;
        let width = ((source_width as f64 * height as f64 / source_height.max(1) as f64).round() as u32)
            .max(2)
            / 2
            * 2;
        Self {
            stride: stride.max(1),
            width,
            height,
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Source-pixel scale factors (x, y) for coordinates in sampled frames.
    pub fn scale_to(&self, source_width: u32, source_height: u32) -> (f64, f64) {
        (
            source_width as f64 / self.width as f64,
            source_height as f64 / self.height as f64,
        )
    }

    fn command(&self, clip: &Path) -> FfmpegCommand {
        FfmpegCommand::new(clip, "pipe:1")
            .map("0:v:0")
            .video_filter(format!(
                "select='not(mod(n\\,{}))',scale={}:{}",
                self.stride, self.width, self.height
            ))
            .output_args(["-vsync", "0", "-pix_fmt", "rgb24"])
            .format("rawvideo")
    }
}

/// A decoded frame with its index in the clip.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub frame_index: u64,
    pub image: RgbImage,
}

/// Streaming decoder of sampled frames.
///
/// Frames arrive in order with bounded buffering; call
/// [`FrameStream::finish`] after draining to surface decoder errors.
pub struct FrameStream {
    plan: SamplePlan,
    rx: mpsc::Receiver<Vec<u8>>,
    handle: JoinHandle<MediaResult<u64>>,
    next: u64,
}

impl FrameStream {
    pub fn open(runner: &FfmpegRunner, clip: &Path, plan: SamplePlan) -> Self {
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let runner = runner.clone();
        let cmd = plan.command(clip);
        let handle = tokio::spawn(async move { runner.stream_chunks(&cmd, plan.frame_bytes(), tx).await });
        Self {
            plan,
            rx,
            handle,
            next: 0,
        }
    }

    pub async fn next_frame(&mut self) -> Option<SampledFrame> {
        let raw = self.rx.recv().await?;
        let image = RgbImage::from_raw(self.plan.width, self.plan.height, raw)?;
        let frame_index = self.next * self.plan.stride as u64;
        self.next += 1;
        Some(SampledFrame { frame_index, image })
    }

    /// Wait for the decoder and return how many frames it produced.
    pub async fn finish(self) -> MediaResult<u64> {
        drop(self.rx);
        self.handle
            .await
            .map_err(|e| MediaError::internal(format!("frame decoder task failed: {e}")))?
    }
}
