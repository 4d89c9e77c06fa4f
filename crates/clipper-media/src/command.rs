//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, FfmpegProgress};

/// Diagnostic stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Input-side seek (fast, keyframe-assisted).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Output duration limit.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Move the moov atom to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Force the output container format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the full argument list (without the program name).
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.input_args.len() + self.output_args.len() + 10);
        if self.overwrite {
            args.push("-y".to_string());
        }
        args.extend(["-nostdin".to_string(), "-v".to_string(), self.log_level.clone()]);
        // Progress goes to stderr alongside diagnostics.
        args.extend(["-progress".to_string(), "pipe:2".to_string()]);
        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Runner for FFmpeg commands with progress tracking, timeout and cancellation.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the child process as soon as the flag flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run a command, invoking `on_progress` for every progress block.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        let mut child = self.spawn(cmd, Stdio::null())?;
        let stderr_task = Self::drain_stderr(&mut child, on_progress)?;

        let status = self.wait_for_exit(&mut child).await;
        let stderr_tail = stderr_task.await.unwrap_or_default();
        Self::check_status(status?, stderr_tail)
    }

    /// Run a command that writes fixed-size records to `pipe:1`.
    ///
    /// Each complete `chunk_size` record is sent on `tx`; a trailing short
    /// record is discarded. Sending blocks while the receiver is full, which
    /// in turn stalls FFmpeg. Returns the number of records delivered.
    pub async fn stream_chunks(
        &self,
        cmd: &FfmpegCommand,
        chunk_size: usize,
        tx: mpsc::Sender<Vec<u8>>,
    ) -> MediaResult<u64> {
        if chunk_size == 0 {
            return Err(MediaError::internal("chunk size must be positive"));
        }
        let mut child = self.spawn(cmd, Stdio::piped())?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr_task = Self::drain_stderr(&mut child, |_| {})?;

        let reader = async move {
            let mut delivered = 0u64;
            loop {
                let mut buf = vec![0u8; chunk_size];
                match stdout.read_exact(&mut buf).await {
                    Ok(_) => {
                        if tx.send(buf).await.is_err() {
                            break;
                        }
                        delivered += 1;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(MediaError::from(e)),
                }
            }
            Ok(delivered)
        };

        let (delivered, status) = tokio::join!(reader, self.wait_for_exit(&mut child));
        let stderr_tail = stderr_task.await.unwrap_or_default();
        Self::check_status(status?, stderr_tail)?;
        delivered
    }

    fn spawn(&self, cmd: &FfmpegCommand, stdout: Stdio) -> MediaResult<Child> {
        check_ffmpeg()?;
        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        Ok(child)
    }

    /// Parse progress from stderr and keep the last few diagnostic lines.
    fn drain_stderr<F>(child: &mut Child, on_progress: F) -> MediaResult<JoinHandle<String>>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        let stderr: ChildStderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        Ok(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut progress = FfmpegProgress::default();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = lines.next_line().await {
                if is_progress_line(&line) {
                    if let Some(snapshot) = progress.apply_line(&line) {
                        on_progress(snapshot);
                    }
                } else if !line.trim().is_empty() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Vec::from(tail).join("\n")
        }))
    }

    async fn wait_for_exit(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let mut cancel_rx = self.cancel_rx.clone();
        if cancel_rx.as_ref().is_some_and(|rx| *rx.borrow()) {
            let _ = child.kill().await;
            return Err(MediaError::Cancelled);
        }

        let cancelled = async {
            match cancel_rx.as_mut() {
                Some(rx) => wait_for_cancel(rx).await,
                None => std::future::pending().await,
            }
        };
        let timeout = self.timeout;
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            status = child.wait() => Ok(status?),
            _ = cancelled => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
            _ = deadline => {
                let secs = timeout.map(|t| t.as_secs()).unwrap_or_default();
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                Err(MediaError::Timeout(secs))
            }
        }
    }

    fn check_status(status: ExitStatus, stderr_tail: String) -> MediaResult<()> {
        if status.success() {
            return Ok(());
        }
        let message = stderr_tail
            .lines()
            .last()
            .map(str::to_string)
            .unwrap_or_else(|| "FFmpeg exited with non-zero status".to_string());
        Err(MediaError::ffmpeg_failed(
            message,
            (!stderr_tail.is_empty()).then_some(stderr_tail),
            status.code(),
        ))
    }
}

/// Resolves once the flag is `true`; never resolves if the sender is gone.
pub async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

pub fn check_ytdlp() -> MediaResult<PathBuf> {
    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)
}
