//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress snapshot reported by FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f64,
    /// Output position in microseconds
    pub out_time_us: i64,
    /// Encoding speed relative to realtime
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Output position in seconds.
    pub fn out_time_secs(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Completion percentage for an output of `total_secs` seconds.
    pub fn percentage(&self, total_secs: f64) -> f64 {
        if self.is_complete {
            return 100.0;
        }
        if total_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs() / total_secs * 100.0).clamp(0.0, 100.0)
    }

    /// Estimated seconds until completion.
    pub fn eta_seconds(&self, total_secs: f64) -> Option<f64> {
        if self.speed <= 0.0 || self.out_time_us <= 0 {
            return None;
        }
        let remaining = (total_secs - self.out_time_secs()).max(0.0);
        Some(remaining / self.speed)
    }

    /// Fold one `key=value` line into this snapshot.
    ///
    /// Returns a copy of the snapshot when a block ends (`progress=...`).
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // FFmpeg reports microseconds under both keys.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_us = us;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.fps = fps;
                }
            }
            "speed" => {
                if let Some(speed) = value.trim().strip_suffix('x').and_then(|s| s.parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }
}

/// Returns true for lines that belong to the `-progress` key/value stream.
pub(crate) fn is_progress_line(line: &str) -> bool {
    const KEYS: &[&str] = &[
        "frame", "fps", "stream_0_0_q", "bitrate", "total_size", "out_time_us", "out_time_ms",
        "out_time", "dup_frames", "drop_frames", "speed", "progress",
    ];
    line.split_once('=')
        .map(|(key, _)| KEYS.contains(&key.trim()) || key.starts_with("stream_"))
        .unwrap_or(false)
}
