//! Fixed-size crop rectangles following a trajectory.

use clipper_models::{AspectRatio, CropRect, CropTrajectory};

/// Plans per-frame crop rectangles of a fixed size.
///
/// The crop is the largest rectangle of the target aspect ratio that fits
/// the source. Each frame's rectangle is centered on the trajectory and
/// shifted back inside the frame when it would cross an edge; it is never
/// shrunk or padded.
#[derive(Debug, Clone, Copy)]
pub struct CropPlanner {
    frame_width: u32,
    frame_height: u32,
    crop_width: u32,
    crop_height: u32,
}

impl CropPlanner {
    pub fn new(frame_width: u32, frame_height: u32, aspect: AspectRatio) -> Self {
        let (crop_width, crop_height) = crop_size(frame_width, frame_height, aspect);
        Self {
            frame_width,
            frame_height,
            crop_width,
            crop_height,
        }
    }

    pub fn crop_size(&self) -> (u32, u32) {
        (self.crop_width, self.crop_height)
    }

    /// Rectangle centered as close to `(cx, cy)` as the frame allows.
    pub fn rect_at(&self, frame_index: u64, cx: f64, cy: f64) -> CropRect {
        CropRect {
            frame_index,
            x: place(cx, self.crop_width, self.frame_width),
            y: place(cy, self.crop_height, self.frame_height),
            width: self.crop_width,
            height: self.crop_height,
        }
    }

    /// One rectangle per output frame, `0..frame_count`.
    ///
    /// Frames beyond the trajectory hold its last point; an empty trajectory
    /// yields centered rectangles.
    pub fn plan(&self, trajectory: &CropTrajectory, frame_count: u64) -> Vec<CropRect> {
        let center = (self.frame_width as f64 / 2.0, self.frame_height as f64 / 2.0);
        (0..frame_count)
            .map(|i| {
                let (cx, cy) = trajectory.center_at(i as f64).unwrap_or(center);
                self.rect_at(i, cx, cy)
            })
            .collect()
    }
}

/// Largest even-sized crop of `aspect` inside a `width x height` frame.
fn crop_size(width: u32, height: u32, aspect: AspectRatio) -> (u32, u32) {
    let ratio = aspect.ratio();
    let (w, h) = if width as f64 / height as f64 > ratio {
        ((height as f64 * ratio).round() as u32, height)
    } else {
        (width, (width as f64 / ratio).round() as u32)
    };
    (even_within(w, width), even_within(h, height))
}

fn even_within(value: u32, limit: u32) -> u32 {
    (value.min(limit) / 2 * 2).max(2.min(limit))
}

/// Top-left coordinate placing a span of `size` centered on `center`,
/// clamped to `[0, limit - size]`.
fn place(center: f64, size: u32, limit: u32) -> u32 {
    let max = limit.saturating_sub(size) as f64;
    let start = if center.is_finite() { center - size as f64 / 2.0 } else { max / 2.0 };
    start.round().clamp(0.0, max) as u32
}
