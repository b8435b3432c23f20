use std::path::PathBuf;

use serde::Serialize;

/// Stream properties read when a video source is opened.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate as reported by the container; may be 0.
    pub fps: f64,
    /// Frame count as reported by the container; may be 0 when unknown.
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Frame rate used for sampling and time arithmetic: non-positive or
    /// non-finite rates count as 1 fps.
    pub fn effective_fps(&self) -> f64 {
        effective_fps(self.fps)
    }

    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 / self.effective_fps()
    }

    /// Reports the effective rate so `fps` and `duration_secs` always agree.
    pub fn video_info(&self) -> VideoInfo {
        VideoInfo {
            total_frames: self.total_frames,
            fps: self.effective_fps(),
            duration_secs: self.duration_secs(),
        }
    }
}

pub fn effective_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        1.0
    }
}

/// File-level facts carried into a video's `SessionSummary`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VideoInfo {
    pub total_frames: usize,
    pub fps: f64,
    pub duration_secs: f64,
}
