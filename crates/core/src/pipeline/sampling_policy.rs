use crate::shared::video_metadata::effective_fps;

/// Which decoded frames of a video get analyzed.
///
/// Frame `i` is sampled when `i % interval == 0`, so sampled indices are
/// strictly increasing and never repeat within one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplingPolicy {
    interval: usize,
}

impl SamplingPolicy {
    /// One frame per second of nominal playback: `interval = round(fps)`.
    ///
    /// Unusable frame rates count as 1 fps.
    pub fn one_per_second(fps: f64) -> Self {
        let interval = effective_fps(fps).round() as usize;
        Self {
            interval: interval.max(1),
        }
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    pub fn is_sampled(&self, frame_index: usize) -> bool {
        frame_index % self.interval == 0
    }

    /// Number of frames sampled from a video of `total_frames` frames.
    pub fn sample_count(&self, total_frames: usize) -> usize {
        total_frames.div_ceil(self.interval)
    }
}
