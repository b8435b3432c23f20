use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::shared::error::AnalysisError;
use crate::shared::video_metadata::effective_fps;
use crate::video::domain::video_reader::VideoReader;

use super::frame_analyzer::FrameAnalyzer;
use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use super::sampling_policy::SamplingPolicy;
use super::session_summary::{SessionAggregator, SessionSummary};

/// Progress callback: `(frames_decoded, total_frames)`. Returning `false`
/// cancels the pass.
pub type ProgressCallback = Box<dyn Fn(usize, usize) -> bool + Send>;

/// A video to analyze, on disk or in memory.
#[derive(Clone, Debug)]
pub enum VideoSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Closes the reader however the pass ends.
struct ReaderGuard<'a> {
    reader: &'a mut Box<dyn VideoReader>,
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        self.reader.close();
    }
}

/// Samples one frame per nominal second of a video and aggregates the
/// head-up rates of the sampled frames.
///
/// Inference failures on a sampled frame are recorded in the summary and
/// the pass continues. A model that cannot be loaded aborts the pass. A
/// decode failure after opening ends the pass early with what was gathered.
pub struct AnalyzeVideoUseCase {
    reader: Box<dyn VideoReader>,
    analyzer: FrameAnalyzer,
    logger: Box<dyn PipelineLogger>,
    on_progress: Option<ProgressCallback>,
    cancelled: Arc<AtomicBool>,
}

impl AnalyzeVideoUseCase {
    pub fn new(reader: Box<dyn VideoReader>, analyzer: FrameAnalyzer) -> Self {
        Self {
            reader,
            analyzer,
            logger: Box::new(NullPipelineLogger),
            on_progress: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn execute(&mut self, source: &VideoSource) -> Result<SessionSummary, AnalysisError> {
        match source {
            VideoSource::Path(path) => self.execute_path(path),
            VideoSource::Bytes(bytes) => {
                // Removed when `staged` drops, on every exit path
                let staged = stage_bytes(bytes)?;
                self.execute_path(staged.path())
            }
        }
    }

    fn execute_path(&mut self, path: &Path) -> Result<SessionSummary, AnalysisError> {
        let Self {
            reader,
            analyzer,
            logger,
            on_progress,
            cancelled,
        } = self;

        let mut guard = ReaderGuard { reader };
        let mut metadata = guard
            .reader
            .open(path)
            .map_err(|e| AnalysisError::Decode(format!("{}: {e}", path.display())))?;
        // Surfaces a cached load failure even when no frame gets sampled
        analyzer.ensure_ready()?;

        let policy = SamplingPolicy::one_per_second(metadata.fps);
        let fps = effective_fps(metadata.fps);
        logger.info(&format!(
            "Analyzing {} ({}x{}, {:.2} fps, {} frames, sampling every {} frames, ~{} samples)",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.total_frames,
            policy.interval(),
            policy.sample_count(metadata.total_frames)
        ));

        let mut aggregator = SessionAggregator::unbounded();
        let mut decoded = 0usize;

        for (position, item) in guard.reader.frames().enumerate() {
            if cancelled.load(Ordering::Relaxed) {
                return Err(AnalysisError::Cancelled);
            }

            let frame = match item {
                Ok(frame) => frame.with_index(position),
                Err(e) => {
                    logger.warn(&format!("Decoding stopped at frame {position}: {e}"));
                    break;
                }
            };
            decoded = position + 1;

            if policy.is_sampled(position) {
                let timestamp_secs = position as f64 / fps;
                let t0 = Instant::now();
                let outcome = analyzer.analyze(&frame);
                logger.timing("analyze", t0.elapsed().as_secs_f64() * 1000.0);

                match outcome {
                    Ok(result) => {
                        logger.metric("detections", result.detections.len() as f64);
                        logger.metric("head_up_rate", result.head_up_rate);
                        aggregator.record_success(position, timestamp_secs, result);
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        logger.warn(&format!("Frame {position} failed: {e}"));
                        aggregator.record_failure(position, timestamp_secs, e.to_string());
                    }
                }
            }

            let total = metadata.total_frames.max(decoded);
            logger.progress(decoded, total);
            if let Some(callback) = on_progress.as_ref() {
                if !callback(decoded, total) {
                    return Err(AnalysisError::Cancelled);
                }
            }
        }

        // Containers may not report a frame count
        if metadata.total_frames == 0 {
            metadata.total_frames = decoded;
        }

        let summary = aggregator.finalize(Some(metadata.video_info()));
        logger.info(&format!(
            "Analyzed {} of {} sampled frames, average head-up rate {:.3}",
            summary.frame_count,
            summary.frame_count + summary.failed_count,
            summary.average_head_up_rate
        ));
        logger.summary();
        Ok(summary)
    }
}

fn stage_bytes(bytes: &[u8]) -> Result<tempfile::NamedTempFile, AnalysisError> {
    if bytes.is_empty() {
        return Err(AnalysisError::Decode("video payload is empty".into()));
    }
    let mut file = tempfile::Builder::new()
        .prefix("headup-")
        .tempfile()
        .map_err(|e| AnalysisError::Io(e.to_string()))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| AnalysisError::Io(e.to_string()))?;
    Ok(file)
}
