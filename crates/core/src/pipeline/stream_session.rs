use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::shared::error::AnalysisError;
use crate::shared::frame::Frame;
use crate::video::infrastructure::image_decoder::decode_image;

use super::frame_analyzer::{FrameAnalyzer, FrameResult};
use super::session_summary::{SessionAggregator, SessionSummary};

/// Identifier of a live stream session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepting frames.
    Open,
    /// The detector is unavailable; only `finalize` remains.
    Faulted,
    /// Finalized. Terminal.
    Closed,
}

/// Per-frame reply of a stream session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamUpdate {
    pub frame_index: usize,
    #[serde(flatten)]
    pub result: FrameResult,
    /// Mean head-up rate of every frame analyzed so far, this one included.
    pub running_average: f64,
    pub frames_analyzed: usize,
    /// Frames of this session whose inference failed so far.
    pub frames_failed: usize,
}

/// Analyzes every frame of a live stream in submission order.
///
/// `Open → Closed` on `finalize`; `Open → Faulted` when the detector turns
/// out to be unavailable, after which only `finalize` is accepted.
/// `finalize` succeeds exactly once.
pub struct StreamSession {
    handle: SessionHandle,
    analyzer: FrameAnalyzer,
    aggregator: Option<SessionAggregator>,
    state: SessionState,
    next_frame_index: usize,
    opened_at: Instant,
}

impl StreamSession {
    pub fn new(handle: SessionHandle, analyzer: FrameAnalyzer, history_limit: Option<usize>) -> Self {
        log::info!("Stream session {handle} opened");
        Self {
            handle,
            analyzer,
            aggregator: Some(SessionAggregator::new(history_limit)),
            state: SessionState::Open,
            next_frame_index: 0,
            opened_at: Instant::now(),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Decodes an encoded image and submits it.
    ///
    /// Undecodable bytes are reported without consuming a frame index.
    pub fn submit_bytes(&mut self, bytes: &[u8]) -> Result<StreamUpdate, AnalysisError> {
        self.ensure_open()?;
        let frame = decode_image(bytes)?;
        self.submit(frame)
    }

    /// Analyzes one frame and folds it into the running statistics.
    pub fn submit(&mut self, frame: Frame) -> Result<StreamUpdate, AnalysisError> {
        self.ensure_open()?;
        let aggregator = self.aggregator.as_mut().ok_or(AnalysisError::SessionClosed)?;

        let frame_index = self.next_frame_index;
        self.next_frame_index += 1;
        let frame = frame.with_index(frame_index);
        let elapsed = self.opened_at.elapsed().as_secs_f64();

        match self.analyzer.analyze(&frame) {
            Ok(result) => {
                let running_average =
                    aggregator.record_success(frame_index, elapsed, result.clone());
                Ok(StreamUpdate {
                    frame_index,
                    result,
                    running_average,
                    frames_analyzed: aggregator.frames_analyzed(),
                    frames_failed: aggregator.frames_failed(),
                })
            }
            Err(e @ AnalysisError::ModelUnavailable(_)) => {
                log::error!("Stream session {} faulted: {e}", self.handle);
                self.state = SessionState::Faulted;
                Err(e)
            }
            Err(e) => {
                log::warn!("Stream session {} frame {frame_index} failed: {e}", self.handle);
                aggregator.record_failure(frame_index, elapsed, e.to_string());
                Err(e)
            }
        }
    }

    /// Ends the session and returns its summary. A second call fails with
    /// `SessionClosed`.
    pub fn finalize(&mut self) -> Result<SessionSummary, AnalysisError> {
        let aggregator = self.aggregator.take().ok_or(AnalysisError::SessionClosed)?;
        self.state = SessionState::Closed;
        let summary = aggregator.finalize(None);
        log::info!(
            "Stream session {} closed after {:.1}s: {} frames, average head-up rate {:.3}",
            self.handle,
            summary.wall_duration_secs(),
            summary.frame_count,
            summary.average_head_up_rate
        );
        Ok(summary)
    }

    fn ensure_open(&self) -> Result<(), AnalysisError> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Faulted | SessionState::Closed => Err(AnalysisError::SessionClosed),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.aggregator.is_some() {
            log::debug!("Stream session {} dropped without finalize", self.handle);
        }
    }
}
