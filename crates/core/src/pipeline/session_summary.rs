use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::shared::video_metadata::VideoInfo;

use super::frame_analyzer::FrameResult;

/// What happened to one sampled or submitted frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SampleOutcome {
    Analyzed(FrameResult),
    Failed { reason: String },
}

/// One row of a session's per-frame breakdown.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameEntry {
    pub frame_index: usize,
    /// Seconds from the start of the video or stream.
    pub timestamp_secs: f64,
    #[serde(flatten)]
    pub outcome: SampleOutcome,
}

impl FrameEntry {
    pub fn head_up_rate(&self) -> Option<f64> {
        match &self.outcome {
            SampleOutcome::Analyzed(result) => Some(result.head_up_rate),
            SampleOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SampleOutcome::Failed { .. })
    }
}

/// Final statistics of a video pass or stream session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Frames analyzed successfully.
    pub frame_count: usize,
    pub failed_count: usize,
    /// Mean head-up rate over successful frames, 0.0 when there are none.
    pub average_head_up_rate: f64,
    pub entries: Vec<FrameEntry>,
    /// Oldest entries discarded to respect the history limit.
    #[serde(skip_serializing_if = "is_zero")]
    pub dropped_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoInfo>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl SessionSummary {
    /// Wall-clock time between start and finalize; 0.0 if the clock
    /// stepped backwards in between.
    pub fn wall_duration_secs(&self) -> f64 {
        (self.ended_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn failed_entries(&self) -> impl Iterator<Item = &FrameEntry> {
        self.entries.iter().filter(|e| e.is_failed())
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0 && self.failed_count == 0
    }
}

/// Incrementally builds a `SessionSummary`.
///
/// The average comes from a running sum and count, so recording a frame is
/// O(1) no matter how long the session runs. With a history limit only the
/// newest entries are kept; the counts and the average stay exact.
#[derive(Debug)]
pub struct SessionAggregator {
    rate_sum: f64,
    analyzed: usize,
    failed: usize,
    entries: VecDeque<FrameEntry>,
    history_limit: Option<usize>,
    dropped: usize,
    started_at: DateTime<Utc>,
}

impl SessionAggregator {
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            rate_sum: 0.0,
            analyzed: 0,
            failed: 0,
            entries: VecDeque::new(),
            history_limit,
            dropped: 0,
            started_at: Utc::now(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Records a successful frame and returns the running average.
    pub fn record_success(
        &mut self,
        frame_index: usize,
        timestamp_secs: f64,
        result: FrameResult,
    ) -> f64 {
        self.rate_sum += result.head_up_rate;
        self.analyzed += 1;
        self.push(FrameEntry {
            frame_index,
            timestamp_secs,
            outcome: SampleOutcome::Analyzed(result),
        });
        self.running_average()
    }

    pub fn record_failure(&mut self, frame_index: usize, timestamp_secs: f64, reason: String) {
        self.failed += 1;
        self.push(FrameEntry {
            frame_index,
            timestamp_secs,
            outcome: SampleOutcome::Failed { reason },
        });
    }

    fn push(&mut self, entry: FrameEntry) {
        self.entries.push_back(entry);
        if let Some(limit) = self.history_limit {
            while self.entries.len() > limit {
                self.entries.pop_front();
                self.dropped += 1;
            }
        }
    }

    pub fn running_average(&self) -> f64 {
        if self.analyzed == 0 {
            0.0
        } else {
            self.rate_sum / self.analyzed as f64
        }
    }

    pub fn frames_analyzed(&self) -> usize {
        self.analyzed
    }

    pub fn frames_failed(&self) -> usize {
        self.failed
    }

    pub fn finalize(self, video: Option<VideoInfo>) -> SessionSummary {
        SessionSummary {
            frame_count: self.analyzed,
            failed_count: self.failed,
            average_head_up_rate: self.running_average(),
            entries: self.entries.into(),
            dropped_entries: self.dropped,
            video,
            started_at: self.started_at,
            ended_at: Utc::now(),
        }
    }
}
