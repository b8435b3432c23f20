use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for video pass events.
///
/// Lets the CLI, a transport or a test watch a video pass without the use
/// case knowing where the events go.
pub trait PipelineLogger: Send {
    /// Frames decoded so far out of the expected total (0 when unknown).
    fn progress(&mut self, current: usize, total: usize);

    /// How long a named stage took for one sampled frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A per-frame measurement such as detection count or head-up rate.
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// A frame-level problem that did not stop the pass.
    fn warn(&mut self, message: &str) {
        log::warn!("{message}");
    }

    /// End-of-pass report. Default: no-op.
    fn summary(&self) {}
}

/// Discards every event.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
    fn warn(&mut self, _message: &str) {}
}

/// Count, sum and range of one series of samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeriesStats {
    pub count: usize,
    pub total: f64,
    pub min: f64,
    pub max: f64,
}

impl SeriesStats {
    fn first(value: f64) -> Self {
        Self {
            count: 1,
            total: value,
            min: value,
            max: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> f64 {
        self.total / self.count as f64
    }
}

fn record(series: &mut BTreeMap<String, SeriesStats>, name: &str, value: f64) {
    match series.get_mut(name) {
        Some(stats) => stats.push(value),
        None => {
            series.insert(name.to_string(), SeriesStats::first(value));
        }
    }
}

/// CLI logger: folds stage timings and frame metrics into running stats
/// and reports them through `log` when the pass ends.
///
/// Progress lines are throttled to one every `throttle_frames` frames.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    started: Instant,
    frames_decoded: usize,
    timings: BTreeMap<String, SeriesStats>,
    metrics: BTreeMap<String, SeriesStats>,
    warnings: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            started: Instant::now(),
            frames_decoded: 0,
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            warnings: 0,
        }
    }

    pub fn timing_stats(&self, stage: &str) -> Option<SeriesStats> {
        self.timings.get(stage).copied()
    }

    pub fn metric_stats(&self, name: &str) -> Option<SeriesStats> {
        self.metrics.get(name).copied()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    /// The end-of-pass report, or `None` if no frame was analyzed.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Video pass summary ({} frames decoded, {elapsed:.1}s):",
            self.frames_decoded
        )];

        for (stage, stats) in &self.timings {
            lines.push(format!(
                "  {stage:12}: {} calls, avg {:6.1}ms, max {:6.1}ms",
                stats.count,
                stats.mean(),
                stats.max
            ));
        }
        for (name, stats) in &self.metrics {
            lines.push(format!(
                "  {name}: avg {:.3} (min {:.3}, max {:.3})",
                stats.mean(),
                stats.min,
                stats.max
            ));
        }
        if self.warnings > 0 {
            lines.push(format!("  Warnings: {}", self.warnings));
        }
        if self.frames_decoded > 0 && elapsed > 0.0 {
            lines.push(format!(
                "  Throughput: {:.1} decoded fps",
                self.frames_decoded as f64 / elapsed
            ));
        }

        Some(lines.join("\n"))
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames_decoded = current;
        if current % self.throttle_frames != 0 && current != total {
            return;
        }
        if total > 0 {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Decoded {current}/{total} frames ({pct:.1}%)");
        } else {
            log::info!("Decoded {current} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        record(&mut self.timings, stage, duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        record(&mut self.metrics, name, value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn warn(&mut self, message: &str) {
        self.warnings += 1;
        log::warn!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
