use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detection::domain::head_up_rate::HeadUpMetric;
use crate::detection::infrastructure::shared_detector::SharedDetector;
use crate::rendering::domain::frame_visualizer::FrameVisualizer;
use crate::shared::constants::ATTENTIVE_THRESHOLD;
use crate::shared::detection::Detection;
use crate::shared::error::AnalysisError;
use crate::shared::frame::Frame;

/// Outcome of analyzing one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameResult {
    pub detections: Vec<Detection>,
    pub head_up_rate: f64,
    pub timestamp: DateTime<Utc>,
    /// Encoded overlay image, base64 in JSON.
    #[serde(
        serialize_with = "base64_image::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub visualization: Option<Vec<u8>>,
}

impl FrameResult {
    /// Head-up rate strictly above 0.5.
    pub fn is_attentive(&self) -> bool {
        self.head_up_rate > ATTENTIVE_THRESHOLD
    }

    /// Highest detection confidence, 0.0 without detections.
    pub fn max_confidence(&self) -> f64 {
        self.detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0, f64::max)
    }
}

mod base64_image {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }
}

/// Runs detection on a single frame and derives the head-up rate.
///
/// Stateless between calls; clones share the detector and visualizer.
#[derive(Clone)]
pub struct FrameAnalyzer {
    detector: Arc<SharedDetector>,
    metric: HeadUpMetric,
    visualizer: Option<Arc<dyn FrameVisualizer>>,
}

impl FrameAnalyzer {
    pub fn new(detector: Arc<SharedDetector>, metric: HeadUpMetric) -> Self {
        Self {
            detector,
            metric,
            visualizer: None,
        }
    }

    pub fn with_visualizer(mut self, visualizer: Arc<dyn FrameVisualizer>) -> Self {
        self.visualizer = Some(visualizer);
        self
    }

    pub fn detector(&self) -> &Arc<SharedDetector> {
        &self.detector
    }

    pub fn metric(&self) -> HeadUpMetric {
        self.metric
    }

    /// Loads the detector if that has not happened yet.
    pub fn ensure_ready(&self) -> Result<(), AnalysisError> {
        self.detector.get().map(|_| ())
    }

    /// Detect, score, stamp and optionally render one frame.
    ///
    /// Detector errors propagate unchanged. A failed rendering only drops
    /// the visualization.
    pub fn analyze(&self, frame: &Frame) -> Result<FrameResult, AnalysisError> {
        if frame.is_empty() {
            return Err(AnalysisError::Decode("frame has no pixels".into()));
        }

        let detections = self.detector.detect(frame)?;
        let head_up_rate = self.metric.rate(&detections);
        let timestamp = Utc::now();

        let visualization = self.visualizer.as_ref().and_then(|viz| {
            let t0 = Instant::now();
            match viz.render(frame, &detections) {
                Ok(bytes) => {
                    log::debug!(
                        "Rendered frame {} overlay in {:.1}ms",
                        frame.index(),
                        t0.elapsed().as_secs_f64() * 1000.0
                    );
                    Some(bytes)
                }
                Err(e) => {
                    log::warn!("Visualization failed for frame {}: {e}", frame.index());
                    None
                }
            }
        });

        Ok(FrameResult {
            detections,
            head_up_rate,
            timestamp,
            visualization,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::object_detector::ObjectDetector;
    use crate::shared::detection::BoundingBox;
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    // --- Stubs ---

    struct StubDetector {
        detections: Vec<Detection>,
        seen: Arc<Mutex<Vec<usize>>>,
    }

    impl ObjectDetector for StubDetector {
        fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            self.seen.lock().unwrap().push(frame.index());
            Ok(self.detections.clone())
        }
    }

    struct FailingDetector;

    impl ObjectDetector for FailingDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            Err("malformed input".into())
        }
    }

    struct StubVisualizer;

    impl FrameVisualizer for StubVisualizer {
        fn render(
            &self,
            _frame: &Frame,
            detections: &[Detection],
        ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
            Ok(vec![detections.len() as u8, 0xAB])
        }
    }

    struct BrokenVisualizer;

    impl FrameVisualizer for BrokenVisualizer {
        fn render(
            &self,
            _frame: &Frame,
            _detections: &[Detection],
        ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
            Err("encoder exploded".into())
        }
    }

    // --- Helpers ---

    fn det(class_id: u32, confidence: f64) -> Detection {
        Detection::new(
            BoundingBox::new(1.0, 1.0, 5.0, 5.0),
            confidence,
            class_id,
            if class_id == 0 { "head-up" } else { "head-down" }.into(),
        )
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, 7)
    }

    fn analyzer_with(detections: Vec<Detection>) -> (FrameAnalyzer, Arc<Mutex<Vec<usize>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let detector = StubDetector {
            detections,
            seen: seen.clone(),
        };
        let shared = Arc::new(SharedDetector::preloaded(Arc::new(detector)));
        (FrameAnalyzer::new(shared, HeadUpMetric::default()), seen)
    }

    // --- Tests ---

    #[test]
    fn test_analyze_computes_head_up_rate() {
        let (analyzer, seen) = analyzer_with(vec![det(0, 0.9), det(0, 0.8), det(1, 0.7)]);
        let result = analyzer.analyze(&frame()).unwrap();

        assert_eq!(result.detections.len(), 3);
        assert_relative_eq!(result.head_up_rate, 2.0 / 3.0);
        assert!(result.visualization.is_none());
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_analyze_without_detections_is_zero() {
        let (analyzer, _) = analyzer_with(Vec::new());
        let result = analyzer.analyze(&frame()).unwrap();
        assert_eq!(result.head_up_rate, 0.0);
        assert_eq!(result.max_confidence(), 0.0);
        assert!(!result.is_attentive());
    }

    #[test]
    fn test_analyze_stamps_current_time() {
        let (analyzer, _) = analyzer_with(Vec::new());
        let before = Utc::now();
        let result = analyzer.analyze(&frame()).unwrap();
        assert!(result.timestamp >= before);
        assert!(result.timestamp <= Utc::now());
    }

    #[test]
    fn test_attentive_is_strictly_above_half() {
        let (analyzer, _) = analyzer_with(vec![det(0, 0.6), det(1, 0.95)]);
        let result = analyzer.analyze(&frame()).unwrap();
        assert_relative_eq!(result.head_up_rate, 0.5);
        assert!(!result.is_attentive());
        assert_relative_eq!(result.max_confidence(), 0.95);

        let (analyzer, _) = analyzer_with(vec![det(0, 0.6), det(0, 0.7), det(1, 0.5)]);
        assert!(analyzer.analyze(&frame()).unwrap().is_attentive());
    }

    #[test]
    fn test_inference_error_propagates_unchanged() {
        let shared = Arc::new(SharedDetector::preloaded(Arc::new(FailingDetector)));
        let analyzer = FrameAnalyzer::new(shared, HeadUpMetric::default());
        assert_eq!(
            analyzer.analyze(&frame()).unwrap_err(),
            AnalysisError::Inference("malformed input".into())
        );
    }

    #[test]
    fn test_model_unavailable_propagates() {
        let shared = Arc::new(SharedDetector::new(Box::new(|| Err("no weights".into()))));
        let analyzer = FrameAnalyzer::new(shared, HeadUpMetric::default());
        assert!(matches!(
            analyzer.ensure_ready(),
            Err(AnalysisError::ModelUnavailable(_))
        ));
        assert_eq!(
            analyzer.analyze(&frame()).unwrap_err(),
            AnalysisError::ModelUnavailable("no weights".into())
        );
        assert_eq!(analyzer.detector().load_attempts(), 1);
    }

    #[test]
    fn test_empty_frame_is_decode_error() {
        let (analyzer, seen) = analyzer_with(Vec::new());
        let empty = Frame::new(Vec::new(), 0, 0, 0);
        assert!(matches!(
            analyzer.analyze(&empty),
            Err(AnalysisError::Decode(_))
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_visualization_attached() {
        let (analyzer, _) = analyzer_with(vec![det(0, 0.9)]);
        let analyzer = analyzer.with_visualizer(Arc::new(StubVisualizer));
        let result = analyzer.analyze(&frame()).unwrap();
        assert_eq!(result.visualization, Some(vec![1, 0xAB]));
    }

    #[test]
    fn test_visualization_failure_keeps_result() {
        let (analyzer, _) = analyzer_with(vec![det(0, 0.9)]);
        let analyzer = analyzer.with_visualizer(Arc::new(BrokenVisualizer));
        let result = analyzer.analyze(&frame()).unwrap();
        assert!(result.visualization.is_none());
        assert_eq!(result.head_up_rate, 1.0);
    }

    #[test]
    fn test_json_encodes_visualization_as_base64() {
        let (analyzer, _) = analyzer_with(Vec::new());
        let analyzer = analyzer.with_visualizer(Arc::new(StubVisualizer));
        let result = analyzer.analyze(&frame()).unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["visualization"], "AKs=");
        assert_eq!(json["head_up_rate"], 0.0);
    }

    #[test]
    fn test_json_omits_missing_visualization() {
        let (analyzer, _) = analyzer_with(Vec::new());
        let json = serde_json::to_value(analyzer.analyze(&frame()).unwrap()).unwrap();
        assert!(json.get("visualization").is_none());
    }
}
