use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

/// Domain interface for object detection: one frame in, boxes out.
///
/// Implementations must not mutate the frame and must be safe to call
/// from several pipelines at once, hence `&self` + `Sync`. Any locking
/// around a non-reentrant inference engine is the implementation's job.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}

/// Output layout family of the underlying YOLO export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorGeneration {
    /// Rows of `[cx, cy, w, h, objectness, class scores...]`.
    YoloV5,
    /// `[cx, cy, w, h, class scores...]`, usually channel-major.
    YoloV8,
}

impl DetectorGeneration {
    pub const ALL: &'static [DetectorGeneration] = &[DetectorGeneration::YoloV5, DetectorGeneration::YoloV8];

    /// Guess the generation from a model file name; anything that does not
    /// mention v5 is treated as the newer layout.
    pub fn from_model_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("yolov5") || lower.contains("v5") {
            DetectorGeneration::YoloV5
        } else {
            DetectorGeneration::YoloV8
        }
    }

    /// Number of leading non-class values per candidate row.
    pub fn box_fields(&self) -> usize {
        match self {
            DetectorGeneration::YoloV5 => 5,
            DetectorGeneration::YoloV8 => 4,
        }
    }
}

impl fmt::Display for DetectorGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorGeneration::YoloV5 => write!(f, "yolov5"),
            DetectorGeneration::YoloV8 => write!(f, "yolov8"),
        }
    }
}

impl std::str::FromStr for DetectorGeneration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yolov5" | "v5" => Ok(DetectorGeneration::YoloV5),
            "yolov8" | "v8" => Ok(DetectorGeneration::YoloV8),
            other => Err(format!("unknown detector generation `{other}` (expected yolov5 or yolov8)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("yolov5s-headup.onnx", DetectorGeneration::YoloV5)]
    #[case("best_v5.onnx", DetectorGeneration::YoloV5)]
    #[case("YOLOv8n.onnx", DetectorGeneration::YoloV8)]
    #[case("headup.onnx", DetectorGeneration::YoloV8)]
    fn test_from_model_name(#[case] name: &str, #[case] expected: DetectorGeneration) {
        assert_eq!(DetectorGeneration::from_model_name(name), expected);
    }

    #[test]
    fn test_parse_and_display_agree() {
        for generation in DetectorGeneration::ALL {
            let parsed: DetectorGeneration = generation.to_string().parse().unwrap();
            assert_eq!(parsed, *generation);
        }
        assert!("yolov3".parse::<DetectorGeneration>().is_err());
    }

    #[test]
    fn test_box_fields() {
        assert_eq!(DetectorGeneration::YoloV5.box_fields(), 5);
        assert_eq!(DetectorGeneration::YoloV8.box_fields(), 4);
    }
}
