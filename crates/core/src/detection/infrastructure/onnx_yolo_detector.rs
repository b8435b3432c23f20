//! YOLO object detector using ONNX Runtime via `ort`.
//!
//! One type serves both model generations; the generation only changes how
//! the output rows are read (see `yolo_output::decode`).

use std::path::Path;
use std::sync::Mutex;

use ort::execution_providers::ExecutionProviderDispatch;

use crate::detection::domain::class_table::ClassTable;
use crate::detection::domain::object_detector::{DetectorGeneration, ObjectDetector};
use crate::shared::constants::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD};
use crate::shared::detection::{BoundingBox, Detection};
use crate::shared::frame::Frame;

use super::yolo_output::{decode, letterbox, nms, DecodeParams};

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Metadata key under which Ultralytics exports store class names.
const NAMES_METADATA_KEY: &str = "names";

/// Thresholds and labelling for an `OnnxYoloDetector`.
#[derive(Clone, Debug)]
pub struct YoloDetectorConfig {
    pub generation: DetectorGeneration,
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    /// Overrides the class names embedded in the model.
    pub class_names: Option<ClassTable>,
}

impl YoloDetectorConfig {
    pub fn new(generation: DetectorGeneration) -> Self {
        Self {
            generation,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            class_names: None,
        }
    }
}

/// YOLO detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: Mutex<ort::session::Session>,
    generation: DetectorGeneration,
    classes: ClassTable,
    confidence: f64,
    iou_threshold: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(
        model_path: &Path,
        config: YoloDetectorConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(platform_accelerators())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        let classes = match config.class_names {
            Some(table) => table,
            None => embedded_class_names(&session).unwrap_or_default(),
        };

        log::info!(
            "Loaded {} detector from {} (input {}px, {} classes)",
            config.generation,
            model_path.display(),
            input_size,
            classes.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            generation: config.generation,
            classes,
            confidence: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            input_size,
        })
    }
}

/// Hardware providers tried before ORT's built-in CPU fallback.
fn platform_accelerators() -> Vec<ExecutionProviderDispatch> {
    #[allow(unused_mut)]
    let mut providers = Vec::new();
    #[cfg(target_os = "macos")]
    providers.push(ort::execution_providers::CoreMLExecutionProvider::default().build());
    #[cfg(target_os = "windows")]
    providers.push(ort::execution_providers::DirectMLExecutionProvider::default().build());
    providers
}

/// Reads the Ultralytics `names` entry from the model's custom metadata.
fn embedded_class_names(session: &ort::session::Session) -> Option<ClassTable> {
    let metadata = session.metadata().ok()?;
    let raw = metadata.custom(NAMES_METADATA_KEY).ok().flatten()?;
    let table = ClassTable::parse_ultralytics_names(&raw);
    if table.is_none() {
        log::warn!("Ignoring unparseable class names in model metadata: {raw}");
    }
    table
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Err("cannot run detection on an empty frame".into());
        }

        let (input_tensor, lb) = letterbox(frame, self.input_size);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;

        let params = DecodeParams {
            generation: self.generation,
            confidence_threshold: self.confidence,
            letterbox: lb,
            frame_width: frame.width(),
            frame_height: frame.height(),
        };

        let candidates = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| format!("Lock poisoned: {e}"))?;
            let outputs = session.run(ort::inputs![input_value])?;
            if outputs.len() == 0 {
                return Err("YOLO model produced no outputs".into());
            }
            let tensor = outputs[0].try_extract_array::<f32>()?;
            let shape = tensor.shape().to_vec();
            match tensor.as_slice() {
                Some(data) => decode(data, &shape, &params)?,
                None => {
                    let data: Vec<f32> = tensor.iter().copied().collect();
                    decode(&data, &shape, &params)?
                }
            }
        };

        let detections = nms(candidates, self.iou_threshold)
            .into_iter()
            .map(|c| {
                let [x1, y1, x2, y2] = c.bbox;
                Detection::new(
                    BoundingBox::new(x1, y1, x2, y2),
                    c.confidence,
                    c.class_id,
                    self.classes.label(c.class_id),
                )
            })
            .collect();
        Ok(detections)
    }
}
