use std::sync::Arc;

use crate::detection::domain::class_table::ClassTable;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::model_resolver::{self, ModelLocation};
use crate::shared::settings::AnalyzerSettings;

use super::onnx_yolo_detector::{OnnxYoloDetector, YoloDetectorConfig};
use super::shared_detector::{DetectorLoader, SharedDetector};

/// Detector config derived from settings.
pub fn yolo_config(settings: &AnalyzerSettings) -> YoloDetectorConfig {
    YoloDetectorConfig {
        generation: settings.resolved_generation(),
        confidence_threshold: settings.confidence_threshold,
        iou_threshold: settings.iou_threshold,
        class_names: settings
            .class_names
            .as_ref()
            .map(|names| ClassTable::from_names(names.iter().cloned())),
    }
}

/// Loader that resolves the model file and builds an ONNX YOLO detector.
///
/// Nothing touches the filesystem or network until the loader runs.
pub fn onnx_loader(settings: &AnalyzerSettings) -> DetectorLoader {
    let settings = settings.clone();
    Box::new(move || {
        let location = ModelLocation {
            explicit: settings.model_path.as_deref(),
            name: &settings.model_name,
            bundled_dir: settings.bundled_model_dir.as_deref(),
            url: settings.model_url.as_deref(),
        };
        let path = model_resolver::resolve(
            &location,
            Some(Box::new(|downloaded, total| {
                log::debug!("Model download: {downloaded}/{total} bytes");
            })),
        )?;
        let detector = OnnxYoloDetector::new(&path, yolo_config(&settings))?;
        Ok(Box::new(detector) as Box<dyn ObjectDetector>)
    })
}

/// Lazily loaded shared detector for the given settings.
pub fn shared_from_settings(settings: &AnalyzerSettings) -> Arc<SharedDetector> {
    Arc::new(SharedDetector::new(onnx_loader(settings)))
}
