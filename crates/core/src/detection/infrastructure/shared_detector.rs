use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::detection::Detection;
use crate::shared::error::AnalysisError;
use crate::shared::frame::Frame;

/// Builds the detector on first use.
pub type DetectorLoader =
    Box<dyn Fn() -> Result<Box<dyn ObjectDetector>, Box<dyn std::error::Error>> + Send + Sync>;

/// Process-wide detector, loaded lazily exactly once.
///
/// Concurrent first callers block on the same initialisation. A failed
/// load is remembered: later calls get the same `ModelUnavailable` error
/// without touching the loader again.
pub struct SharedDetector {
    loader: DetectorLoader,
    cell: OnceLock<Result<Arc<dyn ObjectDetector>, String>>,
    load_attempts: AtomicUsize,
}

impl SharedDetector {
    pub fn new(loader: DetectorLoader) -> Self {
        Self {
            loader,
            cell: OnceLock::new(),
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// Wraps an already constructed detector; `get` never calls a loader.
    pub fn preloaded(detector: Arc<dyn ObjectDetector>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(detector));
        Self {
            loader: Box::new(|| Err("detector was preloaded".into())),
            cell,
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// Returns the detector, loading it on the first call.
    pub fn get(&self) -> Result<Arc<dyn ObjectDetector>, AnalysisError> {
        let slot = self.cell.get_or_init(|| {
            self.load_attempts.fetch_add(1, Ordering::SeqCst);
            log::info!("Loading object detector");
            match (self.loader)() {
                Ok(detector) => Ok(Arc::from(detector)),
                Err(e) => {
                    log::error!("Object detector failed to load: {e}");
                    Err(e.to_string())
                }
            }
        });
        slot.clone().map_err(AnalysisError::ModelUnavailable)
    }

    /// True once a load succeeded.
    pub fn is_ready(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }

    /// Runs detection, loading the model if needed.
    ///
    /// Load failures surface as `ModelUnavailable`, per-frame failures as
    /// `Inference`.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, AnalysisError> {
        let detector = self.get()?;
        detector
            .detect(frame)
            .map_err(|e| AnalysisError::Inference(e.to_string()))
    }

    /// How many times the loader has run. Never exceeds one.
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }
}
