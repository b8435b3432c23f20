use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::object_detector::DetectorGeneration;
use crate::shared::constants::{
    APP_DIR_NAME, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_HEAD_UP_CLASS_ID, DEFAULT_IOU_THRESHOLD,
    DEFAULT_JPEG_QUALITY, DEFAULT_MODEL_NAME, DEFAULT_STREAM_HISTORY_LIMIT, SETTINGS_FILE_NAME,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Deployment knobs for the analysis pipeline.
///
/// Missing JSON fields take their defaults, so a settings file only needs
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    pub model_path: Option<PathBuf>,
    pub model_name: String,
    pub model_url: Option<String>,
    pub bundled_model_dir: Option<PathBuf>,
    pub generation: Option<DetectorGeneration>,
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    pub head_up_class_id: u32,
    pub class_names: Option<Vec<String>>,
    pub visualize: bool,
    pub overlay_font: Option<PathBuf>,
    pub jpeg_quality: u8,
    pub stream_history_limit: Option<usize>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_url: None,
            bundled_model_dir: None,
            generation: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            head_up_class_id: DEFAULT_HEAD_UP_CLASS_ID,
            class_names: None,
            visualize: true,
            overlay_font: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            stream_history_limit: Some(DEFAULT_STREAM_HISTORY_LIMIT),
        }
    }
}

impl AnalyzerSettings {
    /// `<config dir>/HeadUp/settings.json`.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&json)
    }

    /// Loads the platform settings file, falling back to defaults when it
    /// is missing or unusable.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring settings at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        check_unit_interval("confidence_threshold", self.confidence_threshold)?;
        check_unit_interval("iou_threshold", self.iou_threshold)?;
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(SettingsError::Invalid {
                field: "jpeg_quality",
                reason: format!("{} is outside 1..=100", self.jpeg_quality),
            });
        }
        if self.model_name.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "model_name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Explicit generation, or the one implied by the model file name.
    pub fn resolved_generation(&self) -> DetectorGeneration {
        if let Some(generation) = self.generation {
            return generation;
        }
        let name = self
            .model_path
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.model_name.clone());
        DetectorGeneration::from_model_name(&name)
    }
}

fn check_unit_interval(field: &'static str, value: f64) -> Result<(), SettingsError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::Invalid {
            field,
            reason: format!("{value} is outside [0, 1]"),
        })
    }
}
