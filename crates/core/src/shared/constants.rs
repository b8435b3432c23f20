pub const DEFAULT_MODEL_NAME: &str = "headup-yolov8.onnx";

/// Directory name used under the platform cache/config roots.
pub const APP_DIR_NAME: &str = "HeadUp";

pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.45;

/// Class id counted as "head-up" unless configured otherwise.
pub const DEFAULT_HEAD_UP_CLASS_ID: u32 = 0;

/// Head-up rate above which a frame counts as attentive.
pub const ATTENTIVE_THRESHOLD: f64 = 0.5;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Per-frame entries a stream session keeps (~1 hour at 1 fps).
pub const DEFAULT_STREAM_HISTORY_LIMIT: usize = 3600;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];
