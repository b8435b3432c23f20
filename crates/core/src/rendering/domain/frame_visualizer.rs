use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

/// Domain interface for producing an annotated image of a frame.
///
/// The frame is left untouched; implementations return encoded image bytes.
pub trait FrameVisualizer: Send + Sync {
    fn render(
        &self,
        frame: &Frame,
        detections: &[Detection],
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>>;
}
