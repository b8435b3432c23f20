use crate::shared::error::AnalysisError;
use crate::shared::frame::Frame;

/// Decodes an encoded still image (JPEG, PNG, ...) into an RGB frame.
///
/// Any alpha channel is dropped. The frame gets index 0.
pub fn decode_image(bytes: &[u8]) -> Result<Frame, AnalysisError> {
    if bytes.is_empty() {
        return Err(AnalysisError::Decode("image payload is empty".into()));
    }
    let image = image::load_from_memory(bytes)
        .map_err(|e| AnalysisError::Decode(e.to_string()))?;
    let frame = Frame::from_rgb_image(image.into_rgb8(), 0);
    if frame.is_empty() {
        return Err(AnalysisError::Decode("image has no pixels".into()));
    }
    Ok(frame)
}
