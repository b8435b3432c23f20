use thiserror::Error;

use crate::pipeline::stream_session::SessionHandle;

/// Failure taxonomy of the analysis pipeline.
///
/// `Clone` so that a failed model load can be cached and handed back
/// verbatim to every later caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Input bytes or file could not be decoded as an image or video.
    #[error("decode error: {0}")]
    Decode(String),
    /// The detector could not be loaded. Sticky for the owning process.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    /// The detector failed on one specific frame.
    #[error("inference error: {0}")]
    Inference(String),
    #[error("stream session is closed")]
    SessionClosed,
    #[error("unknown stream session {0}")]
    UnknownSession(SessionHandle),
    #[error("analysis cancelled")]
    Cancelled,
    #[error("i/o error: {0}")]
    Io(String),
}

impl AnalysisError {
    /// Errors that end the whole operation. Decode and inference
    /// failures stay local to the frame that caused them.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AnalysisError::Inference(_) | AnalysisError::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_and_inference_errors_are_frame_local() {
        assert!(!AnalysisError::Inference("bad tensor".into()).is_fatal());
        assert!(AnalysisError::ModelUnavailable("missing".into()).is_fatal());
        assert!(!AnalysisError::Decode("truncated".into()).is_fatal());
        assert!(AnalysisError::SessionClosed.is_fatal());
        assert!(AnalysisError::Cancelled.is_fatal());
    }

    #[test]
    fn test_messages_carry_reason() {
        let err = AnalysisError::ModelUnavailable("weights not found".into());
        assert_eq!(err.to_string(), "model unavailable: weights not found");
        assert_eq!(
            AnalysisError::UnknownSession(SessionHandle::new(9)).to_string(),
            "unknown stream session #9"
        );
    }
}
