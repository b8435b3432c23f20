pub mod analyze_video_use_case;
pub mod frame_analyzer;
pub mod head_up_service;
pub mod pipeline_logger;
pub mod sampling_policy;
pub mod session_summary;
pub mod stream_session;
