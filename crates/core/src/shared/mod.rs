pub mod constants;
pub mod detection;
pub mod error;
pub mod frame;
pub mod model_resolver;
pub mod settings;
pub mod video_metadata;
