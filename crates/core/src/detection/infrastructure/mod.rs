pub mod detector_factory;
pub mod math;
pub mod onnx_yolo_detector;
pub mod shared_detector;
pub mod yolo_output;
