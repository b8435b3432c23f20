pub mod frame_visualizer;
