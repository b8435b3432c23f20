pub mod box_overlay_visualizer;
