pub mod class_table;
pub mod head_up_rate;
pub mod object_detector;
