pub mod ffmpeg_reader;
pub mod image_decoder;
#[cfg(test)]
pub mod test_video;
