use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::context::Input;
use ffmpeg::software::scaling;
use ffmpeg::util::frame::video::Video as RawFrame;
use ffmpeg::Rational;

use crate::shared::frame::{Frame, CHANNELS};
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Container state kept between `open` and `close`.
struct OpenSource {
    input: Input,
    stream_index: usize,
    metadata: VideoMetadata,
}

/// Reads video files through ffmpeg-next and hands out RGB24 frames.
///
/// Frames are decoded lazily, one per `next()`, so a long lecture
/// recording never sits in memory as a whole.
#[derive(Default)]
pub struct FfmpegReader {
    source: Option<OpenSource>,
}

// Safety: the reader is moved between threads but never shared; ffmpeg
// contexts are only touched through `&mut self`.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata of the currently open source.
    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.source.as_ref().map(|s| &s.metadata)
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg::init()?;
        let input = ffmpeg::format::input(path)?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| format!("{} has no video stream", path.display()))?;
        let stream_index = stream.index();

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;
        if decoder.width() == 0 || decoder.height() == 0 {
            return Err(format!("{} reports a 0x0 video stream", path.display()).into());
        }

        let fps = frames_per_second(stream.avg_frame_rate())
            .or_else(|| frames_per_second(stream.rate()))
            .unwrap_or(0.0);
        let total_frames = match stream.frames() {
            n if n > 0 => n as usize,
            _ => estimate_frame_count(input.duration(), fps),
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            total_frames,
            codec: decoder.codec().map(|c| c.name().to_string()).unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
        };
        log::debug!(
            "Opened {}: {}x{} {} @ {:.2} fps, {} frames",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.codec,
            metadata.fps,
            metadata.total_frames
        );

        self.source = Some(OpenSource {
            input,
            stream_index,
            metadata: metadata.clone(),
        });
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        let Some(source) = self.source.as_mut() else {
            return Box::new(std::iter::once(Err("video reader used before open".into())));
        };

        match DecodedFrames::new(&mut source.input, source.stream_index) {
            Ok(frames) => Box::new(frames),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn close(&mut self) {
        self.source = None;
    }
}

fn frames_per_second(rate: Rational) -> Option<f64> {
    (rate.numerator() > 0 && rate.denominator() > 0)
        .then(|| rate.numerator() as f64 / rate.denominator() as f64)
}

/// Falls back to container duration when the stream has no frame count.
fn estimate_frame_count(duration_micros: i64, fps: f64) -> usize {
    if duration_micros <= 0 || fps <= 0.0 {
        return 0;
    }
    (duration_micros as f64 / MICROS_PER_SEC * fps).round() as usize
}

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    Reading,
    Draining,
    Finished,
}

/// Pulls packets for one stream and yields decoded, RGB-converted frames.
struct DecodedFrames<'a> {
    input: &'a mut Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: scaling::Context,
    next_index: usize,
    phase: Phase,
}

impl<'a> DecodedFrames<'a> {
    fn new(input: &'a mut Input, stream_index: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let parameters = input
            .stream(stream_index)
            .ok_or("video stream vanished after open")?
            .parameters();
        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
            .decoder()
            .video()?;
        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            next_index: 0,
            phase: Phase::Reading,
        })
    }

    /// One frame out of the decoder, if it has one ready.
    fn receive(&mut self) -> Option<Result<Frame, Box<dyn std::error::Error>>> {
        let mut decoded = RawFrame::empty();
        self.decoder.receive_frame(&mut decoded).ok()?;

        let mut rgb = RawFrame::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb) {
            return Some(Err(Box::new(e)));
        }
        let frame = Frame::new(
            pack_rows(&rgb),
            rgb.width(),
            rgb.height(),
            self.next_index,
        );
        self.next_index += 1;
        Some(Ok(frame))
    }
}

impl Iterator for DecodedFrames<'_> {
    type Item = Result<Frame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                Phase::Finished => return None,
                Phase::Draining => {
                    let frame = self.receive();
                    if frame.is_none() {
                        self.phase = Phase::Finished;
                    }
                    return frame;
                }
                Phase::Reading => {
                    if let Some(frame) = self.receive() {
                        return Some(frame);
                    }
                    match self.input.packets().next() {
                        Some((stream, packet)) if stream.index() == self.stream_index => {
                            if let Err(e) = self.decoder.send_packet(&packet) {
                                log::debug!("Skipping undecodable packet: {e}");
                            }
                        }
                        Some(_) => {}
                        None => {
                            // Flush errors only mean the decoder had nothing buffered
                            let _ = self.decoder.send_eof();
                            self.phase = Phase::Draining;
                        }
                    }
                }
            }
        }
    }
}

/// Drops the per-row stride padding ffmpeg leaves after each line.
fn pack_rows(rgb: &RawFrame) -> Vec<u8> {
    let row_bytes = rgb.width() as usize * CHANNELS as usize;
    rgb.data(0)
        .chunks(rgb.stride(0))
        .take(rgb.height() as usize)
        .flat_map(|row| &row[..row_bytes])
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::infrastructure::test_video::create_test_video;
    use rstest::rstest;

    fn clip(dir: &Path, frames: usize, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.join("lecture.mp4");
        create_test_video(&path, frames, width, height, 30.0);
        path
    }

    #[test]
    fn test_open_reports_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(dir.path(), 5, 160, 120);

        let mut reader = FfmpegReader::new();
        let meta = reader.open(&path).unwrap();
        assert_eq!((meta.width, meta.height), (160, 120));
        assert!(meta.fps > 0.0);
        assert_eq!(meta.source_path.as_deref(), Some(path.as_path()));
        assert_eq!(reader.metadata(), Some(&meta));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let mut reader = FfmpegReader::new();
        assert!(reader.open(Path::new("/nonexistent/lecture.mp4")).is_err());
        assert!(reader.metadata().is_none());
    }

    #[rstest]
    #[case::qvga(160, 120)]
    #[case::odd_stride(98, 66)]
    fn test_frames_are_packed_rgb(#[case] width: u32, #[case] height: u32) {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(dir.path(), 3, width, height);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        let frames: Vec<Frame> = reader.frames().map(|f| f.unwrap()).collect();

        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), i);
            assert_eq!(frame.data().len(), (width * height * 3) as usize);
        }
    }

    #[test]
    fn test_frames_follow_clip_brightness() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(dir.path(), 3, 64, 48);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        let centers: Vec<u8> = reader
            .frames()
            .map(|f| {
                let f = f.unwrap();
                let center = (24 * 64 + 32) * 3;
                f.data()[center]
            })
            .collect();

        // Lossy codec: brightness rises roughly 40 per frame
        assert!(centers[0] < 20);
        assert!(centers[1] > centers[0] + 20);
        assert!(centers[2] > centers[1] + 20);
    }

    #[test]
    fn test_frames_before_open_is_an_error() {
        let mut reader = FfmpegReader::new();
        let mut frames = reader.frames();
        assert!(frames.next().unwrap().is_err());
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_close_twice_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(dir.path(), 1, 160, 120);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        reader.close();
        reader.close();
        assert!(reader.metadata().is_none());
    }

    #[rstest]
    #[case::known(2_000_000, 30.0, 60)]
    #[case::rounds(1_010_000, 25.0, 25)]
    #[case::no_duration(0, 30.0, 0)]
    #[case::no_rate(5_000_000, 0.0, 0)]
    fn test_estimate_frame_count(#[case] micros: i64, #[case] fps: f64, #[case] expected: usize) {
        assert_eq!(estimate_frame_count(micros, fps), expected);
    }

    #[test]
    fn test_frames_per_second_rejects_degenerate_rates() {
        assert_eq!(frames_per_second(Rational::new(30000, 1001)).map(|f| f.round()), Some(30.0));
        assert_eq!(frames_per_second(Rational::new(0, 1)), None);
        assert_eq!(frames_per_second(Rational::new(30, 0)), None);
    }
}
