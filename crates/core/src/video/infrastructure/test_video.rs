//! Synthetic MPEG-4 clips for reader and pipeline tests.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::util::frame::video::Video as RawFrame;
use ffmpeg::{encoder, format, Packet, Rational};

/// Writes `num_frames` flat gray frames; frame `i` has brightness `40 * i`
/// (mod 256) so decoders can be checked for order and content.
pub fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32, fps: f64) {
    ffmpeg::init().unwrap();
    let frame_rate = Rational(fps.round() as i32, 1);
    let time_base = frame_rate.invert();

    let mut output = format::output(path).unwrap();
    let needs_global_header = output.format().flags().contains(format::Flags::GLOBAL_HEADER);
    let codec = encoder::find(ffmpeg::codec::Id::MPEG4).unwrap();
    let mut stream = output.add_stream(Some(codec)).unwrap();

    let mut config = ffmpeg::codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .unwrap();
    config.set_width(width);
    config.set_height(height);
    config.set_format(Pixel::YUV420P);
    config.set_time_base(time_base);
    config.set_frame_rate(Some(frame_rate));
    if needs_global_header {
        config.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
    }
    let mut encoder = config.open_with(ffmpeg::Dictionary::new()).unwrap();
    stream.set_parameters(&encoder);

    output.write_header().unwrap();
    let stream_time_base = output.stream(0).unwrap().time_base();

    let mut to_yuv = ffmpeg::software::scaling::Context::get(
        Pixel::RGB24,
        width,
        height,
        Pixel::YUV420P,
        width,
        height,
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .unwrap();

    for i in 0..num_frames {
        let mut rgb = RawFrame::new(Pixel::RGB24, width, height);
        let stride = rgb.stride(0);
        let value = ((i * 40) % 256) as u8;
        for row in rgb.data_mut(0).chunks_mut(stride).take(height as usize) {
            row[..width as usize * 3].fill(value);
        }

        let mut yuv = RawFrame::empty();
        to_yuv.run(&rgb, &mut yuv).unwrap();
        yuv.set_pts(Some(i as i64));
        encoder.send_frame(&yuv).unwrap();
        drain(&mut encoder, &mut output, time_base, stream_time_base);
    }

    encoder.send_eof().unwrap();
    drain(&mut encoder, &mut output, time_base, stream_time_base);
    output.write_trailer().unwrap();
}

fn drain(
    encoder: &mut encoder::video::Encoder,
    output: &mut format::context::Output,
    time_base: Rational,
    stream_time_base: Rational,
) {
    let mut packet = Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(0);
        packet.rescale_ts(time_base, stream_time_base);
        packet.write_interleaved(output).unwrap();
    }
}
